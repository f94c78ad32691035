// Bag-of-words vectors and the restartable corpus built from them.

use std::collections::HashMap;

use tracing::info;

use super::dictionary::Dictionary;
use crate::config::DictionarySettings;

/// Sparse `(id, count)` pairs, sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagOfWords(Vec<(u32, u32)>);

impl BagOfWords {
    pub fn from_counts(counts: HashMap<u32, u32>) -> Self {
        let mut entries: Vec<(u32, u32)> = counts.into_iter().filter(|&(_, c)| c > 0).collect();
        entries.sort_unstable_by_key(|&(id, _)| id);
        Self(entries)
    }

    pub fn entries(&self) -> &[(u32, u32)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total token count of the document.
    pub fn total(&self) -> u64 {
        self.0.iter().map(|&(_, c)| c as u64).sum()
    }
}

/// Bag-of-words vectors index-aligned with document ordinals.
///
/// Vectors are derived once and cached, so the corpus can be iterated by any
/// number of consumers (training, coherence, topic extraction) and always
/// yields the same order.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    names: Vec<String>,
    vectors: Vec<BagOfWords>,
}

impl Corpus {
    pub fn new(names: Vec<String>, vectors: Vec<BagOfWords>) -> Self {
        debug_assert_eq!(names.len(), vectors.len());
        Self { names, vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, ordinal: usize) -> Option<&BagOfWords> {
        self.vectors.get(ordinal)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BagOfWords> {
        self.vectors.iter()
    }

    /// True when no document kept a single dictionary token.
    pub fn is_vacuous(&self) -> bool {
        self.vectors.iter().all(BagOfWords::is_empty)
    }
}

impl<'a> IntoIterator for &'a Corpus {
    type Item = &'a BagOfWords;
    type IntoIter = std::slice::Iter<'a, BagOfWords>;

    fn into_iter(self) -> Self::IntoIter {
        self.vectors.iter()
    }
}

/// Build the dictionary (pruned, ids final) and the corpus from
/// phrase-merged token streams.
pub fn build_corpus(
    names: Vec<String>,
    streams: &[Vec<String>],
    settings: &DictionarySettings,
) -> (Dictionary, Corpus) {
    let mut dictionary = Dictionary::build(streams);
    dictionary.filter_extremes(settings.no_below, settings.no_above, settings.keep_n);

    let vectors: Vec<BagOfWords> = streams.iter().map(|s| dictionary.doc2bow(s)).collect();
    let corpus = Corpus::new(names, vectors);

    info!(
        documents = corpus.len(),
        vocabulary = dictionary.len(),
        empty_documents = corpus.iter().filter(|b| b.is_empty()).count(),
        "Built bag-of-words corpus"
    );

    (dictionary, corpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streams(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|d| d.iter().map(|t| t.to_string()).collect())
            .collect()
    }

    fn lenient() -> DictionarySettings {
        DictionarySettings {
            no_below: 1,
            no_above: 1.0,
            keep_n: 1000,
        }
    }

    #[test]
    fn corpus_is_aligned_and_restartable() {
        let s = streams(&[&["a", "b", "a"], &[], &["b"]]);
        let names = vec!["d1".to_string(), "d2".to_string(), "d3".to_string()];
        let (dict, corpus) = build_corpus(names, &s, &lenient());

        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.names()[1], "d2");
        assert!(corpus.get(1).unwrap().is_empty());

        let first: Vec<BagOfWords> = corpus.iter().cloned().collect();
        let second: Vec<BagOfWords> = (&corpus).into_iter().cloned().collect();
        assert_eq!(first, second);

        let a = dict.id("a").unwrap();
        let b = dict.id("b").unwrap();
        assert_eq!(first[0].entries(), &[(a, 2), (b, 1)]);
        assert_eq!(first[0].total(), 3);
    }

    #[test]
    fn vacuous_when_everything_pruned() {
        let s = streams(&[&["a"], &["b"]]);
        let settings = DictionarySettings {
            no_below: 2,
            ..lenient()
        };
        let (dict, corpus) = build_corpus(vec!["x".into(), "y".into()], &s, &settings);
        assert!(dict.is_empty());
        assert!(corpus.is_vacuous());
    }
}
