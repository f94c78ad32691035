// Token <-> id bijection defining the bag-of-words vector space.
//
// Ids are handed out in first-seen order during a single pass over the
// corpus, so two builds over the same documents in the same order agree on
// every id. Pruning removes tokens and then compacts the remaining ids,
// keeping their relative order.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::bow::BagOfWords;

#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    token2id: HashMap<String, u32>,
    id2token: Vec<String>,
    /// Number of documents containing each token, indexed by id
    dfs: Vec<u32>,
    num_docs: usize,
}

/// Serializable form of a dictionary, one entry per id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionarySnapshot {
    pub num_docs: usize,
    pub entries: Vec<DictionaryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub id: u32,
    pub token: String,
    pub df: u32,
}

impl Dictionary {
    /// Build from token streams in one pass.
    pub fn build<I, S>(documents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[String]>,
    {
        let mut dict = Dictionary::default();
        for doc in documents {
            dict.add_document(doc.as_ref());
        }
        dict
    }

    fn add_document(&mut self, tokens: &[String]) {
        self.num_docs += 1;
        let mut seen_in_doc: HashSet<u32> = HashSet::new();
        for token in tokens {
            let id = match self.token2id.get(token) {
                Some(&id) => id,
                None => {
                    let id = self.id2token.len() as u32;
                    self.token2id.insert(token.clone(), id);
                    self.id2token.push(token.clone());
                    self.dfs.push(0);
                    id
                }
            };
            if seen_in_doc.insert(id) {
                self.dfs[id as usize] += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.id2token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2token.is_empty()
    }

    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.token2id.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.id2token.get(id as usize).map(|s| s.as_str())
    }

    /// Drop rare and overly common tokens, then keep at most `keep_n`.
    ///
    /// A token survives when it appears in at least `no_below` documents and
    /// in no more than `no_above * num_docs` documents. When more than
    /// `keep_n` survive, the ones with the highest document frequency win
    /// (lower id on ties). Surviving ids are compacted in their original order.
    pub fn filter_extremes(&mut self, no_below: u32, no_above: f64, keep_n: usize) {
        let max_df = no_above * self.num_docs as f64;
        let mut keep: Vec<u32> = (0..self.len() as u32)
            .filter(|&id| {
                let df = self.dfs[id as usize];
                df >= no_below && df as f64 <= max_df
            })
            .collect();

        if keep.len() > keep_n {
            keep.sort_by(|&a, &b| self.dfs[b as usize].cmp(&self.dfs[a as usize]).then(a.cmp(&b)));
            keep.truncate(keep_n);
            keep.sort_unstable();
        }

        let before = self.len();
        let mut id2token = Vec::with_capacity(keep.len());
        let mut dfs = Vec::with_capacity(keep.len());
        for &old in &keep {
            id2token.push(std::mem::take(&mut self.id2token[old as usize]));
            dfs.push(self.dfs[old as usize]);
        }
        self.token2id = id2token
            .iter()
            .enumerate()
            .map(|(id, token)| (token.clone(), id as u32))
            .collect();
        self.id2token = id2token;
        self.dfs = dfs;

        info!(
            before,
            after = self.len(),
            no_below,
            no_above,
            keep_n,
            "Pruned dictionary"
        );
    }

    /// Convert a token stream to sparse counts. Unknown tokens are dropped.
    pub fn doc2bow(&self, tokens: &[String]) -> BagOfWords {
        let mut counts: HashMap<u32, u32> = HashMap::new();
        for token in tokens {
            if let Some(&id) = self.token2id.get(token) {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        BagOfWords::from_counts(counts)
    }

    pub fn snapshot(&self) -> DictionarySnapshot {
        DictionarySnapshot {
            num_docs: self.num_docs,
            entries: self
                .id2token
                .iter()
                .enumerate()
                .map(|(id, token)| DictionaryEntry {
                    id: id as u32,
                    token: token.clone(),
                    df: self.dfs[id],
                })
                .collect(),
        }
    }

    /// Rebuild a dictionary from its snapshot. Entries must be dense and
    /// ordered by id.
    pub fn from_snapshot(snapshot: DictionarySnapshot) -> anyhow::Result<Self> {
        let mut dict = Dictionary {
            num_docs: snapshot.num_docs,
            ..Default::default()
        };
        for (expected, entry) in snapshot.entries.into_iter().enumerate() {
            if entry.id as usize != expected {
                anyhow::bail!(
                    "dictionary snapshot is not dense: expected id {expected}, found {}",
                    entry.id
                );
            }
            if dict.token2id.insert(entry.token.clone(), entry.id).is_some() {
                anyhow::bail!("dictionary snapshot repeats token '{}'", entry.token);
            }
            dict.id2token.push(entry.token);
            dict.dfs.push(entry.df);
        }
        Ok(dict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|d| d.iter().map(|t| t.to_string()).collect())
            .collect()
    }

    #[test]
    fn ids_follow_first_seen_order() {
        let dict = Dictionary::build(&docs(&[&["zeta", "alpha", "zeta"], &["beta", "alpha"]]));
        assert_eq!(dict.id("zeta"), Some(0));
        assert_eq!(dict.id("alpha"), Some(1));
        assert_eq!(dict.id("beta"), Some(2));
        assert_eq!(dict.dfs[0], 1);
        assert_eq!(dict.dfs[1], 2);
        assert_eq!(dict.num_docs(), 2);
    }

    #[test]
    fn filter_extremes_compacts_in_order() {
        let corpus = docs(&[
            &["common", "rare", "mid"],
            &["common", "mid"],
            &["common", "other", "mid"],
            &["common"],
        ]);
        let mut dict = Dictionary::build(&corpus);
        // "common" is in 4/4 docs (> 0.75), "rare" and "other" in 1
        dict.filter_extremes(2, 0.75, 100);
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.id("mid"), Some(0));
        assert_eq!(dict.token(0), Some("mid"));
        assert_eq!(dict.id("common"), None);
    }

    #[test]
    fn keep_n_prefers_higher_df_then_lower_id() {
        let corpus = docs(&[&["a", "b", "c"], &["c", "b"], &["c"]]);
        let mut dict = Dictionary::build(&corpus);
        dict.filter_extremes(1, 1.0, 2);
        // c (df 3) and b (df 2) survive, keeping their relative order b < c
        assert_eq!(dict.id("b"), Some(0));
        assert_eq!(dict.id("c"), Some(1));
        assert_eq!(dict.id("a"), None);
    }

    #[test]
    fn doc2bow_drops_unknown_tokens() {
        let dict = Dictionary::build(&docs(&[&["x", "y"]]));
        let bow = dict.doc2bow(&["y".to_string(), "unseen".to_string(), "y".to_string()]);
        assert_eq!(bow.entries(), &[(1, 2)]);
        // Vectorizing never grows the dictionary
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn snapshot_restores_ids() {
        let dict = Dictionary::build(&docs(&[&["uno", "dos"], &["tres", "uno"]]));
        let json = serde_json::to_string(&dict.snapshot()).unwrap();
        let restored = Dictionary::from_snapshot(serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(restored.id("tres"), Some(2));
        assert_eq!(restored.dfs[0], 2);
        assert_eq!(restored.num_docs(), 2);
    }
}
