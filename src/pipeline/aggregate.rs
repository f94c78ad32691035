// Per-document topic rows and the dominance table of the winning model.

use serde::Serialize;

use crate::config::MAX_PRECISION;
use crate::corpus::bow::Corpus;
use crate::corpus::dictionary::Dictionary;
use crate::model::traits::TopicModel;

/// One document's topic distribution, aligned with its corpus ordinal.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocTopicRow {
    pub document: String,
    pub topics: Vec<(usize, f64)>,
    pub dominant_topic: Option<usize>,
}

impl DocTopicRow {
    /// Probability of `topic`, 0 when the model omitted it.
    pub fn probability(&self, topic: usize) -> f64 {
        self.topics
            .iter()
            .find(|&&(t, _)| t == topic)
            .map(|&(_, p)| p)
            .unwrap_or(0.0)
    }
}

/// Highest-probability topic; ties go to the lowest topic id.
pub fn dominant_topic(topics: &[(usize, f64)]) -> Option<usize> {
    topics
        .iter()
        .filter(|(_, p)| !p.is_nan())
        .fold(None, |best: Option<(usize, f64)>, &(t, p)| match best {
            Some((bt, bp)) if bp > p || (bp == p && bt < t) => Some((bt, bp)),
            _ => Some((t, p)),
        })
        .map(|(t, _)| t)
}

/// One row per corpus document, in corpus order.
pub fn doc_topic_rows(model: &dyn TopicModel, corpus: &Corpus) -> Vec<DocTopicRow> {
    corpus
        .names()
        .iter()
        .zip(corpus.iter())
        .map(|(name, bow)| {
            let topics = model.document_topics(bow);
            DocTopicRow {
                document: name.clone(),
                dominant_topic: dominant_topic(&topics),
                topics,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DominanceEntry {
    pub topic: usize,
    pub documents: usize,
    pub fraction: f64,
}

/// Share of documents whose dominant topic is each topic. Only topics that
/// dominate at least one document appear.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DominanceTable {
    pub entries: Vec<DominanceEntry>,
    /// Documents that had a dominant topic (the denominator)
    pub counted: usize,
}

impl DominanceTable {
    pub fn from_rows(rows: &[DocTopicRow], precision: u32) -> Self {
        let mut counts: Vec<(usize, usize)> = Vec::new();
        for topic in rows.iter().filter_map(|r| r.dominant_topic) {
            match counts.iter_mut().find(|(t, _)| *t == topic) {
                Some((_, n)) => *n += 1,
                None => counts.push((topic, 1)),
            }
        }
        let counted: usize = counts.iter().map(|&(_, n)| n).sum();

        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        let entries = counts
            .into_iter()
            .map(|(topic, documents)| DominanceEntry {
                topic,
                documents,
                fraction: round_to(documents as f64 / counted as f64, precision),
            })
            .collect();

        Self { entries, counted }
    }

    pub fn get(&self, topic: usize) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.topic == topic)
            .map(|e| e.fraction)
    }

    /// The `n` most dominant entries.
    pub fn head(&self, n: usize) -> &[DominanceEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision.min(MAX_PRECISION) as i32);
    (value * scale).round() / scale
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TermWeight {
    pub term: String,
    pub weight: f64,
}

/// A topic's heaviest terms, resolved through the dictionary.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TopicTerms {
    pub topic: usize,
    pub terms: Vec<TermWeight>,
}

pub fn topic_terms(model: &dyn TopicModel, dictionary: &Dictionary, n: usize) -> Vec<TopicTerms> {
    (0..model.num_topics())
        .map(|topic| TopicTerms {
            topic,
            terms: model
                .top_terms(topic, n)
                .into_iter()
                .filter_map(|(id, weight)| {
                    dictionary.token(id).map(|term| TermWeight {
                        term: term.to_string(),
                        weight,
                    })
                })
                .collect(),
        })
        .collect()
}

/// Top terms of the `n` most dominant topics, most dominant first.
pub fn head_topics<'a>(
    dominance: &DominanceTable,
    terms: &'a [TopicTerms],
    n: usize,
) -> Vec<(&'a TopicTerms, f64)> {
    dominance
        .head(n)
        .iter()
        .filter_map(|e| {
            terms
                .iter()
                .find(|t| t.topic == e.topic)
                .map(|t| (t, e.fraction))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(document: &str, topics: Vec<(usize, f64)>) -> DocTopicRow {
        DocTopicRow {
            document: document.to_string(),
            dominant_topic: dominant_topic(&topics),
            topics,
        }
    }

    #[test]
    fn dominant_topic_ties_go_to_lowest_id() {
        assert_eq!(dominant_topic(&[(3, 0.4), (1, 0.4), (2, 0.2)]), Some(1));
        assert_eq!(dominant_topic(&[(0, 0.1), (5, 0.9)]), Some(5));
        assert_eq!(dominant_topic(&[]), None);
    }

    #[test]
    fn dominance_fractions_sum_to_one() {
        let rows = vec![
            row("a", vec![(0, 0.9)]),
            row("b", vec![(1, 0.7), (0, 0.3)]),
            row("c", vec![(0, 0.6)]),
        ];
        let table = DominanceTable::from_rows(&rows, 4);
        assert_eq!(table.counted, 3);
        assert_eq!(table.entries[0].topic, 0);
        assert_eq!(table.get(0), Some(0.6667));
        assert_eq!(table.get(1), Some(0.3333));
        let sum: f64 = table.entries.iter().map(|e| e.fraction).sum();
        assert!((sum - 1.0).abs() < 1e-3);
    }

    #[test]
    fn oversized_precision_still_sums_to_one() {
        let rows = vec![row("a", vec![(0, 1.0)]), row("b", vec![(1, 1.0)]), row("c", vec![(1, 1.0)])];
        let table = DominanceTable::from_rows(&rows, 400);
        assert!(table.entries.iter().all(|e| e.fraction.is_finite()));
        let sum: f64 = table.entries.iter().map(|e| e.fraction).sum();
        assert!((sum - 1.0).abs() < 1e-9, "sum was {sum}");
    }

    #[test]
    fn rows_without_topics_are_not_counted() {
        let rows = vec![row("a", vec![(2, 0.9)]), row("empty", vec![])];
        let table = DominanceTable::from_rows(&rows, 4);
        assert_eq!(table.counted, 1);
        assert_eq!(table.get(2), Some(1.0));
    }

    #[test]
    fn equal_fractions_order_by_topic_id() {
        let rows = vec![row("a", vec![(4, 1.0)]), row("b", vec![(1, 1.0)])];
        let table = DominanceTable::from_rows(&rows, 4);
        let order: Vec<usize> = table.entries.iter().map(|e| e.topic).collect();
        assert_eq!(order, vec![1, 4]);
        assert_eq!(table.head(1).len(), 1);
        assert_eq!(table.head(10).len(), 2);
    }

    #[test]
    fn missing_topic_probability_is_zero() {
        let r = row("a", vec![(1, 0.8)]);
        assert_eq!(r.probability(1), 0.8);
        assert_eq!(r.probability(0), 0.0);
    }
}
