// Statistical phrase detection (bigrams, then trigrams).
//
// Training counts unigrams and adjacent pairs over the whole collection and
// freezes every pair whose score is strictly above the threshold. Applying a
// frozen model is a pure function: a greedy left-to-right scan that joins an
// accepted pair with the delimiter and moves past both tokens.
//
// Trigrams come from a second model trained on the bigram-merged streams,
// so "banco_central" + "europeo" can merge again.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{PhraseScoring, PhraseSettings};

/// A frozen phrase model: the accepted pairs and how to join them.
#[derive(Debug, Clone, Default)]
pub struct PhraseModel {
    phrasegrams: HashMap<(String, String), f64>,
    delimiter: String,
}

/// One accepted pair, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhraseEntry {
    pub left: String,
    pub right: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhraseSnapshot {
    pub delimiter: String,
    pub min_count: u32,
    pub threshold: f64,
    pub scoring: PhraseScoring,
    pub phrases: Vec<PhraseEntry>,
}

impl PhraseModel {
    /// Learn accepted pairs from a collection of token streams.
    pub fn train(streams: &[Vec<String>], settings: &PhraseSettings) -> Self {
        let mut unigrams: HashMap<&str, u64> = HashMap::new();
        let mut pairs: HashMap<(&str, &str), u64> = HashMap::new();
        let mut word_count: u64 = 0;

        for stream in streams {
            for token in stream {
                *unigrams.entry(token.as_str()).or_insert(0) += 1;
                word_count += 1;
            }
            for window in stream.windows(2) {
                *pairs
                    .entry((window[0].as_str(), window[1].as_str()))
                    .or_insert(0) += 1;
            }
        }

        let vocab_len = (unigrams.len() + pairs.len()) as f64;
        let min_count = settings.min_count as u64;

        let phrasegrams: HashMap<(String, String), f64> = pairs
            .iter()
            .filter_map(|(&(a, b), &count_ab)| {
                let count_a = unigrams[a];
                let count_b = unigrams[b];
                let score = match settings.scoring {
                    PhraseScoring::Default => {
                        default_score(count_a, count_b, count_ab, vocab_len, min_count)
                    }
                    PhraseScoring::Npmi => npmi_score(count_a, count_b, count_ab, word_count, min_count),
                };
                (score > settings.threshold).then(|| ((a.to_string(), b.to_string()), score))
            })
            .collect();

        info!(
            candidates = pairs.len(),
            accepted = phrasegrams.len(),
            threshold = settings.threshold,
            "Trained phrase model"
        );

        Self {
            phrasegrams,
            delimiter: settings.delimiter.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.phrasegrams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrasegrams.is_empty()
    }

    pub fn score(&self, left: &str, right: &str) -> Option<f64> {
        self.phrasegrams
            .get(&(left.to_string(), right.to_string()))
            .copied()
    }

    /// Merge accepted adjacent pairs of one stream.
    pub fn apply(&self, tokens: &[String]) -> Vec<String> {
        let mut merged = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            if i + 1 < tokens.len() && self.score(&tokens[i], &tokens[i + 1]).is_some() {
                merged.push(format!("{}{}{}", tokens[i], self.delimiter, tokens[i + 1]));
                i += 2;
            } else {
                merged.push(tokens[i].clone());
                i += 1;
            }
        }
        merged
    }

    /// Accepted pairs sorted by score (descending), then alphabetically.
    pub fn phrases(&self) -> Vec<PhraseEntry> {
        let mut entries: Vec<PhraseEntry> = self
            .phrasegrams
            .iter()
            .map(|((left, right), &score)| PhraseEntry {
                left: left.clone(),
                right: right.clone(),
                score,
            })
            .collect();
        entries.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.left.cmp(&b.left))
                .then_with(|| a.right.cmp(&b.right))
        });
        entries
    }

    pub fn snapshot(&self, settings: &PhraseSettings) -> PhraseSnapshot {
        PhraseSnapshot {
            delimiter: self.delimiter.clone(),
            min_count: settings.min_count,
            threshold: settings.threshold,
            scoring: settings.scoring,
            phrases: self.phrases(),
        }
    }

    pub fn from_snapshot(snapshot: PhraseSnapshot) -> Self {
        Self {
            phrasegrams: snapshot
                .phrases
                .into_iter()
                .map(|p| ((p.left, p.right), p.score))
                .collect(),
            delimiter: snapshot.delimiter,
        }
    }
}

fn default_score(count_a: u64, count_b: u64, count_ab: u64, vocab_len: f64, min_count: u64) -> f64 {
    if count_ab < min_count {
        return f64::NEG_INFINITY;
    }
    (count_ab - min_count) as f64 / (count_a as f64 * count_b as f64) * vocab_len
}

fn npmi_score(count_a: u64, count_b: u64, count_ab: u64, word_count: u64, min_count: u64) -> f64 {
    if count_ab < min_count || word_count == 0 {
        return -1.0;
    }
    let total = word_count as f64;
    let pa = count_a as f64 / total;
    let pb = count_b as f64 / total;
    let pab = count_ab as f64 / total;
    if pab >= 1.0 {
        return 1.0;
    }
    (pab / (pa * pb)).ln() / -pab.ln()
}

/// The bigram model and the trigram model trained on its output.
#[derive(Debug, Clone, Default)]
pub struct NgramModels {
    pub bigrams: PhraseModel,
    pub trigrams: PhraseModel,
}

impl NgramModels {
    /// Train both passes once over the full collection.
    pub fn train(streams: &[Vec<String>], settings: &PhraseSettings) -> Self {
        let bigrams = PhraseModel::train(streams, settings);
        let bigrammed: Vec<Vec<String>> = streams.iter().map(|s| bigrams.apply(s)).collect();
        let trigrams = PhraseModel::train(&bigrammed, settings);
        Self { bigrams, trigrams }
    }

    pub fn apply(&self, tokens: &[String]) -> Vec<String> {
        self.trigrams.apply(&self.bigrams.apply(tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(text: &str) -> Vec<String> {
        text.split_whitespace().map(|s| s.to_string()).collect()
    }

    fn settings(min_count: u32, threshold: f64) -> PhraseSettings {
        PhraseSettings {
            min_count,
            threshold,
            ..Default::default()
        }
    }

    fn training_set() -> Vec<Vec<String>> {
        let mut streams = Vec::new();
        for i in 0..6 {
            streams.push(stream(&format!("hoy banco central europeo caso{i}")));
            streams.push(stream(&format!("ayer banco central europeo nota{i}")));
        }
        streams
    }

    #[test]
    fn merges_frequent_pairs() {
        let model = PhraseModel::train(&training_set(), &settings(3, 1.5));
        let out = model.apply(&stream("banco central hoy"));
        assert_eq!(out, vec!["banco_central", "hoy"]);
    }

    #[test]
    fn rare_pairs_are_not_merged() {
        let model = PhraseModel::train(&training_set(), &settings(3, 1.5));
        // "europeo caso0" occurs once, "hoy banco" scores below the threshold
        assert!(model.score("europeo", "caso0").is_none());
        assert!(model.score("hoy", "banco").is_none());
    }

    #[test]
    fn trigram_pass_merges_on_bigram_output() {
        let models = NgramModels::train(&training_set(), &settings(3, 1.5));
        let out = models.apply(&stream("banco central europeo"));
        assert_eq!(out, vec!["banco_central_europeo"]);
    }

    #[test]
    fn application_is_deterministic() {
        let models = NgramModels::train(&training_set(), &settings(3, 1.5));
        let input = stream("ayer banco central europeo nota3 hoy");
        assert_eq!(models.apply(&input), models.apply(&input));
    }

    #[test]
    fn threshold_is_strict() {
        let streams = vec![stream("a b"), stream("a b")];
        // count_ab=2, min_count=1, count_a=count_b=2, vocab_len=3 -> score 0.75
        let at = PhraseModel::train(&streams, &settings(1, 0.75));
        assert!(at.is_empty());
        let below = PhraseModel::train(&streams, &settings(1, 0.74));
        assert_eq!(below.len(), 1);
    }

    #[test]
    fn npmi_scoring_accepts_perfect_collocations() {
        let streams = vec![stream("x y p"), stream("x y q"), stream("r s t")];
        let s = PhraseSettings {
            min_count: 2,
            threshold: 0.5,
            scoring: PhraseScoring::Npmi,
            ..Default::default()
        };
        let model = PhraseModel::train(&streams, &s);
        assert!(model.score("x", "y").is_some());
        assert!(model.score("y", "p").is_none());
    }

    #[test]
    fn snapshot_round_trip_preserves_application() {
        let s = settings(3, 1.5);
        let model = PhraseModel::train(&training_set(), &s);
        let json = serde_json::to_string(&model.snapshot(&s)).unwrap();
        let restored = PhraseModel::from_snapshot(serde_json::from_str(&json).unwrap());
        let input = stream("hoy banco central europeo");
        assert_eq!(model.apply(&input), restored.apply(&input));
    }
}
