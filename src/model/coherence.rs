// Topic coherence from co-occurrence counts over evaluation texts.
//
// Three measures are supported, all built on the same counting pass:
//
//   u_mass  documents are the windows; each topic scores the mean of
//           ln((P(wi, wj) + eps) / P(wj)) over pairs where wj ranks above wi.
//   c_npmi  sliding windows; mean NPMI over every ordered pair of top terms.
//   c_v     sliding windows; each top term's NPMI context vector is compared
//           by cosine with the summed vector of the whole top-term set.
//
// A model's score is the mean of its per-topic scores. Only terms that some
// topic ranks in its top `topn` are counted; other tokens still occupy their
// positions so windows keep their real width.

use std::collections::HashMap;

use anyhow::Result;

use super::traits::{CoherenceScorer, TopicModel};
use crate::config::{CoherenceMeasure, CoherenceSettings};
use crate::corpus::dictionary::Dictionary;
use crate::text::preprocess::TokenStream;

const EPSILON: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct WindowCoherence {
    pub measure: CoherenceMeasure,
    pub topn: usize,
    /// Sliding window width; unused by u_mass
    pub window: usize,
}

impl WindowCoherence {
    pub fn new(settings: &CoherenceSettings) -> Self {
        let window = settings
            .window
            .or(settings.measure.default_window())
            .unwrap_or(1);
        Self {
            measure: settings.measure,
            topn: settings.topn,
            window,
        }
    }
}

/// Window and pair counts for the relevant terms, indexed contiguously.
struct Occurrences {
    windows: u64,
    single: Vec<u64>,
    pairs: HashMap<(usize, usize), u64>,
}

impl Occurrences {
    fn single(&self, i: usize) -> u64 {
        self.single[i]
    }

    fn pair(&self, i: usize, j: usize) -> u64 {
        if i == j {
            return self.single[i];
        }
        let key = if i < j { (i, j) } else { (j, i) };
        self.pairs.get(&key).copied().unwrap_or(0)
    }

    fn count_window(&mut self, members: &mut Vec<usize>) {
        members.sort_unstable();
        members.dedup();
        self.windows += 1;
        for (n, &i) in members.iter().enumerate() {
            self.single[i] += 1;
            for &j in &members[n + 1..] {
                *self.pairs.entry((i, j)).or_insert(0) += 1;
            }
        }
    }

    fn npmi(&self, i: usize, j: usize) -> f64 {
        let n = self.windows as f64;
        let joint = self.pair(i, j) as f64 / n + EPSILON;
        let pi = self.single(i) as f64 / n;
        let pj = self.single(j) as f64 / n;
        if pi == 0.0 || pj == 0.0 {
            return 0.0;
        }
        (joint / (pi * pj)).ln() / -joint.ln()
    }
}

fn count_occurrences(
    texts: &[TokenStream],
    dictionary: &Dictionary,
    index: &HashMap<u32, usize>,
    window: Option<usize>,
) -> Occurrences {
    let mut occ = Occurrences {
        windows: 0,
        single: vec![0; index.len()],
        pairs: HashMap::new(),
    };
    let mut members = Vec::new();

    for text in texts {
        let positions: Vec<Option<usize>> = text
            .iter()
            .map(|t| dictionary.id(t).and_then(|id| index.get(&id).copied()))
            .collect();
        if positions.iter().all(Option::is_none) {
            continue;
        }

        match window {
            Some(width) if positions.len() > width => {
                for slice in positions.windows(width) {
                    members.clear();
                    members.extend(slice.iter().flatten());
                    occ.count_window(&mut members);
                }
            }
            _ => {
                members.clear();
                members.extend(positions.iter().flatten());
                occ.count_window(&mut members);
            }
        }
    }
    occ
}

fn u_mass(occ: &Occurrences, topic: &[usize]) -> Option<f64> {
    let n = occ.windows as f64;
    let mut scores = Vec::new();
    for (pos, &wi) in topic.iter().enumerate().skip(1) {
        for &wj in &topic[..pos] {
            let prior = occ.single(wj);
            if prior == 0 {
                continue;
            }
            let joint = occ.pair(wi, wj) as f64 / n + EPSILON;
            scores.push((joint / (prior as f64 / n)).ln());
        }
    }
    mean(&scores)
}

fn c_npmi(occ: &Occurrences, topic: &[usize]) -> Option<f64> {
    let mut scores = Vec::new();
    for (a, &wi) in topic.iter().enumerate() {
        for (b, &wj) in topic.iter().enumerate() {
            if a != b {
                scores.push(occ.npmi(wi, wj));
            }
        }
    }
    mean(&scores)
}

fn c_v(occ: &Occurrences, topic: &[usize]) -> Option<f64> {
    let vectors: Vec<Vec<f64>> = topic
        .iter()
        .map(|&wi| topic.iter().map(|&wj| occ.npmi(wi, wj)).collect())
        .collect();
    let mut set_vector = vec![0.0; topic.len()];
    for v in &vectors {
        for (acc, x) in set_vector.iter_mut().zip(v) {
            *acc += x;
        }
    }
    let scores: Vec<f64> = vectors.iter().map(|v| cosine(v, &set_vector)).collect();
    mean(&scores)
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

impl CoherenceScorer for WindowCoherence {
    fn score(
        &self,
        model: &dyn TopicModel,
        texts: &[TokenStream],
        dictionary: &Dictionary,
    ) -> Result<f64> {
        let mut index: HashMap<u32, usize> = HashMap::new();
        let topics: Vec<Vec<usize>> = (0..model.num_topics())
            .map(|t| {
                model
                    .top_terms(t, self.topn)
                    .into_iter()
                    .map(|(id, _)| {
                        let next = index.len();
                        *index.entry(id).or_insert(next)
                    })
                    .collect()
            })
            .collect();

        let window = match self.measure {
            CoherenceMeasure::UMass => None,
            _ => Some(self.window),
        };
        let occ = count_occurrences(texts, dictionary, &index, window);
        if occ.windows == 0 {
            anyhow::bail!("no evaluation text contains any top term");
        }

        let per_topic: Vec<f64> = topics
            .iter()
            .filter_map(|topic| match self.measure {
                CoherenceMeasure::UMass => u_mass(&occ, topic),
                CoherenceMeasure::CNpmi => c_npmi(&occ, topic),
                CoherenceMeasure::CV => c_v(&occ, topic),
            })
            .collect();

        mean(&per_topic).ok_or_else(|| anyhow::anyhow!("no topic had scorable term pairs"))
    }
}
