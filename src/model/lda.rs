// Latent Dirichlet Allocation trained with online variational Bayes.
//
// The corpus is processed in chunks of `chunksize` documents for `passes`
// passes. Each chunk runs a per-document E-step (gamma / phi updates), then
// blends its sufficient statistics into the topic-word parameters with a
// decaying step size rho = (1 + pass + updates / chunksize)^-0.5. With
// `Prior::Auto`, alpha and eta are refined after each chunk by a Newton step
// on the Dirichlet likelihood.
//
// Everything is seeded from `random_state`, and inference starts from a fixed
// gamma, so identical inputs always give identical models and distributions.
// A trained model round-trips through `LdaSnapshot` without changing any of
// its answers.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::special::{digamma, dirichlet_expectation, trigamma};
use super::traits::{CancelFlag, TopicModel, TopicTrainer};
use crate::config::{LdaSettings, Prior};
use crate::corpus::bow::{BagOfWords, Corpus};
use crate::corpus::dictionary::Dictionary;

const DECAY: f64 = 0.5;
const OFFSET: f64 = 1.0;
const PHI_FLOOR: f64 = 1e-100;

pub struct LdaTrainer {
    pub settings: LdaSettings,
}

impl LdaTrainer {
    pub fn new(settings: LdaSettings) -> Self {
        Self { settings }
    }
}

impl TopicTrainer for LdaTrainer {
    fn train(
        &self,
        corpus: &Corpus,
        dictionary: &Dictionary,
        topic_count: usize,
        cancel: &CancelFlag,
    ) -> Result<Box<dyn TopicModel>> {
        Ok(Box::new(LdaModel::train(
            corpus,
            dictionary.len(),
            topic_count,
            &self.settings,
            cancel,
        )?))
    }
}

/// A trained LDA model. `lambda` holds the variational topic-word
/// parameters, one row per topic.
#[derive(Debug, Clone)]
pub struct LdaModel {
    num_topics: usize,
    num_terms: usize,
    alpha: Vec<f64>,
    eta: Vec<f64>,
    sstats: Vec<Vec<f64>>,
    lambda: Vec<Vec<f64>>,
    exp_elog_beta: Vec<Vec<f64>>,
    settings: LdaSettings,
}

/// Persisted form of a trained model (`model-NN.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdaSnapshot {
    pub num_topics: usize,
    pub num_terms: usize,
    pub settings: LdaSettings,
    pub alpha: Vec<f64>,
    pub eta: Vec<f64>,
    /// Topic-word parameters, `num_topics` rows of `num_terms` entries
    pub lambda: Vec<Vec<f64>>,
}

impl LdaModel {
    pub fn train(
        corpus: &Corpus,
        num_terms: usize,
        num_topics: usize,
        settings: &LdaSettings,
        cancel: &CancelFlag,
    ) -> Result<Self> {
        if num_topics == 0 {
            anyhow::bail!("cannot train LDA with zero topics");
        }
        if num_terms == 0 || corpus.is_vacuous() {
            anyhow::bail!("cannot train LDA on an empty corpus");
        }

        let mut rng = StdRng::seed_from_u64(settings.random_state);
        let sstats: Vec<Vec<f64>> = (0..num_topics)
            .map(|_| {
                (0..num_terms)
                    .map(|_| 1.0 + 0.2 * (rng.random::<f64>() - 0.5))
                    .collect()
            })
            .collect();

        let mut model = Self {
            num_topics,
            num_terms,
            alpha: init_alpha(settings.alpha, num_topics),
            eta: vec![init_eta(settings.eta, num_topics); num_terms],
            lambda: Vec::new(),
            exp_elog_beta: Vec::new(),
            sstats,
            settings: settings.clone(),
        };
        model.sync_lambda();

        let chunksize = settings.chunksize.max(1);
        let num_docs = corpus.len() as f64;
        let docs: Vec<&BagOfWords> = corpus.iter().collect();
        let mut num_updates = 0usize;

        for pass in 0..settings.passes {
            for chunk in docs.chunks(chunksize) {
                if cancel.is_cancelled() {
                    anyhow::bail!("training cancelled during pass {}", pass + 1);
                }
                let rho =
                    (OFFSET + pass as f64 + num_updates as f64 / chunksize as f64).powf(-DECAY);

                let mut chunk_sstats = vec![vec![0.0; num_terms]; num_topics];
                let mut gammas = Vec::with_capacity(chunk.len());
                for bow in chunk {
                    gammas.push(model.infer(bow, Some(&mut chunk_sstats)));
                }

                if settings.alpha == Prior::Auto {
                    model.update_alpha(&gammas, rho);
                }

                let scale = num_docs / chunk.len() as f64;
                for (row, chunk_row) in model.sstats.iter_mut().zip(&chunk_sstats) {
                    for (s, c) in row.iter_mut().zip(chunk_row) {
                        *s = (1.0 - rho) * *s + rho * scale * c;
                    }
                }
                model.sync_lambda();

                if settings.eta == Prior::Auto {
                    model.update_eta(rho);
                    model.sync_lambda();
                }

                num_updates += chunk.len();
            }
            debug!(topics = num_topics, pass, "Finished LDA pass");
        }

        Ok(model)
    }

    fn sync_lambda(&mut self) {
        self.lambda = self
            .sstats
            .iter()
            .map(|row| row.iter().zip(&self.eta).map(|(s, e)| s + e).collect())
            .collect();
        self.refresh_beta();
    }

    fn refresh_beta(&mut self) {
        self.exp_elog_beta = self
            .lambda
            .iter()
            .map(|row| dirichlet_expectation(row).into_iter().map(f64::exp).collect())
            .collect();
    }

    /// E-step for one document. Returns gamma; accumulates sufficient
    /// statistics when `sstats` is given.
    fn infer(&self, bow: &BagOfWords, sstats: Option<&mut Vec<Vec<f64>>>) -> Vec<f64> {
        let k = self.num_topics;
        let entries = bow.entries();
        let mut gamma = vec![1.0; k];
        let mut exp_elog_theta = exp_dirichlet_expectation(&gamma);
        let mut phinorm = self.phinorm(entries, &exp_elog_theta);

        for _ in 0..self.settings.iterations {
            let last = gamma.clone();
            for (t, g) in gamma.iter_mut().enumerate() {
                let dot: f64 = entries
                    .iter()
                    .zip(&phinorm)
                    .map(|(&(id, count), norm)| count as f64 / norm * self.exp_elog_beta[t][id as usize])
                    .sum();
                *g = self.alpha[t] + exp_elog_theta[t] * dot;
            }
            exp_elog_theta = exp_dirichlet_expectation(&gamma);
            phinorm = self.phinorm(entries, &exp_elog_theta);

            let mean_change =
                gamma.iter().zip(&last).map(|(a, b)| (a - b).abs()).sum::<f64>() / k as f64;
            if mean_change < self.settings.gamma_threshold {
                break;
            }
        }

        if let Some(sstats) = sstats {
            for (&(id, count), norm) in entries.iter().zip(&phinorm) {
                let w = id as usize;
                for t in 0..k {
                    sstats[t][w] +=
                        exp_elog_theta[t] * count as f64 / norm * self.exp_elog_beta[t][w];
                }
            }
        }

        gamma
    }

    fn phinorm(&self, entries: &[(u32, u32)], exp_elog_theta: &[f64]) -> Vec<f64> {
        entries
            .iter()
            .map(|&(id, _)| {
                exp_elog_theta
                    .iter()
                    .enumerate()
                    .map(|(t, theta)| theta * self.exp_elog_beta[t][id as usize])
                    .sum::<f64>()
                    + PHI_FLOOR
            })
            .collect()
    }

    fn update_alpha(&mut self, gammas: &[Vec<f64>], rho: f64) {
        let n = gammas.len() as f64;
        if n == 0.0 {
            return;
        }
        let mut logphat = vec![0.0; self.num_topics];
        for gamma in gammas {
            for (acc, e) in logphat.iter_mut().zip(dirichlet_expectation(gamma)) {
                *acc += e / n;
            }
        }
        update_dir_prior(&mut self.alpha, n, &logphat, rho);
    }

    fn update_eta(&mut self, rho: f64) {
        let k = self.num_topics as f64;
        let mut logphat = vec![0.0; self.num_terms];
        for row in &self.lambda {
            for (acc, e) in logphat.iter_mut().zip(dirichlet_expectation(row)) {
                *acc += e / k;
            }
        }
        update_dir_prior(&mut self.eta, k, &logphat, rho);
    }

    pub fn num_terms(&self) -> usize {
        self.num_terms
    }

    pub fn snapshot(&self) -> LdaSnapshot {
        LdaSnapshot {
            num_topics: self.num_topics,
            num_terms: self.num_terms,
            settings: self.settings.clone(),
            alpha: self.alpha.clone(),
            eta: self.eta.clone(),
            lambda: self.lambda.clone(),
        }
    }

    /// Rebuild a model from its snapshot. Shapes must agree with the
    /// declared topic and term counts and every parameter must be positive.
    pub fn from_snapshot(snapshot: LdaSnapshot) -> Result<Self> {
        let LdaSnapshot {
            num_topics,
            num_terms,
            settings,
            alpha,
            eta,
            lambda,
        } = snapshot;

        if num_topics == 0 || num_terms == 0 {
            anyhow::bail!("model snapshot has {num_topics} topics over {num_terms} terms");
        }
        if alpha.len() != num_topics || eta.len() != num_terms {
            anyhow::bail!(
                "model snapshot priors have {} and {} entries, expected {num_topics} and {num_terms}",
                alpha.len(),
                eta.len()
            );
        }
        if lambda.len() != num_topics || lambda.iter().any(|row| row.len() != num_terms) {
            anyhow::bail!("model snapshot lambda is not {num_topics} x {num_terms}");
        }
        let positive = |v: &f64| *v > 0.0 && v.is_finite();
        if !alpha.iter().all(positive)
            || !eta.iter().all(positive)
            || !lambda.iter().flatten().all(positive)
        {
            anyhow::bail!("model snapshot holds a non-positive parameter");
        }

        let sstats = lambda
            .iter()
            .map(|row| row.iter().zip(&eta).map(|(l, e)| l - e).collect())
            .collect();
        let mut model = Self {
            num_topics,
            num_terms,
            alpha,
            eta,
            sstats,
            lambda,
            exp_elog_beta: Vec::new(),
            settings,
        };
        model.refresh_beta();
        Ok(model)
    }

    /// Full (unfiltered) topic distribution of a document.
    pub fn topic_distribution(&self, bow: &BagOfWords) -> Vec<f64> {
        let gamma = self.infer(bow, None);
        let total: f64 = gamma.iter().sum();
        gamma.into_iter().map(|g| g / total).collect()
    }
}

impl TopicModel for LdaModel {
    fn num_topics(&self) -> usize {
        self.num_topics
    }

    fn document_topics(&self, bow: &BagOfWords) -> Vec<(usize, f64)> {
        self.topic_distribution(bow)
            .into_iter()
            .enumerate()
            .filter(|&(_, p)| p >= self.settings.minimum_probability)
            .collect()
    }

    fn top_terms(&self, topic: usize, n: usize) -> Vec<(u32, f64)> {
        let Some(row) = self.lambda.get(topic) else {
            return Vec::new();
        };
        let total: f64 = row.iter().sum();
        let mut terms: Vec<(u32, f64)> = row
            .iter()
            .enumerate()
            .map(|(id, &w)| (id as u32, w / total))
            .collect();
        terms.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        terms.truncate(n);
        terms
    }

    fn parameters(&self) -> Result<Option<serde_json::Value>> {
        Ok(Some(serde_json::to_value(self.snapshot())?))
    }
}

fn exp_dirichlet_expectation(params: &[f64]) -> Vec<f64> {
    dirichlet_expectation(params).into_iter().map(f64::exp).collect()
}

fn init_alpha(prior: Prior, k: usize) -> Vec<f64> {
    match prior {
        Prior::Symmetric | Prior::Auto => vec![1.0 / k as f64; k],
        Prior::Asymmetric => {
            let raw: Vec<f64> = (0..k).map(|i| 1.0 / (i as f64 + (k as f64).sqrt())).collect();
            let total: f64 = raw.iter().sum();
            raw.into_iter().map(|a| a / total).collect()
        }
        Prior::Value(v) => vec![v; k],
    }
}

fn init_eta(prior: Prior, k: usize) -> f64 {
    match prior {
        Prior::Value(v) => v,
        _ => 1.0 / k as f64,
    }
}

/// One Newton step on a Dirichlet prior, kept only if every entry stays
/// positive.
fn update_dir_prior(prior: &mut [f64], n: f64, logphat: &[f64], rho: f64) {
    let total: f64 = prior.iter().sum();
    let gradf: Vec<f64> = prior
        .iter()
        .zip(logphat)
        .map(|(&p, &l)| n * (digamma(total) - digamma(p) + l))
        .collect();
    let c = n * trigamma(total);
    let q: Vec<f64> = prior.iter().map(|&p| -n * trigamma(p)).collect();

    let b = gradf.iter().zip(&q).map(|(g, q)| g / q).sum::<f64>()
        / (1.0 / c + q.iter().map(|q| 1.0 / q).sum::<f64>());

    let updated: Vec<f64> = prior
        .iter()
        .zip(gradf.iter().zip(&q))
        .map(|(&p, (g, q))| p + rho * (-(g - b) / q))
        .collect();

    if updated.iter().all(|&p| p > 0.0 && p.is_finite()) {
        prior.copy_from_slice(&updated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Two obvious themes over a six-word vocabulary.
    fn two_theme_corpus() -> Corpus {
        let docs: Vec<Vec<(u32, u32)>> = (0..20)
            .map(|i| {
                if i % 2 == 0 {
                    vec![(0, 4), (1, 3), (2, 3)]
                } else {
                    vec![(3, 4), (4, 3), (5, 3)]
                }
            })
            .collect();
        let vectors = docs
            .into_iter()
            .map(|d| BagOfWords::from_counts(d.into_iter().collect::<HashMap<_, _>>()))
            .collect::<Vec<_>>();
        let names = (0..vectors.len()).map(|i| format!("d{i}")).collect();
        Corpus::new(names, vectors)
    }

    fn settings() -> LdaSettings {
        LdaSettings {
            chunksize: 5,
            passes: 10,
            ..Default::default()
        }
    }

    #[test]
    fn separates_two_obvious_themes() {
        let corpus = two_theme_corpus();
        let settings = LdaSettings {
            passes: 40,
            ..settings()
        };
        let model = LdaModel::train(&corpus, 6, 2, &settings, &CancelFlag::default()).unwrap();

        let even = model.topic_distribution(corpus.get(0).unwrap());
        let odd = model.topic_distribution(corpus.get(1).unwrap());
        let even_topic = if even[0] > even[1] { 0 } else { 1 };
        let odd_topic = if odd[0] > odd[1] { 0 } else { 1 };
        assert_ne!(even_topic, odd_topic);
        assert!(even[even_topic] > 0.8, "got {even:?}");

        let top: Vec<u32> = model.top_terms(even_topic, 3).iter().map(|t| t.0).collect();
        let mut sorted = top.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 1, 2]);
    }

    #[test]
    fn training_is_reproducible() {
        let corpus = two_theme_corpus();
        let a = LdaModel::train(&corpus, 6, 3, &settings(), &CancelFlag::default()).unwrap();
        let b = LdaModel::train(&corpus, 6, 3, &settings(), &CancelFlag::default()).unwrap();
        assert_eq!(a.lambda, b.lambda);
        assert_eq!(
            a.document_topics(corpus.get(3).unwrap()),
            b.document_topics(corpus.get(3).unwrap())
        );
    }

    #[test]
    fn distribution_sums_to_one_and_filters_small_topics() {
        let corpus = two_theme_corpus();
        let model = LdaModel::train(&corpus, 6, 4, &settings(), &CancelFlag::default()).unwrap();
        let full = model.topic_distribution(corpus.get(0).unwrap());
        assert!((full.iter().sum::<f64>() - 1.0).abs() < 1e-9);

        let kept = model.document_topics(corpus.get(0).unwrap());
        assert!(kept.iter().all(|&(_, p)| p >= 0.01));
    }

    #[test]
    fn empty_document_gets_prior_shaped_distribution() {
        let corpus = two_theme_corpus();
        let model = LdaModel::train(&corpus, 6, 2, &settings(), &CancelFlag::default()).unwrap();
        let dist = model.topic_distribution(&BagOfWords::default());
        let alpha_total: f64 = model.alpha.iter().sum();
        assert!((dist[0] - model.alpha[0] / alpha_total).abs() < 1e-9);
    }

    #[test]
    fn rejects_empty_corpus() {
        let corpus = Corpus::new(vec!["a".into()], vec![BagOfWords::default()]);
        assert!(LdaModel::train(&corpus, 3, 2, &settings(), &CancelFlag::default()).is_err());
    }

    #[test]
    fn cancelled_training_stops_with_an_error() {
        let corpus = two_theme_corpus();
        let cancel = CancelFlag::default();
        cancel.cancel();
        let err = LdaModel::train(&corpus, 6, 2, &settings(), &cancel).unwrap_err();
        assert!(err.to_string().contains("cancelled"), "got {err}");
    }

    #[test]
    fn reloaded_model_answers_like_the_original() {
        let corpus = two_theme_corpus();
        let model = LdaModel::train(&corpus, 6, 3, &settings(), &CancelFlag::default()).unwrap();

        let json = serde_json::to_string(&model.snapshot()).unwrap();
        let restored = LdaModel::from_snapshot(serde_json::from_str(&json).unwrap()).unwrap();

        for bow in corpus.iter().take(4) {
            assert_eq!(model.document_topics(bow), restored.document_topics(bow));
        }
        assert_eq!(model.top_terms(1, 4), restored.top_terms(1, 4));
    }

    #[test]
    fn snapshot_with_wrong_shape_is_rejected() {
        let corpus = two_theme_corpus();
        let model = LdaModel::train(&corpus, 6, 2, &settings(), &CancelFlag::default()).unwrap();
        let mut snapshot = model.snapshot();
        snapshot.lambda[1].pop();
        assert!(LdaModel::from_snapshot(snapshot).is_err());
    }

    #[test]
    fn asymmetric_alpha_is_normalized_and_decreasing() {
        let alpha = init_alpha(Prior::Asymmetric, 4);
        assert!((alpha.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(alpha.windows(2).all(|w| w[0] > w[1]));
    }
}
