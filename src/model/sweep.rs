// Coherence sweep: train one model per candidate topic count, score each,
// keep the best.
//
// Candidates are independent, so they run on the blocking pool with at most
// `concurrency` in flight. Results are collected with `buffered`, which keeps
// them in input order no matter which finishes first; the tie-break ("first
// candidate with the maximal score wins") depends on that order.
//
// A failed candidate (trainer error, scorer error, non-finite score, panic or
// timeout) is logged and recorded, and the sweep moves on. Only when every
// candidate fails does the sweep itself fail. A timed-out candidate has its
// cancel flag raised so the worker thread stops at the trainer's next check.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};

use super::traits::{CancelFlag, CoherenceScorer, TopicModel, TopicTrainer};
use crate::config::validate_topic_counts;
use crate::corpus::bow::Corpus;
use crate::corpus::dictionary::Dictionary;
use crate::error::{PipelineError, TrainingFailure};
use crate::text::preprocess::TokenStream;

/// Index of the first maximal value. NaN never wins; `None` when the slice
/// is empty or holds only NaN.
pub fn select_first_max(scores: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some(b) if score <= scores[b] => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Split ordered outcomes into successes and failures, each keeping the
/// original relative order.
pub fn partition_outcomes<T, E>(outcomes: Vec<Result<T, E>>) -> (Vec<T>, Vec<E>) {
    let mut ok = Vec::new();
    let mut failed = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(value) => ok.push(value),
            Err(err) => failed.push(err),
        }
    }
    (ok, failed)
}

/// A trained, scored candidate.
#[derive(Clone)]
pub struct CandidateModel {
    pub topic_count: usize,
    pub model: Arc<dyn TopicModel>,
    pub coherence: f64,
}

impl std::fmt::Debug for CandidateModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateModel")
            .field("topic_count", &self.topic_count)
            .field("coherence", &self.coherence)
            .finish_non_exhaustive()
    }
}

/// Shared, read-only inputs handed to every candidate.
#[derive(Clone)]
pub struct SweepInputs {
    pub corpus: Arc<Corpus>,
    pub dictionary: Arc<Dictionary>,
    /// Phrase-merged streams used as coherence evaluation texts
    pub texts: Arc<Vec<TokenStream>>,
}

/// One row of the coherence table.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CoherenceRow {
    pub topic_count: usize,
    pub coherence: Option<f64>,
}

#[derive(Debug)]
pub struct SweepReport {
    /// Successful candidates, in input order
    pub candidates: Vec<CandidateModel>,
    pub failures: Vec<TrainingFailure>,
    /// Index into `candidates`
    winner: usize,
    /// Topic counts as requested
    order: Vec<usize>,
}

impl SweepReport {
    pub fn winner(&self) -> &CandidateModel {
        &self.candidates[self.winner]
    }

    /// Every requested count with its score, `None` for failed candidates.
    pub fn coherence_table(&self) -> Vec<CoherenceRow> {
        self.order
            .iter()
            .map(|&topic_count| CoherenceRow {
                topic_count,
                coherence: self
                    .candidates
                    .iter()
                    .find(|c| c.topic_count == topic_count)
                    .map(|c| c.coherence),
            })
            .collect()
    }
}

pub struct SweepEngine {
    trainer: Arc<dyn TopicTrainer>,
    scorer: Arc<dyn CoherenceScorer>,
    concurrency: usize,
    timeout: Option<Duration>,
}

impl SweepEngine {
    pub fn new(trainer: Arc<dyn TopicTrainer>, scorer: Arc<dyn CoherenceScorer>) -> Self {
        Self {
            trainer,
            scorer,
            concurrency: 1,
            timeout: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Budget per candidate. A candidate over budget is recorded as failed
    /// and its trainer is cancelled. The worker thread keeps running until
    /// the trainer next checks the flag (once per LDA chunk); scoring is not
    /// interruptible.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(
        &self,
        inputs: &SweepInputs,
        topic_counts: &[usize],
    ) -> Result<SweepReport, PipelineError> {
        validate_topic_counts(topic_counts)?;

        info!(
            candidates = ?topic_counts,
            concurrency = self.concurrency,
            documents = inputs.corpus.len(),
            vocabulary = inputs.dictionary.len(),
            "Starting coherence sweep"
        );

        let pb = ProgressBar::new(topic_counts.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  Sweep [{bar:30}] {pos}/{len} topic counts ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let outcomes: Vec<Result<CandidateModel, TrainingFailure>> =
            stream::iter(topic_counts.iter().map(|&topic_count| {
                let pb = pb.clone();
                async move {
                    let outcome = self.evaluate(inputs.clone(), topic_count).await;
                    pb.inc(1);
                    outcome
                }
            }))
            .buffered(self.concurrency)
            .collect()
            .await;
        pb.finish_and_clear();

        let (candidates, failures) = partition_outcomes(outcomes);

        for failure in &failures {
            warn!(
                topic_count = failure.topic_count,
                reason = %failure.reason,
                "Candidate failed, skipping"
            );
        }

        let scores: Vec<f64> = candidates.iter().map(|c| c.coherence).collect();
        let Some(winner) = select_first_max(&scores) else {
            return Err(PipelineError::SweepExhausted {
                attempted: topic_counts.len(),
                failures,
            });
        };

        info!(
            topic_count = candidates[winner].topic_count,
            coherence = candidates[winner].coherence,
            succeeded = candidates.len(),
            failed = failures.len(),
            "Selected model"
        );

        Ok(SweepReport {
            candidates,
            failures,
            winner,
            order: topic_counts.to_vec(),
        })
    }

    async fn evaluate(
        &self,
        inputs: SweepInputs,
        topic_count: usize,
    ) -> Result<CandidateModel, TrainingFailure> {
        let trainer = Arc::clone(&self.trainer);
        let scorer = Arc::clone(&self.scorer);
        let cancel = CancelFlag::default();
        let worker_cancel = cancel.clone();
        let task = tokio::task::spawn_blocking(move || {
            train_and_score(
                trainer.as_ref(),
                scorer.as_ref(),
                &inputs,
                topic_count,
                &worker_cancel,
            )
        });

        let joined = match self.timeout {
            Some(budget) => match tokio::time::timeout(budget, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    cancel.cancel();
                    return Err(TrainingFailure {
                        topic_count,
                        reason: format!("timed out after {}s", budget.as_secs_f64()),
                    })
                }
            },
            None => task.await,
        };

        match joined {
            Ok(Ok(candidate)) => Ok(candidate),
            Ok(Err(e)) => Err(TrainingFailure {
                topic_count,
                reason: format!("{e:#}"),
            }),
            Err(e) => Err(TrainingFailure {
                topic_count,
                reason: format!("worker panicked: {e}"),
            }),
        }
    }
}

fn train_and_score(
    trainer: &dyn TopicTrainer,
    scorer: &dyn CoherenceScorer,
    inputs: &SweepInputs,
    topic_count: usize,
    cancel: &CancelFlag,
) -> Result<CandidateModel> {
    let model = trainer.train(&inputs.corpus, &inputs.dictionary, topic_count, cancel)?;
    let coherence = scorer.score(model.as_ref(), &inputs.texts, &inputs.dictionary)?;
    if !coherence.is_finite() {
        anyhow::bail!("coherence score is not finite ({coherence})");
    }
    info!(topic_count, coherence, "Scored candidate");
    Ok(CandidateModel {
        topic_count,
        model: Arc::from(model),
        coherence,
    })
}
