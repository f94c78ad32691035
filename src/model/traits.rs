// Topic model collaborator traits used by the sweep.
//
// The sweep only needs three things from a topic-model library: train a model
// for a topic count, ask it for a document's topic distribution and a topic's
// top terms, and score it for coherence. The default implementations live in
// `lda` and `coherence`; anything else can be plugged in through these traits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

use crate::corpus::bow::{BagOfWords, Corpus};
use crate::corpus::dictionary::Dictionary;
use crate::text::preprocess::TokenStream;

/// A trained, queryable topic model.
pub trait TopicModel: Send + Sync {
    fn num_topics(&self) -> usize;

    /// `(topic, probability)` pairs for one document. Topics with negligible
    /// probability may be omitted.
    fn document_topics(&self, bow: &BagOfWords) -> Vec<(usize, f64)>;

    /// The `n` highest-weighted `(term id, weight)` pairs of a topic,
    /// heaviest first.
    fn top_terms(&self, topic: usize, n: usize) -> Vec<(u32, f64)>;

    /// Parameters needed to reload the model later, or `None` when the
    /// implementation cannot be persisted.
    fn parameters(&self) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }
}

/// Stop signal shared between the sweep and one training run. Clones share
/// the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Trains one model per topic count with fixed, shared hyperparameters.
///
/// Long-running trainers should check `cancel` between units of work and
/// return an error once it is set.
pub trait TopicTrainer: Send + Sync {
    fn train(
        &self,
        corpus: &Corpus,
        dictionary: &Dictionary,
        topic_count: usize,
        cancel: &CancelFlag,
    ) -> Result<Box<dyn TopicModel>>;
}

/// Scores a trained model against evaluation texts. Higher is better; scores
/// are only comparable between runs of the same scorer configuration.
pub trait CoherenceScorer: Send + Sync {
    fn score(
        &self,
        model: &dyn TopicModel,
        texts: &[TokenStream],
        dictionary: &Dictionary,
    ) -> Result<f64>;
}
