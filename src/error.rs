// Fatal error taxonomy for the pipeline.
//
// Per-document and per-candidate failures are recovered where they happen
// and recorded as plain structs (ReadFailure, TrainingFailure). Only the two
// variants below ever terminate a run.

use serde::Serialize;

/// A document that could not be read or analyzed. It still occupies its
/// ordinal position, with an empty token stream.
#[derive(Debug, Clone, Serialize)]
pub struct ReadFailure {
    pub name: String,
    pub reason: String,
}

/// A candidate topic count whose model could not be trained or scored.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingFailure {
    pub topic_count: usize,
    pub reason: String,
}

/// Errors that abort the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid or missing configuration, detected before the sweep starts.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Every candidate topic count failed; there is no model to select.
    #[error(
        "sweep exhausted: 0 of {attempted} candidate topic counts produced a model ({})",
        summarize(.failures)
    )]
    SweepExhausted {
        attempted: usize,
        failures: Vec<TrainingFailure>,
    },
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

fn summarize(failures: &[TrainingFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.topic_count, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}
