// topicsweep: topic-count selection for plain-text corpora
//
// This is the library root. Each module corresponds to a stage (or the
// plumbing) of the corpus -> phrases -> bag-of-words -> sweep pipeline.

pub mod config;
pub mod corpus;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod text;
