// Reloading a finished run to label new documents.
//
// A run leaves its dictionary, both phrase models and the selected topic
// model under models/<corpus>/. Loading them back restores the same vector
// space and the same topics, so documents can be filtered, phrase-merged and
// assigned topics without training again.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tracing::info;

use super::aggregate::{doc_topic_rows, topic_terms, DocTopicRow, DominanceTable, TopicTerms};
use super::run::{build_preprocessor, tokenize_documents};
use crate::config::PipelineConfig;
use crate::corpus::bow::Corpus;
use crate::corpus::dictionary::{Dictionary, DictionarySnapshot};
use crate::corpus::source::DocumentSource;
use crate::error::{PipelineError, ReadFailure};
use crate::model::lda::{LdaModel, LdaSnapshot};
use crate::model::traits::TopicModel;
use crate::output::report::model_file_name;
use crate::text::analyzer::LinguisticAnalyzer;
use crate::text::phrases::{NgramModels, PhraseModel, PhraseSnapshot};
use crate::text::preprocess::TokenStream;

/// The persisted state of one run.
pub struct SavedModels {
    pub dictionary: Dictionary,
    pub ngrams: NgramModels,
    pub model: LdaModel,
}

impl SavedModels {
    /// Load from a models directory. With `topic_count` unset the directory
    /// must hold exactly one `model-NN.json`.
    pub fn load(dir: &Path, topic_count: Option<usize>) -> Result<Self> {
        let model_path = match topic_count {
            Some(k) => dir.join(model_file_name(k)),
            None => single_model_file(dir)?,
        };

        let dictionary = Dictionary::from_snapshot(read_json::<DictionarySnapshot>(
            &dir.join("dictionary.json"),
        )?)?;
        let ngrams = NgramModels {
            bigrams: PhraseModel::from_snapshot(read_json::<PhraseSnapshot>(
                &dir.join("bigrams.json"),
            )?),
            trigrams: PhraseModel::from_snapshot(read_json::<PhraseSnapshot>(
                &dir.join("trigrams.json"),
            )?),
        };
        let model = LdaModel::from_snapshot(read_json::<LdaSnapshot>(&model_path)?)
            .with_context(|| format!("Invalid model in {}", model_path.display()))?;

        if model.num_terms() != dictionary.len() {
            return Err(PipelineError::config(format!(
                "{} does not match the dictionary in {} ({} terms)",
                model_path.display(),
                dir.display(),
                dictionary.len()
            ))
            .into());
        }

        info!(
            model = %model_path.display(),
            topics = model.num_topics(),
            vocabulary = dictionary.len(),
            "Loaded saved models"
        );
        Ok(Self {
            dictionary,
            ngrams,
            model,
        })
    }
}

fn single_model_file(dir: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(dir).map_err(|e| {
        PipelineError::config(format!("cannot read models directory {}: {e}", dir.display()))
    })?;

    let mut models: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("model-") && n.ends_with(".json"))
        })
        .collect();
    models.sort();

    match models.len() {
        1 => Ok(models.remove(0)),
        0 => Err(PipelineError::config(format!("no model-NN.json in {}", dir.display())).into()),
        n => Err(PipelineError::config(format!(
            "{n} saved models in {}; pick one with --topics",
            dir.display()
        ))
        .into()),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| PipelineError::config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Topic assignments for a directory of documents under saved models.
pub struct Inference {
    pub rows: Vec<DocTopicRow>,
    pub dominance: DominanceTable,
    pub topics: Vec<TopicTerms>,
    pub read_failures: Vec<ReadFailure>,
}

/// Filter, phrase-merge and vectorize every document with the saved
/// dictionary and phrase models, then assign topics with the saved model.
/// Tokens the saved dictionary does not know are dropped.
pub fn label_documents(
    saved: &SavedModels,
    source: &DocumentSource,
    config: &PipelineConfig,
    analyzer: Arc<dyn LinguisticAnalyzer>,
) -> Result<Inference> {
    if source.is_empty() {
        return Err(PipelineError::config(format!(
            "no *.{} documents in {}",
            config.corpus.extension,
            source.dir().display()
        ))
        .into());
    }

    let preprocessor = build_preprocessor(config, analyzer)?;
    let (names, streams, read_failures) = tokenize_documents(source, &preprocessor);

    let vectors = streams
        .iter()
        .map(|s| {
            let merged: TokenStream = saved.ngrams.apply(s);
            saved.dictionary.doc2bow(&merged)
        })
        .collect();
    let corpus = Corpus::new(names, vectors);

    let rows = doc_topic_rows(&saved.model, &corpus);
    let dominance = DominanceTable::from_rows(&rows, config.report.precision);
    let topics = topic_terms(&saved.model, &saved.dictionary, config.report.top_terms);

    info!(
        documents = rows.len(),
        dominant_topics = dominance.entries.len(),
        "Labeled documents with saved model"
    );
    Ok(Inference {
        rows,
        dominance,
        topics,
        read_failures,
    })
}
