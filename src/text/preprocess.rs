// Raw text -> filtered token stream.
//
// A token is kept when all three hold:
//   - neither its lemma nor its surface form (lower-cased) is a stopword
//   - its POS tag is in the allowed set
//   - it is not inside an entity span of an excluded type
// Kept tokens are emitted in text order, then stemmed if a stemmer is set.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use rust_stemmers::{Algorithm, Stemmer};
use tracing::warn;

use super::analyzer::{AnalyzedToken, LinguisticAnalyzer};
use crate::config::{PreprocessSettings, TokenForm};
use crate::corpus::source::Document;
use crate::error::{PipelineError, ReadFailure};

/// Filtered tokens of one document. Empty, never absent, when nothing survives.
pub type TokenStream = Vec<String>;

pub struct ExclusionConfig {
    pub stopwords: HashSet<String>,
    pub postags: HashSet<String>,
    pub entities: HashSet<String>,
    pub stemmer: Option<Stemmer>,
    pub token_form: TokenForm,
}

impl ExclusionConfig {
    pub fn from_settings(
        settings: &PreprocessSettings,
        stopwords: HashSet<String>,
    ) -> Result<Self, PipelineError> {
        let stemmer = match settings.stemmer.as_deref() {
            Some(language) => Some(Stemmer::create(stemmer_algorithm(language)?)),
            None => None,
        };
        Ok(Self {
            stopwords,
            postags: settings.postags.iter().cloned().collect(),
            entities: settings.entities.iter().cloned().collect(),
            stemmer,
            token_form: settings.token_form,
        })
    }

    fn keeps(&self, token: &AnalyzedToken) -> bool {
        if self.stopwords.contains(&token.lemma.to_lowercase())
            || self.stopwords.contains(&token.text.to_lowercase())
        {
            return false;
        }
        if !self.postags.contains(&token.pos) {
            return false;
        }
        match &token.entity {
            Some(label) => !self.entities.contains(label),
            None => true,
        }
    }
}

fn stemmer_algorithm(language: &str) -> Result<Algorithm, PipelineError> {
    let algorithm = match language.to_lowercase().as_str() {
        "danish" => Algorithm::Danish,
        "dutch" => Algorithm::Dutch,
        "english" => Algorithm::English,
        "french" => Algorithm::French,
        "german" => Algorithm::German,
        "italian" => Algorithm::Italian,
        "portuguese" => Algorithm::Portuguese,
        "spanish" => Algorithm::Spanish,
        "swedish" => Algorithm::Swedish,
        other => {
            return Err(PipelineError::config(format!(
                "no stemmer for language '{other}'"
            )))
        }
    };
    Ok(algorithm)
}

pub struct TextPreprocessor {
    analyzer: Arc<dyn LinguisticAnalyzer>,
    exclusions: ExclusionConfig,
}

impl TextPreprocessor {
    pub fn new(analyzer: Arc<dyn LinguisticAnalyzer>, exclusions: ExclusionConfig) -> Self {
        Self {
            analyzer,
            exclusions,
        }
    }

    /// Filter one text. Empty input gives an empty stream.
    pub fn process(&self, text: &str) -> Result<TokenStream> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let tokens = self.analyzer.analyze(text)?;
        let stream = tokens
            .iter()
            .filter(|t| self.exclusions.keeps(t))
            .map(|t| {
                let form = match self.exclusions.token_form {
                    TokenForm::Lemma => t.lemma.to_lowercase(),
                    TokenForm::Surface => t.text.to_lowercase(),
                };
                match &self.exclusions.stemmer {
                    Some(stemmer) => stemmer.stem(&form).into_owned(),
                    None => form,
                }
            })
            .collect();
        Ok(stream)
    }

    /// Filter one document. An analyzer error degrades to an empty stream
    /// and is returned as a failure record instead of an error.
    pub fn process_document(&self, doc: &Document) -> (TokenStream, Option<ReadFailure>) {
        if let Some(failure) = &doc.read_failure {
            return (Vec::new(), Some(failure.clone()));
        }
        match self.process(&doc.text) {
            Ok(stream) => (stream, None),
            Err(e) => {
                warn!(document = doc.name, error = %e, "Analyzer failed, using empty token stream");
                (
                    Vec::new(),
                    Some(ReadFailure {
                        name: doc.name.clone(),
                        reason: format!("analysis failed: {e}"),
                    }),
                )
            }
        }
    }
}
