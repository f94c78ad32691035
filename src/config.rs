use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::text::analyzer::RULE_ENTITY_LABEL;

/// Runtime locations loaded from environment variables.
///
/// The .env file is loaded at startup via dotenvy; CLI flags override
/// whatever is found here.
pub struct Config {
    /// Directory of plain-text documents (TOPICSWEEP_CORPUS_DIR)
    pub corpus_dir: Option<PathBuf>,
    /// Root for dated model/topic artifact directories (TOPICSWEEP_OUTPUT_DIR)
    pub output_dir: PathBuf,
    /// TOML pipeline settings (TOPICSWEEP_CONFIG). Defaults apply when unset.
    pub config_path: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            corpus_dir: env::var("TOPICSWEEP_CORPUS_DIR").ok().map(PathBuf::from),
            output_dir: env::var("TOPICSWEEP_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            config_path: env::var("TOPICSWEEP_CONFIG").ok().map(PathBuf::from),
        })
    }

    /// Check that a corpus directory is configured.
    pub fn require_corpus(&self) -> Result<&Path> {
        match &self.corpus_dir {
            Some(dir) => Ok(dir),
            None => Err(PipelineError::config(
                "No corpus directory. Pass --corpus or set TOPICSWEEP_CORPUS_DIR in your .env file.",
            )
            .into()),
        }
    }

    /// Load pipeline settings from the configured TOML file, or defaults.
    pub fn pipeline(&self) -> Result<PipelineConfig> {
        match &self.config_path {
            Some(path) => PipelineConfig::load(path),
            None => Ok(PipelineConfig::default()),
        }
    }
}

/// Every tunable of the pipeline, grouped the way the stages consume them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub corpus: CorpusSettings,
    pub stopwords: StopwordSettings,
    pub preprocess: PreprocessSettings,
    pub phrases: PhraseSettings,
    pub dictionary: DictionarySettings,
    pub sweep: SweepSettings,
    pub lda: LdaSettings,
    pub coherence: CoherenceSettings,
    pub report: ReportSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    /// File extension (without the dot) of the documents to read
    pub extension: String,
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self {
            extension: "txt".to_string(),
        }
    }
}

/// Where the stopword list comes from. A file wins over a built-in language.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StopwordSettings {
    /// Built-in list from the stop-words crate (e.g. "english", "spanish")
    pub language: Option<String>,
    /// One word per line, or a CSV file with a header row
    pub file: Option<PathBuf>,
    /// Column holding the words when `file` is a CSV
    pub column: String,
}

impl Default for StopwordSettings {
    fn default() -> Self {
        Self {
            language: Some("english".to_string()),
            file: None,
            column: "word".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenForm {
    Lemma,
    Surface,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessSettings {
    /// Part-of-speech tags a token must carry to be kept
    pub postags: Vec<String>,
    /// Entity types whose spans are dropped. The defaults cover the usual
    /// person and organization labels plus the built-in analyzer's label.
    pub entities: Vec<String>,
    /// Snowball stemmer language, applied to kept tokens last
    pub stemmer: Option<String>,
    pub token_form: TokenForm,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        let postags = [
            "NOUN", "VERB", "ADJ", "ADV", "ADP", "AUX", "DET", "PRON", "PROPN", "X",
        ];
        Self {
            postags: postags.iter().map(|t| t.to_string()).collect(),
            entities: vec![
                "PER".to_string(),
                "ORG".to_string(),
                RULE_ENTITY_LABEL.to_string(),
            ],
            stemmer: None,
            token_form: TokenForm::Lemma,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhraseScoring {
    /// `(count_ab - min_count) / (count_a * count_b) * vocab_len`
    Default,
    /// Normalized pointwise mutual information, in [-1, 1]
    Npmi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhraseSettings {
    /// Pairs seen fewer times than this are never merged
    pub min_count: u32,
    /// A pair is merged when its score is strictly above this
    pub threshold: f64,
    pub scoring: PhraseScoring,
    pub delimiter: String,
}

impl Default for PhraseSettings {
    fn default() -> Self {
        Self {
            min_count: 5,
            threshold: 10.0,
            scoring: PhraseScoring::Default,
            delimiter: "_".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionarySettings {
    /// Drop tokens appearing in fewer documents than this
    pub no_below: u32,
    /// Drop tokens appearing in more than this fraction of documents
    pub no_above: f64,
    /// Keep at most this many tokens (most frequent by document count)
    pub keep_n: usize,
}

impl Default for DictionarySettings {
    fn default() -> Self {
        Self {
            no_below: 5,
            no_above: 0.5,
            keep_n: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    /// Candidate topic counts, in tie-break order
    pub topic_counts: Vec<usize>,
    /// Candidates trained at once (1 = sequential)
    pub concurrency: usize,
    /// Wall-clock budget per candidate; exceeding it counts as a training
    /// failure. The trainer is cancelled at its next chunk boundary, so an
    /// over-budget candidate may hold its worker thread slightly longer.
    pub timeout_secs: Option<u64>,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            topic_counts: vec![20, 30, 40, 50, 60],
            concurrency: 1,
            timeout_secs: None,
        }
    }
}

/// Dirichlet prior setting for LDA's alpha or eta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPrior", into = "RawPrior")]
pub enum Prior {
    /// 1 / topic_count for every entry
    Symmetric,
    /// 1 / (i + sqrt(topic_count)), normalized (alpha only)
    Asymmetric,
    /// Start symmetric, then learn from the data after each chunk
    Auto,
    /// A fixed value for every entry
    Value(f64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawPrior {
    Name(String),
    Value(f64),
}

impl TryFrom<RawPrior> for Prior {
    type Error = String;

    fn try_from(raw: RawPrior) -> Result<Self, Self::Error> {
        match raw {
            RawPrior::Value(v) if v > 0.0 => Ok(Prior::Value(v)),
            RawPrior::Value(v) => Err(format!("prior must be positive, got {v}")),
            RawPrior::Name(name) => match name.as_str() {
                "symmetric" => Ok(Prior::Symmetric),
                "asymmetric" => Ok(Prior::Asymmetric),
                "auto" => Ok(Prior::Auto),
                other => Err(format!(
                    "unknown prior '{other}' (expected symmetric, asymmetric, auto or a number)"
                )),
            },
        }
    }
}

impl From<Prior> for RawPrior {
    fn from(prior: Prior) -> Self {
        match prior {
            Prior::Symmetric => RawPrior::Name("symmetric".to_string()),
            Prior::Asymmetric => RawPrior::Name("asymmetric".to_string()),
            Prior::Auto => RawPrior::Name("auto".to_string()),
            Prior::Value(v) => RawPrior::Value(v),
        }
    }
}

/// Hyperparameters shared by every candidate in the sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LdaSettings {
    /// Documents per online update
    pub chunksize: usize,
    /// Full passes over the corpus
    pub passes: usize,
    /// Max E-step iterations per document
    pub iterations: usize,
    /// E-step stops once the mean change in gamma drops below this
    pub gamma_threshold: f64,
    pub alpha: Prior,
    pub eta: Prior,
    pub random_state: u64,
    /// Topics below this probability are omitted from document rows
    pub minimum_probability: f64,
}

impl Default for LdaSettings {
    fn default() -> Self {
        Self {
            chunksize: 100,
            passes: 2,
            iterations: 50,
            gamma_threshold: 0.001,
            alpha: Prior::Auto,
            eta: Prior::Auto,
            random_state: 100,
            minimum_probability: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoherenceMeasure {
    #[serde(rename = "c_v")]
    CV,
    #[serde(rename = "c_npmi")]
    CNpmi,
    #[serde(rename = "u_mass")]
    UMass,
}

impl CoherenceMeasure {
    /// Sliding window size used when none is configured.
    pub fn default_window(self) -> Option<usize> {
        match self {
            CoherenceMeasure::CV => Some(110),
            CoherenceMeasure::CNpmi => Some(10),
            CoherenceMeasure::UMass => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoherenceSettings {
    pub measure: CoherenceMeasure,
    /// Top terms per topic that enter the score
    pub topn: usize,
    /// Sliding window size (ignored by u_mass)
    pub window: Option<usize>,
}

impl Default for CoherenceSettings {
    fn default() -> Self {
        Self {
            measure: CoherenceMeasure::CV,
            topn: 20,
            window: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Terms listed per topic
    pub top_terms: usize,
    /// Most-dominant topics shown in the terminal summary
    pub head_topics: usize,
    /// Decimal places of dominance fractions, at most `MAX_PRECISION`
    pub precision: u32,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            top_terms: 15,
            head_topics: 10,
            precision: 4,
        }
    }
}

/// Beyond this many decimals an f64 fraction has no digits left to round.
pub const MAX_PRECISION: u32 = 15;

impl PipelineConfig {
    /// Read settings from a TOML file. Missing sections take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        let config: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
            .map_err(|e| PipelineError::config(format!("{e:#}")))?;
        Ok(config)
    }

    /// Serialize settings as TOML (used by `init-config`).
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Pre-flight checks. Anything reported here stops the run before any
    /// document is read.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.corpus.extension.is_empty() {
            return Err(PipelineError::config("corpus.extension must not be empty"));
        }
        if self.stopwords.file.is_none() && self.stopwords.language.is_none() {
            return Err(PipelineError::config(
                "stopwords: set either `file` or `language`",
            ));
        }
        if self.preprocess.postags.is_empty() {
            return Err(PipelineError::config(
                "preprocess.postags is empty; no token could ever be kept",
            ));
        }
        if self.phrases.delimiter.is_empty() {
            return Err(PipelineError::config("phrases.delimiter must not be empty"));
        }
        if self.phrases.scoring == PhraseScoring::Npmi && !(-1.0..=1.0).contains(&self.phrases.threshold) {
            return Err(PipelineError::config(
                "phrases.threshold must be within [-1, 1] for npmi scoring",
            ));
        }
        if !(0.0..=1.0).contains(&self.dictionary.no_above) {
            return Err(PipelineError::config(
                "dictionary.no_above must be within [0, 1]",
            ));
        }
        if self.dictionary.keep_n == 0 {
            return Err(PipelineError::config("dictionary.keep_n must be > 0"));
        }
        validate_topic_counts(&self.sweep.topic_counts)?;
        if self.sweep.concurrency == 0 {
            return Err(PipelineError::config("sweep.concurrency must be >= 1"));
        }
        if self.lda.chunksize == 0 || self.lda.passes == 0 || self.lda.iterations == 0 {
            return Err(PipelineError::config(
                "lda.chunksize, lda.passes and lda.iterations must be >= 1",
            ));
        }
        if self.lda.eta == Prior::Asymmetric {
            return Err(PipelineError::config(
                "lda.eta does not support 'asymmetric'",
            ));
        }
        if self.coherence.topn < 2 {
            return Err(PipelineError::config("coherence.topn must be >= 2"));
        }
        if self.coherence.window == Some(0) {
            return Err(PipelineError::config("coherence.window must be >= 1"));
        }
        if self.report.precision > MAX_PRECISION {
            return Err(PipelineError::config(format!(
                "report.precision must be at most {MAX_PRECISION}"
            )));
        }
        Ok(())
    }
}

/// Candidate counts must be non-empty, positive and unique: the topic count
/// is the identity of a candidate model.
pub fn validate_topic_counts(counts: &[usize]) -> Result<(), PipelineError> {
    if counts.is_empty() {
        return Err(PipelineError::config("sweep.topic_counts is empty"));
    }
    if counts.contains(&0) {
        return Err(PipelineError::config("sweep.topic_counts must all be >= 1"));
    }
    for (i, count) in counts.iter().enumerate() {
        if counts[..i].contains(count) {
            return Err(PipelineError::config(format!(
                "sweep.topic_counts contains {count} more than once"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [sweep]
            topic_counts = [5, 10]

            [lda]
            alpha = "symmetric"
            eta = 0.05
            "#,
        )
        .unwrap();
        assert_eq!(config.sweep.topic_counts, vec![5, 10]);
        assert_eq!(config.sweep.concurrency, 1);
        assert_eq!(config.lda.alpha, Prior::Symmetric);
        assert_eq!(config.lda.eta, Prior::Value(0.05));
        assert_eq!(config.lda.chunksize, 100);
        assert_eq!(config.phrases.delimiter, "_");
    }

    #[test]
    fn unknown_prior_is_rejected() {
        let result: Result<PipelineConfig, _> = toml::from_str("[lda]\nalpha = \"sometimes\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn coherence_measure_names() {
        let config: PipelineConfig = toml::from_str("[coherence]\nmeasure = \"u_mass\"\n").unwrap();
        assert_eq!(config.coherence.measure, CoherenceMeasure::UMass);
    }

    #[test]
    fn round_trips_through_toml() {
        let text = PipelineConfig::default().to_toml().unwrap();
        let parsed: PipelineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.lda.alpha, Prior::Auto);
        assert_eq!(parsed.sweep.topic_counts, vec![20, 30, 40, 50, 60]);
    }

    #[test]
    fn duplicate_topic_counts_rejected() {
        let err = validate_topic_counts(&[20, 30, 20]).unwrap_err();
        assert!(err.to_string().contains("20 more than once"));
    }

    #[test]
    fn empty_and_zero_topic_counts_rejected() {
        assert!(validate_topic_counts(&[]).is_err());
        assert!(validate_topic_counts(&[0, 5]).is_err());
    }

    #[test]
    fn excessive_precision_rejected() {
        let mut config = PipelineConfig::default();
        config.report.precision = MAX_PRECISION;
        assert!(config.validate().is_ok());
        config.report.precision = 400;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("report.precision"));
    }

    #[test]
    fn default_entities_include_the_built_in_label() {
        let settings = PreprocessSettings::default();
        assert!(settings.entities.iter().any(|e| e == RULE_ENTITY_LABEL));
    }

    #[test]
    fn empty_postags_rejected() {
        let mut config = PipelineConfig::default();
        config.preprocess.postags.clear();
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration { .. })
        ));
    }
}
