// End-to-end pipeline: documents -> token streams -> phrases -> corpus ->
// sweep -> aggregation.
//
// Every stage is composed explicitly here with its settings passed in. No
// global state is read; the caller owns the config and the collaborators.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::aggregate::{doc_topic_rows, topic_terms, DocTopicRow, DominanceTable, TopicTerms};
use crate::config::PipelineConfig;
use crate::corpus::bow::{build_corpus, Corpus};
use crate::corpus::dictionary::Dictionary;
use crate::corpus::source::DocumentSource;
use crate::error::{PipelineError, ReadFailure};
use crate::model::coherence::WindowCoherence;
use crate::model::lda::LdaTrainer;
use crate::model::sweep::{SweepEngine, SweepInputs, SweepReport};
use crate::model::traits::{CoherenceScorer, TopicTrainer};
use crate::text::analyzer::{LinguisticAnalyzer, RuleAnalyzer};
use crate::text::phrases::NgramModels;
use crate::text::preprocess::{ExclusionConfig, TextPreprocessor, TokenStream};
use crate::text::stopwords::load_stopwords;

/// The swappable parts of the pipeline.
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn LinguisticAnalyzer>,
    pub trainer: Arc<dyn TopicTrainer>,
    pub scorer: Arc<dyn CoherenceScorer>,
}

impl Collaborators {
    /// Built-in implementations configured from `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            analyzer: Arc::new(RuleAnalyzer),
            trainer: Arc::new(LdaTrainer::new(config.lda.clone())),
            scorer: Arc::new(WindowCoherence::new(&config.coherence)),
        }
    }
}

/// Output of stages 1-4, shared read-only by the sweep.
pub struct PreparedCorpus {
    pub names: Vec<String>,
    /// Phrase-merged streams, one per document (also the coherence texts)
    pub streams: Arc<Vec<TokenStream>>,
    pub ngrams: NgramModels,
    pub dictionary: Arc<Dictionary>,
    pub corpus: Arc<Corpus>,
    pub read_failures: Vec<ReadFailure>,
}

impl PreparedCorpus {
    pub fn sweep_inputs(&self) -> SweepInputs {
        SweepInputs {
            corpus: Arc::clone(&self.corpus),
            dictionary: Arc::clone(&self.dictionary),
            texts: Arc::clone(&self.streams),
        }
    }
}

/// Run the preprocessor over every document in order. Failed documents keep
/// their slot with an empty stream.
pub fn tokenize_documents(
    source: &DocumentSource,
    preprocessor: &TextPreprocessor,
) -> (Vec<String>, Vec<TokenStream>, Vec<ReadFailure>) {
    let pb = ProgressBar::new(source.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  Preprocessing [{bar:30}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut names = Vec::with_capacity(source.len());
    let mut streams = Vec::with_capacity(source.len());
    let mut failures = Vec::new();
    for doc in source.documents() {
        let (stream, failure) = preprocessor.process_document(&doc);
        names.push(doc.name);
        streams.push(stream);
        failures.extend(failure);
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        documents = names.len(),
        tokens = streams.iter().map(Vec::len).sum::<usize>(),
        failures = failures.len(),
        "Preprocessed documents"
    );
    (names, streams, failures)
}

/// Stopwords and exclusion rules from `config`, wrapped around `analyzer`.
pub fn build_preprocessor(
    config: &PipelineConfig,
    analyzer: Arc<dyn LinguisticAnalyzer>,
) -> Result<TextPreprocessor> {
    let stopwords = load_stopwords(&config.stopwords)?;
    let exclusions = ExclusionConfig::from_settings(&config.preprocess, stopwords)?;
    Ok(TextPreprocessor::new(analyzer, exclusions))
}

/// Stages 1-4: read, filter, merge phrases, build dictionary and corpus.
pub fn prepare_corpus(
    source: &DocumentSource,
    config: &PipelineConfig,
    analyzer: Arc<dyn LinguisticAnalyzer>,
) -> Result<PreparedCorpus> {
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

    let ngrams = NgramModels::train(&streams, &config.phrases);
    let merged: Vec<TokenStream> = streams.iter().map(|s| ngrams.apply(s)).collect();
    info!(
        bigrams = ngrams.bigrams.len(),
        trigrams = ngrams.trigrams.len(),
        "Applied phrase models"
    );

    let (dictionary, corpus) = build_corpus(names.clone(), &merged, &config.dictionary);
    if dictionary.is_empty() || corpus.is_vacuous() {
        return Err(PipelineError::config(
            "corpus is empty after filtering; loosen the stopword, POS or pruning settings",
        )
        .into());
    }

    Ok(PreparedCorpus {
        names,
        streams: Arc::new(merged),
        ngrams,
        dictionary: Arc::new(dictionary),
        corpus: Arc::new(corpus),
        read_failures,
    })
}

/// Everything a run produces.
pub struct PipelineOutput {
    pub prepared: PreparedCorpus,
    pub sweep: SweepReport,
    pub rows: Vec<DocTopicRow>,
    pub dominance: DominanceTable,
    pub topics: Vec<TopicTerms>,
    pub elapsed: Duration,
}

/// Run the full pipeline over `corpus_dir`.
pub async fn run(
    corpus_dir: &Path,
    config: &PipelineConfig,
    collaborators: &Collaborators,
) -> Result<PipelineOutput> {
    let started = Instant::now();
    config.validate()?;

    let source = DocumentSource::open(corpus_dir, &config.corpus.extension)?;
    let prepared = prepare_corpus(&source, config, Arc::clone(&collaborators.analyzer))?;

    let engine = SweepEngine::new(
        Arc::clone(&collaborators.trainer),
        Arc::clone(&collaborators.scorer),
    )
    .with_concurrency(config.sweep.concurrency)
    .with_timeout(config.sweep.timeout_secs.map(Duration::from_secs));
    let sweep = engine
        .run(&prepared.sweep_inputs(), &config.sweep.topic_counts)
        .await?;

    let winner = sweep.winner();
    let rows = doc_topic_rows(winner.model.as_ref(), &prepared.corpus);
    let dominance = DominanceTable::from_rows(&rows, config.report.precision);
    let topics = topic_terms(winner.model.as_ref(), &prepared.dictionary, config.report.top_terms);

    info!(
        documents = rows.len(),
        topic_count = winner.topic_count,
        dominant_topics = dominance.entries.len(),
        "Aggregated document topics"
    );

    Ok(PipelineOutput {
        prepared,
        sweep,
        rows,
        dominance,
        topics,
        elapsed: started.elapsed(),
    })
}
