// Persisted run artifacts: dictionary, phrase models, coherence table,
// topic terms, document-topic matrix, dominance table and a run summary.
//
// Layout (one directory per day, one subdirectory per corpus):
//
//   <output>/<YYYY-MM-DD>/models/<corpus>/dictionary.json
//                                          bigrams.json, trigrams.json
//                                          model-NN.json
//   <output>/<YYYY-MM-DD>/topics/<corpus>/coherence.csv
//                                          topics-NN.json
//                                          doctopics-NN.csv
//                                          dominance-NN.csv
//                                          run.json

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{ReadFailure, TrainingFailure};
use crate::model::sweep::CoherenceRow;
use crate::pipeline::aggregate::{DocTopicRow, DominanceTable};
use crate::pipeline::run::PipelineOutput;

#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub models: PathBuf,
    pub topics: PathBuf,
}

impl ArtifactPaths {
    pub fn new(root: &Path, corpus: &str, date: NaiveDate) -> Self {
        let day = root.join(date.format("%Y-%m-%d").to_string());
        Self {
            models: day.join("models").join(corpus),
            topics: day.join("topics").join(corpus),
        }
    }

    pub fn create(&self) -> Result<()> {
        for dir in [&self.models, &self.topics] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Corpus label used in artifact paths: the corpus directory's name.
pub fn corpus_label(corpus_dir: &Path) -> String {
    corpus_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "corpus".to_string())
}

/// File name of the persisted topic model for `topic_count` topics.
pub fn model_file_name(topic_count: usize) -> String {
    format!("model-{topic_count:02}.json")
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// `topic_count,coherence,status`, one row per requested count in order.
pub fn coherence_csv(rows: &[CoherenceRow], winner: usize) -> String {
    let mut out = String::from("topic_count,coherence,status\n");
    for row in rows {
        let (score, status) = match row.coherence {
            Some(c) if row.topic_count == winner => (c.to_string(), "selected"),
            Some(c) => (c.to_string(), "ok"),
            None => (String::new(), "failed"),
        };
        out.push_str(&format!("{},{},{}\n", row.topic_count, score, status));
    }
    out
}

/// `identifiers,0,..,K-1,dominant`: the full document-topic matrix, omitted
/// topics written as 0.
pub fn doctopics_csv(rows: &[DocTopicRow], num_topics: usize, precision: usize) -> String {
    let mut out = String::from("identifiers");
    for topic in 0..num_topics {
        out.push_str(&format!(",{topic}"));
    }
    out.push_str(",dominant\n");

    for row in rows {
        out.push_str(&csv_field(&row.document));
        for topic in 0..num_topics {
            out.push_str(&format!(",{:.precision$}", row.probability(topic)));
        }
        match row.dominant_topic {
            Some(t) => out.push_str(&format!(",{t}\n")),
            None => out.push_str(",\n"),
        }
    }
    out
}

/// `topic,fraction`, most dominant first.
pub fn dominance_csv(table: &DominanceTable, precision: usize) -> String {
    let mut out = String::from("topic,fraction\n");
    for entry in &table.entries {
        out.push_str(&format!("{},{:.precision$}\n", entry.topic, entry.fraction));
    }
    out
}

#[derive(Debug, Serialize)]
pub struct WinnerSummary {
    pub topic_count: usize,
    pub coherence: f64,
}

/// Contents of run.json.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub corpus: &'a str,
    pub date: String,
    pub documents: usize,
    pub vocabulary: usize,
    pub bigrams: usize,
    pub trigrams: usize,
    pub topic_counts: &'a [usize],
    pub winner: WinnerSummary,
    pub coherence: Vec<CoherenceRow>,
    pub failures: &'a [TrainingFailure],
    pub read_failures: &'a [ReadFailure],
    pub minutes: f64,
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

/// Write every artifact of a finished run.
pub fn write_artifacts(
    paths: &ArtifactPaths,
    corpus: &str,
    date: NaiveDate,
    output: &PipelineOutput,
    config: &PipelineConfig,
) -> Result<()> {
    paths.create()?;

    let prepared = &output.prepared;
    write_json(&paths.models.join("dictionary.json"), &prepared.dictionary.snapshot())?;
    write_json(
        &paths.models.join("bigrams.json"),
        &prepared.ngrams.bigrams.snapshot(&config.phrases),
    )?;
    write_json(
        &paths.models.join("trigrams.json"),
        &prepared.ngrams.trigrams.snapshot(&config.phrases),
    )?;

    let winner = output.sweep.winner();
    let k = winner.topic_count;
    match winner.model.parameters()? {
        Some(parameters) => write_json(&paths.models.join(model_file_name(k)), &parameters)?,
        None => debug!(topic_count = k, "Selected model cannot be persisted, skipping"),
    }

    let precision = config.report.precision as usize;
    let table = output.sweep.coherence_table();

    write_text(&paths.topics.join("coherence.csv"), &coherence_csv(&table, k))?;
    write_json(&paths.topics.join(format!("topics-{k:02}.json")), &output.topics)?;
    write_text(
        &paths.topics.join(format!("doctopics-{k:02}.csv")),
        &doctopics_csv(&output.rows, winner.model.num_topics(), precision),
    )?;
    write_text(
        &paths.topics.join(format!("dominance-{k:02}.csv")),
        &dominance_csv(&output.dominance, precision),
    )?;

    let summary = RunSummary {
        corpus,
        date: date.format("%Y-%m-%d").to_string(),
        documents: prepared.corpus.len(),
        vocabulary: prepared.dictionary.len(),
        bigrams: prepared.ngrams.bigrams.len(),
        trigrams: prepared.ngrams.trigrams.len(),
        topic_counts: &config.sweep.topic_counts,
        winner: WinnerSummary {
            topic_count: k,
            coherence: winner.coherence,
        },
        coherence: table,
        failures: &output.sweep.failures,
        read_failures: &prepared.read_failures,
        minutes: output.elapsed.as_secs_f64() / 60.0,
    };
    write_json(&paths.topics.join("run.json"), &summary)?;

    info!(
        models = %paths.models.display(),
        topics = %paths.topics.display(),
        "Wrote artifacts"
    );
    Ok(())
}
