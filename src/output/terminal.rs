// Colored terminal output for sweep results and corpus inspection.
//
// This module handles all terminal-specific formatting: colors, tables and
// bar charts. The main.rs commands delegate here.

use colored::Colorize;

use crate::config::PipelineConfig;
use crate::error::{ReadFailure, TrainingFailure};
use crate::model::sweep::CoherenceRow;
use crate::pipeline::aggregate::{head_topics, TopicTerms};
use crate::pipeline::reload::Inference;
use crate::pipeline::run::PipelineOutput;
use crate::text::phrases::NgramModels;

const BAR_WIDTH: usize = 30;

/// Document identities in processing order.
pub fn display_documents(names: &[String]) {
    if names.is_empty() {
        println!("No documents found.");
        return;
    }
    println!("\n{}", format!("=== Documents ({}) ===", names.len()).bold());
    for (ordinal, name) in names.iter().enumerate() {
        println!("  {:>5}  {}", ordinal.to_string().dimmed(), name);
    }
    println!();
}

/// Learned bigram and trigram phrases, highest score first.
pub fn display_phrases(ngrams: &NgramModels, delimiter: &str, limit: usize) {
    for (label, model) in [("Bigrams", &ngrams.bigrams), ("Trigrams", &ngrams.trigrams)] {
        println!("\n{}", format!("=== {label} ({}) ===", model.len()).bold());
        if model.is_empty() {
            println!("  {}", "(none above threshold)".dimmed());
            continue;
        }
        for entry in model.phrases().iter().take(limit) {
            println!(
                "  {:<40} {:>10.2}",
                format!("{}{delimiter}{}", entry.left, entry.right),
                entry.score
            );
        }
    }
    println!();
}

/// Coherence per candidate as a horizontal bar chart; the winner is starred.
pub fn display_coherence(rows: &[CoherenceRow], winner: usize) {
    println!("\n{}", "=== Coherence by topic count ===".bold());

    let scores: Vec<f64> = rows.iter().filter_map(|r| r.coherence).collect();
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = if max > min { max - min } else { 1.0 };

    for row in rows {
        match row.coherence {
            Some(score) => {
                // Shortest bar still gets one cell so negative scores stay visible
                let filled = 1 + (((score - min) / span) * (BAR_WIDTH - 1) as f64).round() as usize;
                let bar = "#".repeat(filled);
                if row.topic_count == winner {
                    println!(
                        "  {:>4}  {:<width$}  {:.4} {}",
                        row.topic_count,
                        bar.green().bold(),
                        score,
                        "*".green().bold(),
                        width = BAR_WIDTH
                    );
                } else {
                    println!(
                        "  {:>4}  {:<width$}  {:.4}",
                        row.topic_count,
                        bar.cyan(),
                        score,
                        width = BAR_WIDTH
                    );
                }
            }
            None => println!(
                "  {:>4}  {:<width$}  {}",
                row.topic_count,
                "",
                "failed".red(),
                width = BAR_WIDTH
            ),
        }
    }
}

fn display_failures(training: &[TrainingFailure], reads: &[ReadFailure]) {
    if !training.is_empty() {
        println!("\n  {} {} candidate(s) failed:", "!".red().bold(), training.len());
        for f in training {
            println!(
                "    {:>4}  {}",
                f.topic_count,
                super::truncate_chars(&f.reason, 100).dimmed()
            );
        }
    }
    if !reads.is_empty() {
        println!(
            "\n  {} {} document(s) could not be read or analyzed:",
            "~".yellow(),
            reads.len()
        );
        for f in reads {
            println!(
                "    {:<30} {}",
                f.name,
                super::truncate_chars(&f.reason, 100).dimmed()
            );
        }
    }
}

/// Summary of a finished run.
pub fn display_summary(output: &PipelineOutput, config: &PipelineConfig) {
    let winner = output.sweep.winner();
    let prepared = &output.prepared;

    println!(
        "\n{}",
        format!(
            "=== Sweep: {} documents, {} terms, {} phrases ===",
            prepared.corpus.len(),
            prepared.dictionary.len(),
            prepared.ngrams.bigrams.len() + prepared.ngrams.trigrams.len()
        )
        .bold()
    );

    display_coherence(&output.sweep.coherence_table(), winner.topic_count);
    println!(
        "\n  Selected {} topics (coherence {:.4})",
        winner.topic_count.to_string().green().bold(),
        winner.coherence
    );

    display_head(&head_topics(
        &output.dominance,
        &output.topics,
        config.report.head_topics,
    ));

    display_failures(&output.sweep.failures, &prepared.read_failures);
    println!(
        "\n  Finished in {:.1} min",
        output.elapsed.as_secs_f64() / 60.0
    );
}

/// Topic assignments of documents labeled with a saved model.
pub fn display_inference(inference: &Inference, config: &PipelineConfig) {
    let unassigned = inference
        .rows
        .iter()
        .filter(|r| r.dominant_topic.is_none())
        .count();
    println!(
        "\n{}",
        format!(
            "=== Labeled {} documents with {} topics ===",
            inference.rows.len(),
            inference.topics.len()
        )
        .bold()
    );
    if unassigned > 0 {
        println!(
            "  {} {} document(s) had no topic above the minimum probability",
            "~".yellow(),
            unassigned
        );
    }

    display_head(&head_topics(
        &inference.dominance,
        &inference.topics,
        config.report.head_topics,
    ));
    display_failures(&[], &inference.read_failures);
    println!();
}

fn display_head(head: &[(&TopicTerms, f64)]) {
    if !head.is_empty() {
        println!("\n{}", "=== Most dominant topics ===".bold());
        println!(
            "  {:>5}  {:>8}  {}",
            "Topic".dimmed(),
            "Share".dimmed(),
            "Top terms".dimmed()
        );
        println!("  {}", "-".repeat(78).dimmed());
        for (terms, fraction) in head {
            let words: Vec<&str> = terms
                .terms
                .iter()
                .take(8)
                .map(|t| t.term.as_str())
                .collect();
            println!(
                "  {:>5}  {:>7.1}%  {}",
                terms.topic,
                fraction * 100.0,
                words.join(", ")
            );
        }
    }
}
