use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use topicsweep::config::{Config, PipelineConfig};
use topicsweep::corpus::source::DocumentSource;
use topicsweep::error::PipelineError;
use topicsweep::output::{report, terminal};
use topicsweep::pipeline::reload::{self, SavedModels};
use topicsweep::pipeline::run::{self, Collaborators};

/// topicsweep: pick the number of topics for a plain-text corpus.
///
/// Filters and phrase-merges every document, trains one topic model per
/// candidate topic count, and keeps the most coherent one.
#[derive(Parser)]
#[command(name = "topicsweep", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write artifacts
    Run {
        /// Directory of documents (overrides TOPICSWEEP_CORPUS_DIR)
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// TOML settings file (overrides TOPICSWEEP_CONFIG)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Artifact root (overrides TOPICSWEEP_OUTPUT_DIR)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Candidate topic counts, e.g. 20,30,40
        #[arg(long, value_delimiter = ',')]
        topics: Option<Vec<usize>>,
    },

    /// List documents in processing order
    Docs {
        #[arg(long)]
        corpus: Option<PathBuf>,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Train the phrase models and print the learned phrases
    Phrases {
        #[arg(long)]
        corpus: Option<PathBuf>,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Phrases shown per model (default: 30)
        #[arg(long, default_value = "30")]
        limit: usize,
    },

    /// Label documents with the models saved by an earlier run
    Infer {
        /// The run's models/<corpus> directory
        #[arg(long)]
        models: PathBuf,

        #[arg(long)]
        corpus: Option<PathBuf>,

        /// TOML settings file; use the one the run was made with
        #[arg(long)]
        config: Option<PathBuf>,

        /// Saved topic count to load, when the directory holds several models
        #[arg(long)]
        topics: Option<usize>,

        /// Also write the document-topic matrix to this CSV file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Write a default settings file
    InitConfig {
        #[arg(long, default_value = "topicsweep.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("topicsweep=info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = execute(cli).await {
        report_error(&e);
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            corpus,
            config,
            output,
            topics,
        } => {
            let mut env = Config::load()?;
            apply_overrides(&mut env, corpus, config);
            if let Some(output) = output {
                env.output_dir = output;
            }

            let corpus_dir = env.require_corpus()?.to_path_buf();
            let mut settings = env.pipeline()?;
            if let Some(topics) = topics {
                settings.sweep.topic_counts = topics;
            }

            let collaborators = Collaborators::from_config(&settings);
            let output = run::run(&corpus_dir, &settings, &collaborators).await?;

            let label = report::corpus_label(&corpus_dir);
            let date = chrono::Local::now().date_naive();
            let paths = report::ArtifactPaths::new(&env.output_dir, &label, date);
            report::write_artifacts(&paths, &label, date, &output, &settings)?;

            terminal::display_summary(&output, &settings);
            println!("\n  Models: {}", paths.models.display().to_string().dimmed());
            println!("  Topics: {}", paths.topics.display().to_string().dimmed());
        }

        Commands::Docs { corpus, config } => {
            let mut env = Config::load()?;
            apply_overrides(&mut env, corpus, config);
            let settings = env.pipeline()?;
            let source = DocumentSource::open(env.require_corpus()?, &settings.corpus.extension)?;
            terminal::display_documents(&source.names());
        }

        Commands::Phrases {
            corpus,
            config,
            limit,
        } => {
            let mut env = Config::load()?;
            apply_overrides(&mut env, corpus, config);
            let settings = env.pipeline()?;
            settings.validate()?;

            let source = DocumentSource::open(env.require_corpus()?, &settings.corpus.extension)?;
            let collaborators = Collaborators::from_config(&settings);
            let prepared =
                run::prepare_corpus(&source, &settings, Arc::clone(&collaborators.analyzer))?;
            terminal::display_phrases(&prepared.ngrams, &settings.phrases.delimiter, limit);
        }

        Commands::Infer {
            models,
            corpus,
            config,
            topics,
            output,
        } => {
            let mut env = Config::load()?;
            apply_overrides(&mut env, corpus, config);
            let settings = env.pipeline()?;
            settings.validate()?;

            let saved = SavedModels::load(&models, topics)?;
            let source = DocumentSource::open(env.require_corpus()?, &settings.corpus.extension)?;
            let collaborators = Collaborators::from_config(&settings);
            let inference = reload::label_documents(
                &saved,
                &source,
                &settings,
                Arc::clone(&collaborators.analyzer),
            )?;
            terminal::display_inference(&inference, &settings);

            if let Some(path) = output {
                let csv = report::doctopics_csv(
                    &inference.rows,
                    inference.topics.len(),
                    settings.report.precision as usize,
                );
                std::fs::write(&path, csv)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("  Document topics: {}", path.display().to_string().dimmed());
            }
        }

        Commands::InitConfig { path } => {
            write_default_config(&path)?;
            println!("Wrote default settings to {}", path.display());
            println!("Point TOPICSWEEP_CONFIG at it, or pass --config.");
        }
    }
    Ok(())
}

fn apply_overrides(env: &mut Config, corpus: Option<PathBuf>, config: Option<PathBuf>) {
    if corpus.is_some() {
        env.corpus_dir = corpus;
    }
    if config.is_some() {
        env.config_path = config;
    }
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists, not overwriting", path.display());
    }
    let toml = PipelineConfig::default().to_toml()?;
    std::fs::write(path, toml).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote default config");
    Ok(())
}

/// Print a diagnostic for a failed command. Pipeline errors get their own
/// hint; anything else prints its context chain.
fn report_error(e: &anyhow::Error) {
    match e.downcast_ref::<PipelineError>() {
        Some(PipelineError::Configuration { message }) => {
            eprintln!("{} {}", "Configuration error:".red().bold(), message);
            eprintln!("  Run `topicsweep init-config` to write a default settings file.");
        }
        Some(err @ PipelineError::SweepExhausted { .. }) => {
            eprintln!("{} {}", "Error:".red().bold(), err);
            eprintln!("  Try other topic counts, or check the corpus size against them.");
        }
        None => eprintln!("{} {e:#}", "Error:".red().bold()),
    }
}
