//! # film-rag CLI (`filmrag`)
//!
//! Prepares the chunk store, answers questions from the terminal, and runs
//! the JSON HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! filmrag --config ./config/filmrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `filmrag prepare` | Split and embed the corpus into the JSONL chunk store |
//! | `filmrag search "<question>"` | Show the best-matching passages with scores |
//! | `filmrag ask "<question>"` | Answer a question with the configured LLM |
//! | `filmrag stats` | Summarize the chunk store |
//! | `filmrag serve` | Start the JSON HTTP server |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `film_rag=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

use film_rag::config;
use film_rag::pipeline;
use film_rag::prepare::{self, PrepareOptions};
use film_rag::progress::ProgressMode;
use film_rag::search;
use film_rag::server;
use film_rag::stats;

/// film-rag: question answering over a film-analysis corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/filmrag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "filmrag",
    about = "Retrieval-augmented question answering over a film-analysis corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/filmrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split the corpus into passages, embed them, and write the chunk store.
    ///
    /// Unchanged passages keep their stored vectors unless `--full` is given.
    Prepare {
        /// Corpus text file (defaults to `[corpus] path`).
        #[arg(long)]
        input: Option<PathBuf>,

        /// Output JSONL file (defaults to `[store] path`).
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        chunk_overlap: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Re-embed every passage.
        #[arg(long)]
        full: bool,

        /// Show chunk counts without embedding or writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr. Defaults to `human` on a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Retrieve the passages most similar to a question.
    Search {
        question: String,

        /// Number of passages to return (defaults to `[retrieval] top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Answer a question from the retrieved passages.
    Ask {
        question: String,

        #[arg(long)]
        top_k: Option<usize>,

        /// Also print the passages the answer was based on.
        #[arg(long)]
        sources: bool,
    },

    /// Summarize the chunk store.
    Stats,

    /// Start the JSON HTTP server on `[server] bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "film_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Prepare {
            input,
            output,
            chunk_size,
            chunk_overlap,
            batch_size,
            full,
            dry_run,
            progress,
        } => {
            let defaults = PrepareOptions::from_config(&cfg);
            let options = PrepareOptions {
                input: input.unwrap_or(defaults.input),
                output: output.unwrap_or(defaults.output),
                chunk_size: chunk_size.unwrap_or(defaults.chunk_size),
                chunk_overlap: chunk_overlap.unwrap_or(defaults.chunk_overlap),
                batch_size: batch_size.unwrap_or(defaults.batch_size),
                full,
            };
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            prepare::run_prepare(&cfg, options, dry_run, progress).await?;
        }
        Commands::Search { question, top_k } => {
            search::run_search(&cfg, &question, top_k).await?;
        }
        Commands::Ask {
            question,
            top_k,
            sources,
        } => {
            pipeline::run_ask(&cfg, &question, top_k, sources).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
