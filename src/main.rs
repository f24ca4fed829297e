//! # docqa CLI
//!
//! The `docqa` binary ingests documents into a local vector index and
//! answers questions about them with an on-device language model.
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite database and run schema migrations |
//! | `docqa ingest <file>` | Extract, chunk, embed, and index a PDF or text file |
//! | `docqa ask "<question>"` | Answer one question with cited sources |
//! | `docqa chat` | Interactive question answering |
//! | `docqa list` | List indexed documents |
//! | `docqa delete <id>` | Remove a document and its chunks |
//! | `docqa stats` | Corpus statistics |
//!
//! Logging goes to stderr and is controlled by `DOCQA_LOG` (an `EnvFilter`
//! directive) or `-v` / `-vv`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use docqa::progress::ProgressMode;
use docqa::{ask, config, documents, ingest, migrate, stats};

/// docqa: ask questions about your own documents, fully on-device.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "On-device retrieval-augmented question answering over your own documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    /// Progress output on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    /// Increase log verbosity (`-v` info, `-vv` debug). Ignored when `DOCQA_LOG` is set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Human,
    Json,
    Off,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
            ProgressArg::Off => ProgressMode::Off,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest a document (PDF, .txt, or .md).
    ///
    /// The document is extracted, split into overlapping chunks, embedded,
    /// and written to the vector index. Ctrl-C cancels and rolls back.
    Ingest {
        /// Path to the document.
        file: PathBuf,

        /// Display title. Defaults to the file name without extension.
        #[arg(long)]
        title: Option<String>,
    },

    /// Answer a question from the indexed documents.
    Ask {
        /// The question.
        question: String,

        /// Number of chunks to retrieve. Defaults to `[retrieval].top_k`.
        #[arg(long)]
        top_k: Option<usize>,

        /// Restrict retrieval to these document ids. Repeatable.
        #[arg(long = "doc")]
        docs: Vec<i64>,
    },

    /// Start an interactive conversation.
    Chat {
        /// Restrict retrieval to these document ids. Repeatable.
        #[arg(long = "doc")]
        docs: Vec<i64>,
    },

    /// List indexed documents, newest first.
    List,

    /// Delete a document and all of its chunks.
    Delete {
        /// Document id.
        id: i64,
    },

    /// Show corpus statistics.
    Stats,
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_env("DOCQA_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        })
    });
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter);
    tracing_subscriber::registry().with(stderr_layer).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let progress = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty);
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { file, title } => {
            ingest::run_ingest(&cfg, &file, title.as_deref(), progress).await?;
        }
        Commands::Ask {
            question,
            top_k,
            docs,
        } => {
            ask::run_ask(&cfg, &question, top_k, &docs).await?;
        }
        Commands::Chat { docs } => {
            ask::run_chat(&cfg, &docs).await?;
        }
        Commands::List => {
            documents::run_list(&cfg).await?;
        }
        Commands::Delete { id } => {
            documents::run_delete(&cfg, id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
