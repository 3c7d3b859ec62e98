//! # AskDocs CLI (`askdocs`)
//!
//! The `askdocs` binary is the primary interface for the documentation
//! assistant. It provides commands for building the vector index from a
//! scraped corpus, asking one-off questions, chatting interactively, and
//! starting the HTTP API server.
//!
//! ## Usage
//!
//! ```bash
//! askdocs --config ./config/askdocs.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdocs build` | Parse the corpus, embed every section, store in SQLite |
//! | `askdocs query "<question>"` | Answer a single question |
//! | `askdocs chat` | Interactive question loop |
//! | `askdocs serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Build the index from the configured corpus file
//! askdocs build --config ./config/askdocs.toml
//!
//! # Rebuild from scratch after changing the embedding model
//! askdocs build --rebuild
//!
//! # Ask one question
//! askdocs query "How do I create a ticket?"
//!
//! # Same, as machine-readable JSON
//! askdocs query "How do I create a ticket?" --json
//!
//! # Start the API server for the web frontend
//! askdocs serve
//! ```

mod build_cmd;
mod config;
mod corpus;
mod embedding;
mod error;
mod generation;
#[allow(dead_code)]
mod index;
mod models;
mod query;
mod sanitize;
mod server;
mod structure;
mod synthesis;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// AskDocs — a retrieval-augmented assistant for scraped API documentation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/askdocs.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "askdocs",
    about = "AskDocs — a retrieval-augmented assistant for scraped API documentation",
    version,
    long_about = "AskDocs ingests a scraped API documentation corpus, embeds each section \
    through a provider chain (Gemini with a local fastembed fallback), and answers questions \
    by retrieving the closest sections and synthesizing a grounded answer with an LLM. \
    Exposed as a CLI and a JSON/SSE HTTP server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/askdocs.toml`. Corpus, index, embedding,
    /// generation, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/askdocs.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Build the vector index from the configured corpus file.
    ///
    /// Parses the scraped documentation JSON, embeds every section through
    /// the provider chain, and stores the documents in SQLite. Rerunning
    /// is incremental: sections that are already indexed are skipped.
    Build {
        /// Drop existing documents in the collection and reindex from scratch.
        #[arg(long)]
        rebuild: bool,
    },

    /// Answer a single question from the command line.
    ///
    /// Requires a built index (`askdocs build`). Prints the answer and a
    /// record block per matched API, or the full result as JSON with `--json`.
    Query {
        /// The question to answer.
        question: String,

        /// Print the full result (query, matches, answer) as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Interactive question loop.
    ///
    /// Reads questions from stdin until EOF, `exit`, or `quit`. Errors are
    /// printed per question and do not end the session.
    Chat,

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// `/api/query`, `/api/chat`, `/api/chat/stream`, and `/health`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load GEMINI_API_KEY and friends from a local .env if present.
    dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays parseable (`query --json`).
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Build { rebuild } => {
            build_cmd::run_build(&cfg, rebuild).await?;
        }
        Commands::Query { question, json } => {
            query::run_query(&cfg, &question, json).await?;
        }
        Commands::Chat => {
            query::run_chat(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
