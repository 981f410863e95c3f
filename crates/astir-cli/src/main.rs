//! Astir CLI - local code intelligence for AI agents
//!
//! # Usage
//!
//! ```bash
//! # Serve the query engine over MCP (stdio)
//! astir serve --workspace .
//!
//! # One-shot query, JSON to stdout
//! astir query "parse json into a config struct"
//!
//! # Corpus status
//! astir stats
//! ```
//!
//! Exit codes: 0 clean shutdown, 1 fatal initialisation failure,
//! 2 unrecoverable storage corruption.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod commands;

/// Astir - semantic queries over annotated ASTs
#[derive(Parser, Debug)]
#[command(name = "astir")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Workspace root directory
    #[arg(long, short = 'w', global = true, env = "ASTIR_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// Astir data directory (default: {workspace}/.astir)
    #[arg(long, global = true, env = "ASTIR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Embedding model reference override
    #[arg(long, global = true, env = "ASTIR_MODEL")]
    model: Option<String>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

impl GlobalOptions {
    fn to_config_overrides(&self) -> astir_config::ConfigOverrides {
        astir_config::ConfigOverrides {
            data_dir: self.data_dir.clone(),
            model_ref: self.model.clone(),
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the MCP server on stdio for AI assistant integration
    Serve(commands::serve::ServeArgs),

    /// Run one query against the workspace and print JSON
    Query(commands::query::QueryArgs),

    /// Show corpus statistics and readiness
    Stats(commands::stats::StatsArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // stdout belongs to the MCP wire (and to query/stats JSON); logs go to
    // stderr regardless of command.
    let default_level = if cli.global.quiet {
        "error"
    } else if cli.global.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::execute(args, &cli.global).await,
        Commands::Query(args) => commands::query::execute(args, &cli.global).await,
        Commands::Stats(args) => commands::stats::execute(args, &cli.global).await,
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            tracing::error!("{e:#}");
            std::process::exit(exit_code_for(&e));
        }
    }
}

/// Storage corruption exits 2; every other fatal error exits 1.
fn exit_code_for(error: &anyhow::Error) -> i32 {
    for cause in error.chain() {
        if let Some(store_err) = cause.downcast_ref::<astir_core::StoreError>() {
            if matches!(store_err, astir_core::StoreError::SchemaVersionMismatch { .. }) {
                return 2;
            }
        }
        if let Some(index_err) = cause.downcast_ref::<astir_index::IndexError>() {
            if matches!(index_err, astir_index::IndexError::Corrupt { .. }) {
                return 2;
            }
        }
        if let Some(query_err) = cause.downcast_ref::<astir_query::QueryError>() {
            match query_err {
                astir_query::QueryError::Store(
                    astir_core::StoreError::SchemaVersionMismatch { .. },
                )
                | astir_query::QueryError::Index(astir_index::IndexError::Corrupt { .. }) => {
                    return 2;
                }
                _ => {}
            }
        }
    }
    1
}
