//! MCP server command.
//!
//! Serves the query engine over stdio. Logging must stay on stderr: stdout
//! carries the JSON-RPC wire.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use astir_config::OverflowMode;
use astir_index::IndexConfig;
use astir_mcp::{serve, ServerOptions};
use astir_query::{HotReloadCoordinator, ReloadConfig};

use crate::commands::bootstrap;
use crate::GlobalOptions;

/// Start the MCP server on stdio
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Skip loading the embedding model (lexical-only service)
    #[arg(long)]
    pub no_model: bool,

    /// Disable the on-disk corpus watcher
    #[arg(long)]
    pub no_watch: bool,
}

/// Execute the serve command
pub async fn execute(args: ServeArgs, global: &GlobalOptions) -> Result<()> {
    let engine = bootstrap(global, !args.no_model).await?;
    let config = &engine.config;

    let coordinator = if args.no_watch {
        None
    } else {
        let reload_config = ReloadConfig {
            store_path: config.store_path(&global.workspace),
            index_path: config.index_path(&global.workspace),
            config_path: Some(config.config_path(&global.workspace)),
            index_config: IndexConfig {
                m: config.index.m,
                ef_construction: config.index.ef_construction,
                ef_search: config.index.ef_search,
                max_elements: config.index.max_elements,
            },
            dimension: config.embedding.dimension,
            debounce: std::time::Duration::from_millis(config.server.debounce_ms),
        };
        let coordinator = HotReloadCoordinator::spawn(
            engine.snapshots.clone(),
            engine.caches.clone(),
            reload_config,
        )
        .context("failed to start the hot-reload coordinator")?;
        info!("Hot reload watching the corpus");
        Some(coordinator)
    };

    let options = ServerOptions {
        max_in_flight: config.server.max_in_flight,
        reject_on_overflow: config.server.overflow == OverflowMode::Reject,
        query_timeout: engine.query_timeout,
    };

    info!(
        workspace = %global.workspace.display(),
        ready = engine.snapshots.ready(),
        "Serving MCP on stdio"
    );
    serve(
        tokio::io::stdin(),
        tokio::io::stdout(),
        engine.processor.clone(),
        options,
    )
    .await
    .context("MCP session failed")?;

    if let Some(coordinator) = coordinator {
        coordinator.shutdown().await;
    }
    Ok(())
}
