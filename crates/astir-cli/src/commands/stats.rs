//! Corpus status command.

use anyhow::{Context, Result};
use clap::Args;

use crate::commands::bootstrap;
use crate::GlobalOptions;

/// Show corpus statistics and readiness
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Emit JSON instead of the human summary
    #[arg(long)]
    pub json: bool,
}

/// Execute the stats command
pub async fn execute(args: StatsArgs, global: &GlobalOptions) -> Result<()> {
    let engine = bootstrap(global, false).await?;

    let snapshot = engine.snapshots.current().context("corpus not loaded")?;
    let store = snapshot.store.clone();
    let stats = tokio::task::spawn_blocking(move || store.statistics())
        .await
        .context("stats task panicked")?
        .context("failed to read store statistics")?;
    let index_stats = snapshot.index.stats();
    let ready = engine.snapshots.ready();

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "node_count": stats.nodes,
                "file_count": stats.files,
                "avg_complexity": stats.avg_complexity,
                "node_type_histogram": stats.node_type_histogram,
                "last_updated_us": stats.last_updated,
                "vector_count": index_stats.count,
                "vector_dimension": index_stats.dimension,
                "corpus_epoch": snapshot.epoch,
                "ready": ready,
            }))?
        );
        return Ok(());
    }

    println!("Workspace: {}", global.workspace.display());
    println!("  annotations: {} across {} files", stats.nodes, stats.files);
    println!("  avg complexity: {:.2}", stats.avg_complexity);
    println!(
        "  vectors: {} ({}-dimensional)",
        index_stats.count, index_stats.dimension
    );
    println!("  corpus epoch: {}", snapshot.epoch);
    println!("  ready: {ready}");
    let mut types: Vec<_> = stats.node_type_histogram.iter().collect();
    types.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (node_type, count) in types {
        println!("    {node_type}: {count}");
    }
    Ok(())
}
