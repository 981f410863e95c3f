//! One-shot query command: run a single request and print the JSON response.

use anyhow::{Context, Result};
use clap::Args;

use astir_query::{QueryDeadline, QueryKind, QueryRequest};

use crate::commands::bootstrap;
use crate::GlobalOptions;

/// Run one query against the workspace
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Query text (or file pattern for --kind file)
    pub text: String,

    /// Strategy: semantic, contextual, signature, file, lexical
    #[arg(long, default_value = "semantic", value_parser = parse_kind)]
    pub kind: QueryKind,

    /// Maximum results
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Minimum score in [0, 1]
    #[arg(long)]
    pub min_score: Option<f32>,

    /// File filter pattern (regex or glob), repeatable
    #[arg(long = "filter")]
    pub filters: Vec<String>,

    /// Skip loading the embedding model (forces the lexical fallback)
    #[arg(long)]
    pub no_model: bool,
}

fn parse_kind(s: &str) -> Result<QueryKind, String> {
    match s {
        "semantic" => Ok(QueryKind::Semantic),
        "contextual" => Ok(QueryKind::Contextual),
        "signature" => Ok(QueryKind::Signature),
        "file" => Ok(QueryKind::File),
        "lexical" => Ok(QueryKind::Lexical),
        other => Err(format!(
            "unknown kind '{other}' (expected semantic, contextual, signature, file or lexical)"
        )),
    }
}

/// Execute the query command
pub async fn execute(args: QueryArgs, global: &GlobalOptions) -> Result<()> {
    let needs_model = matches!(args.kind, QueryKind::Semantic | QueryKind::Contextual);
    let engine = bootstrap(global, needs_model && !args.no_model).await?;

    let mut request = QueryRequest::new(args.kind, args.text);
    request.max_results = args.max_results;
    request.min_score = args.min_score;
    request.filters.file_globs = args.filters;

    let response = engine
        .processor
        .process(request, QueryDeadline::new(engine.query_timeout))
        .await
        .context("query failed")?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
