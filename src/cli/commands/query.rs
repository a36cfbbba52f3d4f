//! Query command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{CommandContext, open_directory};
use crate::cli::output::get_formatter;

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Directory whose index to search
    #[arg(required = true)]
    pub path: PathBuf,

    /// Search text
    #[arg(required = true)]
    pub query: String,

    /// Maximum number of results
    #[arg(long, short = 'n')]
    pub limit: Option<u32>,

    /// Minimum similarity score
    #[arg(long)]
    pub min_score: Option<f32>,

    /// Merge overlapping results of the same section
    #[arg(long)]
    pub merge: bool,
}

pub async fn handle_query(args: QueryArgs, ctx: &CommandContext) -> Result<()> {
    let formatter = get_formatter(ctx.format);
    let (source, service) = open_directory(&ctx.config, &args.path)?;
    let project = source.project();

    // A trigger fired from an empty index would die with this process
    if !service
        .is_indexed(project)
        .await
        .context("failed to open index")?
    {
        anyhow::bail!(
            "no indexed documents for {}\nRun `docindex reconcile {}` first.",
            source.root().display(),
            args.path.display()
        );
    }

    let top_n = args.limit.unwrap_or(ctx.config.query.top_n) as usize;
    let threshold = args.min_score.unwrap_or(ctx.config.query.score_threshold);

    if ctx.verbose {
        eprintln!("Searching project {project} for: {}", args.query);
        eprintln!("Limit: {top_n}, min score: {threshold}");
    }

    let queries = service.query_service();
    let result = if args.merge {
        queries
            .query_merged(project, &args.query, top_n, threshold)
            .await
    } else {
        queries.query(project, &args.query, top_n, threshold).await
    };
    service.shutdown();

    println!("{}", formatter.format_search_result(&args.query, &result));
    Ok(())
}
