use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{CommandContext, open_directory};
use crate::cli::output::get_formatter;

#[derive(Debug, Args)]
pub struct ClearArgs {
    /// Directory whose index to delete
    #[arg(required = true)]
    pub path: PathBuf,
}

pub async fn handle_clear(args: ClearArgs, ctx: &CommandContext) -> Result<()> {
    let formatter = get_formatter(ctx.format);
    let (source, service) = open_directory(&ctx.config, &args.path)?;
    let project = source.project();
    let dir = service.pool().index_dir(project);

    if !dir.exists() {
        println!(
            "{}",
            formatter.format_message(&format!("No index for {}", source.root().display()))
        );
        return Ok(());
    }

    service
        .clear_index(project)
        .with_context(|| format!("failed to clear index at {}", dir.display()))?;
    service.shutdown();

    println!(
        "{}",
        formatter.format_message(&format!("Cleared index at {}", dir.display()))
    );
    Ok(())
}
