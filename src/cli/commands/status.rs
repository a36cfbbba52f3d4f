use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{CommandContext, open_directory};
use crate::cli::output::{StatusInfo, get_formatter};
use crate::services::vector_index::INDEX_FILE_NAME;
use crate::sources::DocumentSource;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Directory to inspect
    #[arg(required = true)]
    pub path: PathBuf,
}

pub async fn handle_status(args: StatusArgs, ctx: &CommandContext) -> Result<()> {
    let formatter = get_formatter(ctx.format);
    let (source, service) = open_directory(&ctx.config, &args.path)?;
    let project = source.project();
    let index_dir = service.pool().index_dir(project);

    let documents = source
        .list_documents(project)
        .await
        .context("failed to list documents")?;

    let mut status = StatusInfo {
        root: source.root().display().to_string(),
        project: project.0,
        index_dir: index_dir.display().to_string(),
        index_exists: index_dir.join(INDEX_FILE_NAME).exists(),
        entries: 0,
        documents_indexed: 0,
        documents_found: documents.len(),
        dimension: None,
        last_commit: None,
        embedding_url: ctx.config.embedding.url.clone(),
    };

    if status.index_exists {
        let lease = service.pool().borrow(project).await?;
        let index = lease.index()?;
        status.entries = index.len()?;
        status.documents_indexed = index.document_ids()?.len();
        status.dimension = index.dimension();
        status.last_commit = index.last_commit()?;
    }
    service.shutdown();

    println!("{}", formatter.format_status(&status));
    Ok(())
}
