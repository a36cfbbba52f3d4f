mod clear;
mod config;
mod query;
mod reconcile;
mod status;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::{Config, OutputFormat};
use crate::services::{CancellationFlag, IndexService};
use crate::sources::DirectorySource;

pub use clear::ClearArgs;
pub use config::ConfigCommand;
pub use query::QueryArgs;
pub use reconcile::ReconcileArgs;
pub use status::StatusArgs;

pub use clear::handle_clear;
pub use config::handle_config;
pub use query::handle_query;
pub use reconcile::handle_reconcile;
pub use status::handle_status;

/// Settings shared by every command of one invocation.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: Config,
    pub config_path: Option<std::path::PathBuf>,
    pub format: OutputFormat,
    pub verbose: bool,
    /// Set when the process receives a shutdown signal
    pub cancel: CancellationFlag,
}

/// The source and service for a project directory.
fn open_directory(config: &Config, path: &Path) -> Result<(Arc<DirectorySource>, IndexService)> {
    let root = path
        .canonicalize()
        .with_context(|| format!("directory not found: {}", path.display()))?;
    if !root.is_dir() {
        anyhow::bail!("not a directory: {}", root.display());
    }

    let source = Arc::new(DirectorySource::with_defaults(root));
    let service = IndexService::from_config(config, source.clone())
        .context("failed to initialize index service")?;
    Ok((source, service))
}
