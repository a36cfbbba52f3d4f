//! Reconcile command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use super::{CommandContext, open_directory};
use crate::cli::output::get_formatter;
use crate::models::OutputFormat;
use crate::services::{JobContext, Progress, ReconcileMode, ReconcileStatus};
use crate::sources::DocumentSource;

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Directory whose index to update
    #[arg(required = true)]
    pub path: PathBuf,

    /// Drop the stored index and embed every document again
    #[arg(long)]
    pub rebuild: bool,
}

pub async fn handle_reconcile(args: ReconcileArgs, ctx: &CommandContext) -> Result<()> {
    let formatter = get_formatter(ctx.format);
    let (source, service) = open_directory(&ctx.config, &args.path)?;
    let project = source.project();

    let mode = if args.rebuild {
        ReconcileMode::Rebuild
    } else {
        ReconcileMode::Incremental
    };

    if ctx.verbose {
        eprintln!(
            "Reconciling {} (project {project}, {mode:?})",
            source.root().display()
        );
    }

    let job = JobContext {
        cancel: ctx.cancel.clone(),
        progress: Arc::default(),
    };

    let pb = (ctx.format == OutputFormat::Text).then(|| {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    });
    let ticker = pb
        .clone()
        .map(|pb| tokio::spawn(track_progress(pb, job.progress.clone())));

    let result = service.reconcile_now(project, mode, &job).await;

    if let Some(ticker) = ticker {
        ticker.abort();
    }
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    service.shutdown();

    let report = result.context("reconciliation failed")?;

    if ctx.verbose {
        for id in &report.skipped {
            let name = source
                .document_name(project, *id)
                .await
                .unwrap_or_else(|| id.to_string());
            eprintln!("  skipped: {name}");
        }
    }

    println!("{}", formatter.format_reconcile_report(&report));

    if report.status == ReconcileStatus::Cancelled {
        eprintln!("Run the command again to finish the remaining documents.");
    }

    Ok(())
}

async fn track_progress(pb: ProgressBar, progress: Arc<Progress>) {
    loop {
        let (processed, total) = progress.snapshot();
        pb.set_length(total);
        pb.set_position(processed);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
