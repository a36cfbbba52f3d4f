use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;

use docindex::cli::commands::{
    CommandContext, handle_clear, handle_config, handle_query, handle_reconcile, handle_status,
};
use docindex::cli::{Cli, Commands};
use docindex::logging;
use docindex::models::Config;
use docindex::services::CancellationFlag;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) if path.exists() => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        Some(_) => Config::default(),
        None => Config::load().context("failed to load config")?,
    };
    if cli.verbose {
        config.logging.default = "info".to_string();
    }
    logging::init_with_config(&config.logging);

    let ctx = CommandContext {
        format: cli.format.unwrap_or_default(),
        verbose: cli.verbose,
        config_path: cli.config,
        config,
        cancel: CancellationFlag::default(),
    };

    let command = run_command(cli.command, &ctx);
    tokio::pin!(command);

    tokio::select! {
        result = &mut command => {
            result?;
        }
        _ = shutdown_signal() => {
            eprintln!("\nReceived shutdown signal, cleaning up...");
            ctx.cancel.cancel();
            command.await?;
        }
    }

    Ok(())
}

async fn run_command(command: Commands, ctx: &CommandContext) -> Result<()> {
    match command {
        Commands::Reconcile(args) => {
            handle_reconcile(args, ctx).await?;
        }
        Commands::Query(args) => {
            handle_query(args, ctx).await?;
        }
        Commands::Clear(args) => {
            handle_clear(args, ctx).await?;
        }
        Commands::Status(args) => {
            handle_status(args, ctx).await?;
        }
        Commands::Config(cmd) => {
            handle_config(cmd, ctx).await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
