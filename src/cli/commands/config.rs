use anyhow::{Context, Result};
use clap::Subcommand;

use super::CommandContext;
use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Initialize configuration file")]
    Init {
        #[arg(long, short = 'f', help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration file path")]
    Path,
}

pub async fn handle_config(cmd: ConfigCommand, ctx: &CommandContext) -> Result<()> {
    let formatter = get_formatter(ctx.format);

    match cmd {
        ConfigCommand::Init { force } => handle_init(ctx, force, formatter.as_ref()),
        ConfigCommand::Show => handle_show(ctx),
        ConfigCommand::Path => handle_path(ctx, formatter.as_ref()),
    }
}

fn config_path(ctx: &CommandContext) -> Result<std::path::PathBuf> {
    ctx.config_path
        .clone()
        .or_else(Config::config_path)
        .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))
}

fn handle_init(ctx: &CommandContext, force: bool, formatter: &dyn Formatter) -> Result<()> {
    let path = config_path(ctx)?;

    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default()
        .save_to(&path)
        .context("failed to create config")?;
    println!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );
    Ok(())
}

fn handle_show(ctx: &CommandContext) -> Result<()> {
    match ctx.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&ctx.config)?;
            println!("{json}");
        }
        OutputFormat::Text => {
            let toml = toml::to_string_pretty(&ctx.config)?;
            println!("{toml}");
        }
    }
    Ok(())
}

fn handle_path(ctx: &CommandContext, formatter: &dyn Formatter) -> Result<()> {
    let path = config_path(ctx)?;
    let state = if path.exists() { "exists" } else { "not created" };
    println!(
        "{}",
        formatter.format_message(&format!("{} ({state})", path.display()))
    );
    Ok(())
}
