//! Operator CLI over a directory-backed project.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Semantic index of a document directory: reconcile, query, inspect.
#[derive(Debug, Parser)]
#[command(name = "docindex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'f', global = true, help = "Output format: text or json")]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(
        long,
        short = 'c',
        global = true,
        env = "DOCINDEX_CONFIG",
        help = "Path to a config file"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Bring a directory's index up to date
    Reconcile(commands::ReconcileArgs),

    /// Search a directory's index
    Query(commands::QueryArgs),

    /// Delete a directory's index
    Clear(commands::ClearArgs),

    /// Show index status of a directory
    Status(commands::StatusArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
