//! CLI definition.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::commands;

/// Scaffold projects and automate releases through plugins.
#[derive(Debug, Parser)]
#[command(name = "rigger")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run as if started in this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a new project
    Create(commands::create::CreateArgs),

    /// Release a new version
    Release(commands::release::ReleaseArgs),
}

impl Cli {
    /// Runs the CLI command.
    pub async fn run(self) -> Result<()> {
        let cwd = match self.cwd {
            Some(cwd) => cwd,
            None => std::env::current_dir().context("failed to read the current directory")?,
        };

        match self.command {
            Commands::Create(args) => commands::create::run(cwd, args).await,
            Commands::Release(args) => commands::release::run(cwd, args).await,
        }
    }
}
