//! CLI command definitions and dispatch.

mod scan;
mod version;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Stratum — container image vulnerability scanner.
#[derive(Parser)]
#[command(name = "stratum", version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Scan an image and publish findings
    Scan(scan::ScanArgs),
    /// Show version information
    Version,
}

/// Dispatch a parsed CLI invocation.
pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = crate::config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Scan(args) => scan::run(config, args).await,
        Command::Version => {
            version::run();
            Ok(())
        }
    }
}
