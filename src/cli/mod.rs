//! CLI module for periodcert
//!
//! Provides the command-line interface and the interactive screen shell.

mod commands;
mod output;
mod shell;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use output::OutputFormat;

use crate::config::Config;

/// periodcert - period certification requests with live status
#[derive(Parser, Debug)]
#[command(name = "periodcert")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[command(flatten)]
    pub output: OutputOptions,

    /// Use this configuration file instead of the default one
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Defaults to the interactive screen
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output formatting options
#[derive(Parser, Debug, Clone)]
pub struct OutputOptions {
    /// Output in JSON format (for machine parsing)
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl OutputOptions {
    pub fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the interactive certification screen
    Screen,

    /// Submit a certification request and wait for its status
    Submit(commands::submit::SubmitArgs),

    /// Print status updates as they arrive
    Watch,

    /// List selectable codes
    Codes,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: commands::config::ConfigCommands,
    },
}

/// Run the CLI with parsed arguments
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.output.format();
    let quiet = cli.output.quiet;

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command.unwrap_or(Commands::Screen) {
        Commands::Screen => shell::run(&config, cli.output.verbose).await,
        Commands::Submit(args) => commands::submit::run(args, &config, format, quiet).await,
        Commands::Watch => commands::watch::run(&config, format, quiet).await,
        Commands::Codes => commands::codes::run(&config, format).await,
        Commands::Config { command } => {
            commands::config::run(command, cli.config.as_deref(), format, quiet).await
        }
    }
}
