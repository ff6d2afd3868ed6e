mod channel;
mod cli;
mod config;
mod form;
mod notification;
mod screen;
mod service;
mod state;
mod stomp;
mod task;
mod transport;

#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let default_filter = if cli.output.verbose {
        "periodcert=debug,info"
    } else {
        "periodcert=warn"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    cli::run(cli).await
}
