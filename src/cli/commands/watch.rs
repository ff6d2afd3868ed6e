//! Follow the status topic

use anyhow::Result;
use serde::Serialize;

use super::{log_event, open_screen, wait_connected};
use crate::cli::output::{OutputFormat, print_line, print_success};
use crate::config::Config;
use crate::state::ScreenEvent;

#[derive(Serialize)]
struct StatusLine {
    time: String,
    status: String,
}

/// Print every status pushed on the topic until Ctrl-C
pub async fn run(config: &Config, format: OutputFormat, quiet: bool) -> Result<()> {
    let mut screen = open_screen(config)?;
    let first = wait_connected(&mut screen, config).await?;
    print_success(
        &format!("Watching {} on {} (Ctrl-C to stop)", config.broker.topic, config.broker.url),
        quiet,
    );

    let mut outcome = handle_events(first, format);

    let mut ticker = tokio::time::interval(config.screen.poll_interval());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while outcome.is_ok() {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => outcome = handle_events(screen.poll(), format),
        }
    }

    screen.close().await;
    outcome
}

/// Print pushed statuses. Fails once the channel has closed.
fn handle_events(events: Vec<ScreenEvent>, format: OutputFormat) -> Result<()> {
    for event in events {
        match event {
            ScreenEvent::StatusChanged(status) => {
                let line = StatusLine {
                    time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                    status,
                };
                print_line(&line, format, |l| format!("[{}] {}", l.time, l.status));
            }
            ScreenEvent::ChannelClosed(reason) => {
                anyhow::bail!("Status updates stopped: {}", reason);
            }
            other => log_event(&other),
        }
    }
    Ok(())
}
