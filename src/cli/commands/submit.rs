//! One-shot certification request

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::{log_event, open_screen, wait_connected};
use crate::cli::output::{OutputFormat, print_formatted, print_success};
use crate::config::Config;
use crate::form::parse_periodo;
use crate::state::ScreenEvent;

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Period to certify (YYYY-MM-DD or DD/MM/YYYY)
    #[arg(long)]
    pub periodo: String,

    /// Budget code
    #[arg(long)]
    pub codigo: String,
}

#[derive(Serialize)]
struct SubmitResult {
    periodo: String,
    codigo: String,
    status: String,
    failed: bool,
    notification: Option<String>,
}

pub async fn run(args: SubmitArgs, config: &Config, format: OutputFormat, quiet: bool) -> Result<()> {
    let periodo = parse_periodo(&args.periodo)?;

    let mut screen = open_screen(config)?;
    for event in wait_connected(&mut screen, config).await? {
        log_event(&event);
    }
    print_success(&format!("Connected to {}", config.broker.url), quiet);

    // Code first so the period edit resets the status
    screen.set_codigo(args.codigo.as_str());
    screen.set_periodo(Some(periodo));

    let problems = screen.form().problems();
    if !problems.is_empty() {
        screen.close().await;
        anyhow::bail!("Invalid request: {}", problems.join(", "));
    }

    if screen.submit().is_none() {
        screen.close().await;
        anyhow::bail!("Request was not sent");
    }
    print_success(
        &format!("Requested certification of {} for {}", args.codigo, args.periodo),
        quiet,
    );

    let deadline = tokio::time::Instant::now() + config.screen.wait_timeout();
    let mut failed = false;
    while screen.state().loading {
        for event in screen.poll() {
            match event {
                ScreenEvent::SubmissionFailed(_) => failed = true,
                ScreenEvent::ChannelClosed(reason) => {
                    screen.close().await;
                    anyhow::bail!("Status updates stopped before a status arrived: {}", reason);
                }
                other => log_event(&other),
            }
        }

        if !screen.state().loading {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            screen.close().await;
            anyhow::bail!("Timed out waiting for the certification status");
        }
        tokio::time::sleep(config.screen.poll_interval()).await;
    }

    let result = SubmitResult {
        periodo: crate::form::format_periodo(periodo),
        codigo: args.codigo.clone(),
        status: screen.state().status.clone(),
        failed,
        notification: screen.notifications().current(),
    };
    screen.close().await;

    print_formatted(&result, format, |r| match &r.notification {
        Some(message) if r.failed => format!("Failed: {}", message),
        _ => format!("Status: {}", r.status),
    });

    if failed {
        anyhow::bail!(
            "{}",
            result
                .notification
                .unwrap_or_else(|| config.screen.service_unavailable_message.clone())
        );
    }

    Ok(())
}
