//! Subcommand implementations

pub mod codes;
pub mod config;
pub mod submit;
pub mod watch;

use anyhow::Result;

use crate::config::Config;
use crate::notification::Notifications;
use crate::screen::{ConsultantPeriodScreen, ScreenSettings};
use crate::service::{CertificationService, ServiceClient};
use crate::state::ScreenEvent;
use crate::transport::WsTransport;

/// Open a screen against the configured broker and service
pub fn open_screen(config: &Config) -> Result<ConsultantPeriodScreen<ServiceClient>> {
    let service = ServiceClient::new(&config.service)?;
    let transport = WsTransport::new(config.broker.url.clone(), config.broker.heartbeat());
    Ok(ConsultantPeriodScreen::open(
        transport,
        service,
        Notifications::new(),
        ScreenSettings::from_config(config),
    ))
}

/// Poll the screen until the status channel is up.
///
/// Returns the events that followed `Connected` in the same batch so the caller
/// can handle them. Fails when the handshake is rejected or the wait timeout elapses.
pub async fn wait_connected<S: CertificationService>(
    screen: &mut ConsultantPeriodScreen<S>,
    config: &Config,
) -> Result<Vec<ScreenEvent>> {
    let deadline = tokio::time::Instant::now() + config.screen.wait_timeout();

    loop {
        let mut connected = false;
        let mut after = Vec::new();
        for event in screen.poll() {
            match event {
                ScreenEvent::Connected => connected = true,
                ScreenEvent::ConnectionFailed(reason) => {
                    anyhow::bail!("Could not connect to {}: {}", config.broker.url, reason)
                }
                other if connected => after.push(other),
                other => log_event(&other),
            }
        }
        if connected {
            return Ok(after);
        }

        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("Timed out connecting to {}", config.broker.url);
        }
        tokio::time::sleep(config.screen.poll_interval()).await;
    }
}

/// Log an event a command has no other use for
pub fn log_event(event: &ScreenEvent) {
    match event {
        ScreenEvent::LogInfo(msg) => tracing::info!("{}", msg),
        ScreenEvent::LogError(msg) => tracing::warn!("{}", msg),
        other => tracing::debug!("Event: {:?}", other),
    }
}
