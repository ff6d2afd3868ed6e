//! Status channel: one long-lived STOMP subscription to the status topic.
//!
//! The session runs in a background task and reports everything it sees as
//! typed [`ChannelEvent`]s. The owner drains them with [`StatusChannel::poll`]
//! from its own loop, so all state changes happen on the owner's side.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::stomp::{Command, Frame};
use crate::transport::Transport;

/// Topic carrying backend processing-status events
pub const STATUS_TOPIC: &str = "/topic/status";

/// Subscription id used for the status topic
const SUBSCRIPTION_ID: &str = "sub-0";

/// Connectivity of the status channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// A status update pushed by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub status: String,
}

impl StatusEvent {
    /// Decode a message body. Extra fields are ignored.
    pub fn from_body(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// Events reported by the channel session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Handshake completed and the topic subscription was sent
    Connected,
    /// A status message arrived on the topic
    Status(StatusEvent),
    /// A message arrived but its body could not be decoded; it was skipped
    Malformed(String),
    /// The handshake failed; the channel stays disconnected
    Failed(String),
    /// The broker closed the session or sent an ERROR frame
    Closed(String),
}

/// Owned handle to the status subscription
pub struct StatusChannel {
    state: ConnectionState,
    last_status: Option<String>,
    /// Delivery queue; `None` once disconnected
    events: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl StatusChannel {
    /// Start the session over the given transport.
    ///
    /// The handshake happens in the background; the channel reports
    /// [`ChannelEvent::Connected`] once it succeeds. There is a single attempt
    /// with no timeout.
    pub fn connect<T: Transport>(
        transport: T,
        topic: impl Into<String>,
        headers: Vec<(String, String)>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let topic = topic.into();

        let task = tokio::spawn(run_session(transport, topic, headers, events_tx, shutdown_rx));

        Self {
            state: ConnectionState::Disconnected,
            last_status: None,
            events: Some(events_rx),
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Most recent status received on the topic
    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }

    /// Drain pending events in arrival order without blocking
    pub fn poll(&mut self) -> Vec<ChannelEvent> {
        let Some(rx) = self.events.as_mut() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match &event {
                ChannelEvent::Connected => self.state = ConnectionState::Connected,
                ChannelEvent::Status(status) => self.last_status = Some(status.status.clone()),
                _ => {}
            }
            events.push(event);
        }
        events
    }

    /// Tear down the subscription.
    ///
    /// Nothing delivered after this call is ever observed. Calling it again is a no-op.
    pub fn disconnect(&mut self) {
        if self.events.take().is_none() {
            return;
        }
        self.state = ConnectionState::Disconnected;
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        tracing::info!("Status channel disconnect requested");
    }

    /// Wait for the session task to finish after `disconnect`
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Status channel task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for StatusChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn run_session<T: Transport>(
    mut transport: T,
    topic: String,
    headers: Vec<(String, String)>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let handshake = tokio::select! {
        result = transport.connect(&headers) => result,
        _ = &mut shutdown => {
            tracing::info!("Status channel closed before the handshake completed");
            let _ = transport.disconnect().await;
            return;
        }
    };

    match handshake {
        Ok(frame) => {
            tracing::info!(
                "Connected to status broker (version {})",
                frame.get("version").unwrap_or("unknown")
            );
        }
        Err(e) => {
            tracing::error!("Status channel handshake failed: {}", e);
            let _ = events.send(ChannelEvent::Failed(e.to_string()));
            return;
        }
    }

    if let Err(e) = transport.subscribe(&topic, SUBSCRIPTION_ID).await {
        tracing::error!("Failed to subscribe to {}: {}", topic, e);
        let _ = events.send(ChannelEvent::Failed(e.to_string()));
        let _ = transport.disconnect().await;
        return;
    }
    tracing::info!("Subscribed to {}", topic);
    let _ = events.send(ChannelEvent::Connected);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            frame = transport.next_frame() => match frame {
                Ok(Some(frame)) => {
                    if !handle_frame(frame, &events) {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::warn!("Status broker closed the connection");
                    let _ = events.send(ChannelEvent::Closed("connection closed by broker".to_string()));
                    return;
                }
                Err(e) => {
                    tracing::error!("Status channel receive failed: {}", e);
                    let _ = events.send(ChannelEvent::Closed(e.to_string()));
                    return;
                }
            }
        }
    }

    if let Err(e) = transport.disconnect().await {
        tracing::warn!("Error while disconnecting status channel: {}", e);
    }
}

/// Turn one inbound frame into an event. Returns false when the session must end.
fn handle_frame(frame: Frame, events: &mpsc::UnboundedSender<ChannelEvent>) -> bool {
    match frame.command {
        Command::Message => {
            if let Some(sub) = frame.get("subscription") {
                if sub != SUBSCRIPTION_ID {
                    tracing::debug!("Ignoring message for subscription {}", sub);
                    return true;
                }
            }
            match StatusEvent::from_body(&frame.body) {
                Ok(event) => {
                    tracing::debug!("Status received: {}", event.status);
                    let _ = events.send(ChannelEvent::Status(event));
                }
                Err(e) => {
                    tracing::warn!("Skipping malformed status message: {}", e);
                    let _ = events.send(ChannelEvent::Malformed(e.to_string()));
                }
            }
            true
        }
        Command::Error => {
            let message = frame.get("message").unwrap_or(&frame.body).to_string();
            tracing::error!("Status broker sent ERROR: {}", message);
            let _ = events.send(ChannelEvent::Closed(message));
            false
        }
        other => {
            tracing::debug!("Ignoring {} frame", other);
            true
        }
    }
}
