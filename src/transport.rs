//! Message-framed duplex transport for the status channel.
//!
//! `Transport` is the seam between the status channel and the wire. The
//! production implementation speaks STOMP over a WebSocket and takes care of
//! heart-beats; tests substitute an in-memory broker.

use std::future::Future;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::stomp::{Command, Frame, FrameError, HEARTBEAT_FRAME, HeartBeat};

/// Errors that can occur on the transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Binary frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Broker rejected the connection: {0}")]
    Rejected(String),

    #[error("Connection closed before the handshake completed")]
    ClosedDuringHandshake,

    #[error("Transport is not connected")]
    NotConnected,
}

/// A duplex, message-framed connection with publish/subscribe semantics
pub trait Transport: Send + 'static {
    /// Perform the handshake, resolving with the broker's CONNECTED frame
    fn connect(
        &mut self,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<Frame, TransportError>> + Send;

    /// Subscribe to a destination under the given subscription id
    fn subscribe(
        &mut self,
        destination: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Wait for the next non-heart-beat frame. `Ok(None)` means the peer closed.
    fn next_frame(&mut self) -> impl Future<Output = Result<Option<Frame>, TransportError>> + Send;

    /// Send DISCONNECT and close the underlying connection
    fn disconnect(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// STOMP over WebSocket
pub struct WsTransport {
    url: String,
    heartbeat: HeartBeat,
    stream: Option<WsStream>,
    /// Outgoing heart-beat ticker, armed after negotiation
    ticker: Option<Interval>,
    /// Active subscription ids, released before DISCONNECT
    subscriptions: Vec<String>,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, heartbeat: HeartBeat) -> Self {
        Self {
            url: url.into(),
            heartbeat,
            stream: None,
            ticker: None,
            subscriptions: Vec::new(),
        }
    }

    /// Host header value derived from the broker URL
    fn host(&self) -> &str {
        let without_scheme = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        without_scheme.split('/').next().unwrap_or(without_scheme)
    }

    async fn send_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        tracing::debug!("-> {}", frame.command);
        stream.send(Message::text(frame.encode())).await?;
        Ok(())
    }

    /// Read the next frame from the socket, skipping heart-beats and control messages
    async fn read_frame(stream: &mut WsStream) -> Result<Option<Frame>, TransportError> {
        while let Some(msg) = stream.next().await {
            match msg? {
                Message::Text(text) => {
                    if let Some(frame) = Frame::decode(text.as_str())? {
                        tracing::debug!("<- {}", frame.command);
                        return Ok(Some(frame));
                    }
                }
                Message::Binary(bytes) => {
                    if let Some(frame) = decode_binary(&bytes)? {
                        tracing::debug!("<- {} (binary)", frame.command);
                        return Ok(Some(frame));
                    }
                }
                Message::Close(_) => return Ok(None),
                _ => {}
            }
        }
        Ok(None)
    }
}

/// Decode a frame carried in a binary WebSocket message
fn decode_binary(bytes: &[u8]) -> Result<Option<Frame>, TransportError> {
    let text = std::str::from_utf8(bytes)?;
    Ok(Frame::decode(text)?)
}

impl Transport for WsTransport {
    async fn connect(&mut self, headers: &[(String, String)]) -> Result<Frame, TransportError> {
        tracing::info!("Connecting to status broker at {}", self.url);
        let (stream, _) = connect_async(self.url.as_str()).await?;
        self.stream = Some(stream);

        let connect = Frame::connect(self.host(), self.heartbeat, headers);
        self.send_frame(&connect).await?;

        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        let frame = Self::read_frame(stream)
            .await?
            .ok_or(TransportError::ClosedDuringHandshake)?;

        match frame.command {
            Command::Connected => {
                let server = HeartBeat::parse(frame.get("heart-beat").unwrap_or("0,0"));
                if let Some(period) = self.heartbeat.client_send_interval(server) {
                    tracing::debug!("Sending heart-beats every {:?}", period);
                    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.ticker = Some(ticker);
                }
                Ok(frame)
            }
            Command::Error => Err(TransportError::Rejected(
                frame.get("message").unwrap_or(&frame.body).to_string(),
            )),
            other => Err(TransportError::Rejected(format!(
                "unexpected {} frame during handshake",
                other
            ))),
        }
    }

    async fn subscribe(&mut self, destination: &str, id: &str) -> Result<(), TransportError> {
        self.send_frame(&Frame::subscribe(id, destination)).await?;
        self.subscriptions.push(id.to_string());
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
            match self.ticker.as_mut() {
                Some(ticker) => {
                    tokio::select! {
                        frame = Self::read_frame(stream) => return frame,
                        _ = ticker.tick() => {
                            stream.send(Message::text(HEARTBEAT_FRAME)).await?;
                        }
                    }
                }
                None => return Self::read_frame(stream).await,
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.stream.is_none() {
            return Ok(());
        }
        self.ticker = None;
        for id in std::mem::take(&mut self.subscriptions) {
            if let Err(e) = self.send_frame(&Frame::unsubscribe(&id)).await {
                tracing::debug!("UNSUBSCRIBE {} failed: {}", id, e);
            }
        }
        let result = self.send_frame(&Frame::disconnect("disconnect-0")).await;
        if let Some(mut stream) = self.stream.take() {
            // The broker may already have dropped the socket
            let _ = stream.close(None).await;
        }
        tracing::info!("Disconnected from status broker");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_from_url() {
        let t = WsTransport::new("ws://localhost:8080/ws/websocket", HeartBeat::default());
        assert_eq!(t.host(), "localhost:8080");

        let t = WsTransport::new("wss://broker.example.com", HeartBeat::default());
        assert_eq!(t.host(), "broker.example.com");
    }

    #[test]
    fn test_binary_frames_must_be_utf8() {
        let frame = decode_binary(b"MESSAGE\nsubscription:sub-0\n\n{\"status\":\"Completado\"}\0")
            .unwrap()
            .unwrap();
        assert_eq!(frame.body, r#"{"status":"Completado"}"#);

        let invalid = b"MESSAGE\n\n\xff\xfe\0";
        assert!(matches!(
            decode_binary(invalid),
            Err(TransportError::InvalidUtf8(_))
        ));
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let mut t = WsTransport::new("ws://localhost:1/ws", HeartBeat::default());
        assert!(matches!(
            t.subscribe("/topic/status", "sub-0").await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(t.next_frame().await, Err(TransportError::NotConnected)));
        // Disconnecting a transport that never connected is a no-op
        assert!(t.disconnect().await.is_ok());
    }
}
