//! In-memory collaborators for tests: a STOMP broker stand-in and a scripted
//! certification service.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::channel::StatusChannel;
use crate::screen::ConsultantPeriodScreen;
use crate::service::{Budget, CertificationService, ServiceError, SubmissionRequest};
use crate::state::ScreenEvent;
use crate::stomp::{Command, Frame};
use crate::transport::{Transport, TransportError};

const POLL_ATTEMPTS: usize = 200;
const POLL_DELAY: Duration = Duration::from_millis(5);

/// Broker side of an in-memory transport
pub struct MemoryBroker {
    inbound: mpsc::UnboundedSender<Frame>,
    log: Arc<Mutex<Vec<String>>>,
}

impl MemoryBroker {
    pub fn send(&self, frame: Frame) {
        let _ = self.inbound.send(frame);
    }

    pub fn publish_body(&self, body: &str) {
        let mut frame = Frame::new(Command::Message)
            .header("destination", crate::channel::STATUS_TOPIC)
            .header("subscription", "sub-0");
        frame.body = body.to_string();
        self.send(frame);
    }

    pub fn publish_status(&self, status: &str) {
        self.publish_body(&serde_json::json!({ "status": status }).to_string());
    }

    /// Client commands seen so far, in order
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

/// Client side of an in-memory transport
pub struct MemoryTransport {
    reject: Option<String>,
    inbound: mpsc::UnboundedReceiver<Frame>,
    log: Arc<Mutex<Vec<String>>>,
}

impl Transport for MemoryTransport {
    async fn connect(&mut self, _headers: &[(String, String)]) -> Result<Frame, TransportError> {
        self.log.lock().unwrap().push("CONNECT".to_string());
        match &self.reject {
            Some(reason) => Err(TransportError::Rejected(reason.clone())),
            None => Ok(Frame::new(Command::Connected).header("version", "1.2")),
        }
    }

    async fn subscribe(&mut self, destination: &str, id: &str) -> Result<(), TransportError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("SUBSCRIBE {} {}", destination, id));
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        Ok(self.inbound.recv().await)
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.log.lock().unwrap().push("DISCONNECT".to_string());
        Ok(())
    }
}

pub fn memory_transport() -> (MemoryBroker, MemoryTransport) {
    let (tx, rx) = mpsc::unbounded_channel();
    let log = Arc::new(Mutex::new(Vec::new()));
    (
        MemoryBroker {
            inbound: tx,
            log: log.clone(),
        },
        MemoryTransport {
            reject: None,
            inbound: rx,
            log,
        },
    )
}

pub fn rejecting_transport(reason: &str) -> (MemoryBroker, MemoryTransport) {
    let (broker, mut transport) = memory_transport();
    transport.reject = Some(reason.to_string());
    (broker, transport)
}

/// Certification service with a fixed outcome that records every request
#[derive(Clone)]
pub struct ScriptedService {
    fail: bool,
    /// How long each certification request takes to resolve
    delay: Duration,
    budgets: Vec<Budget>,
    requests: Arc<Mutex<Vec<SubmissionRequest>>>,
}

impl ScriptedService {
    pub fn accepting() -> Self {
        Self {
            fail: false,
            delay: Duration::ZERO,
            budgets: vec![
                Budget {
                    codigo: "A1".to_string(),
                    descripcion: Some("Presupuesto A1".to_string()),
                },
                Budget {
                    codigo: "B2".to_string(),
                    descripcion: None,
                },
            ],
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            fail: true,
            ..Self::accepting()
        }
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        Self { delay, ..self }
    }

    pub fn requests(&self) -> Vec<SubmissionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CertificationService for ScriptedService {
    async fn certify(&self, request: SubmissionRequest) -> Result<(), ServiceError> {
        self.requests.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            Err(ServiceError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }

    async fn budgets(&self) -> Result<Vec<Budget>, ServiceError> {
        Ok(self.budgets.clone())
    }
}

/// Poll a channel until `done` holds, returning every event seen
pub async fn wait_for<F>(channel: &mut StatusChannel, mut done: F) -> Vec<crate::channel::ChannelEvent>
where
    F: FnMut(&StatusChannel) -> bool,
{
    let mut events = Vec::new();
    for _ in 0..POLL_ATTEMPTS {
        events.extend(channel.poll());
        if done(channel) {
            return events;
        }
        tokio::time::sleep(POLL_DELAY).await;
    }
    panic!("condition not reached, events: {:?}", events);
}

/// Poll a screen until `done` holds, returning every event seen
pub async fn settle<S, F>(screen: &mut ConsultantPeriodScreen<S>, mut done: F) -> Vec<ScreenEvent>
where
    S: CertificationService,
    F: FnMut(&ConsultantPeriodScreen<S>, &[ScreenEvent]) -> bool,
{
    let mut events = Vec::new();
    for _ in 0..POLL_ATTEMPTS {
        events.extend(screen.poll());
        if done(screen, &events) {
            return events;
        }
        tokio::time::sleep(POLL_DELAY).await;
    }
    panic!("screen did not settle, events: {:?}", events);
}

/// Let background tasks run for a while, collecting whatever the screen reports
pub async fn drain<S: CertificationService>(screen: &mut ConsultantPeriodScreen<S>) -> Vec<ScreenEvent> {
    let mut events = Vec::new();
    for _ in 0..10 {
        events.extend(screen.poll());
        tokio::time::sleep(POLL_DELAY).await;
    }
    events
}
