//! Code list state

use tokio::task::JoinHandle;

use crate::service::{Budget, CertificationService, ServiceError};
use crate::state::ScreenEvent;
use crate::task::{PollResult, poll_task};

/// Selectable codes, read once when the screen opens
#[derive(Default)]
pub struct CodesState {
    /// Fetched codes
    pub budgets: Vec<Budget>,
    /// Async task for fetching codes
    task: Option<JoinHandle<Result<Vec<Budget>, ServiceError>>>,
    /// Whether codes are currently being fetched
    pub loading: bool,
    /// Error message from the fetch attempt
    pub error: Option<String>,
}

impl CodesState {
    /// Start fetching codes
    pub fn fetch<S: CertificationService>(&mut self, service: &S) {
        if self.loading {
            return; // Already fetching
        }

        self.loading = true;
        self.error = None;

        let service = service.clone();
        self.task = Some(tokio::spawn(async move { service.budgets().await }));
    }

    /// Poll the fetch task for completion
    pub fn poll(&mut self) -> Vec<ScreenEvent> {
        let mut events = Vec::new();

        match poll_task(&mut self.task) {
            PollResult::Complete(Ok(Ok(budgets))) => {
                let count = budgets.len();
                self.budgets = budgets;
                events.push(ScreenEvent::CodesLoaded(count));
                self.loading = false;
            }
            PollResult::Complete(Ok(Err(e))) => {
                let msg = format!("Failed to fetch codes: {}", e);
                tracing::error!("{}", msg);
                self.error = Some(e.to_string());
                events.push(ScreenEvent::LogError(msg));
                self.loading = false;
            }
            PollResult::Complete(Err(e)) => {
                let msg = format!("Codes task panicked: {}", e);
                tracing::error!("{}", msg);
                self.error = Some(msg.clone());
                events.push(ScreenEvent::LogError(msg));
                self.loading = false;
            }
            PollResult::Pending | PollResult::NoTask => {}
        }

        events
    }
}
