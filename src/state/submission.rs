//! Certification request state

use tokio::task::JoinHandle;

use crate::form::CertificationForm;
use crate::notification::Notifications;
use crate::service::{CertificationService, ServiceError};
use crate::state::{ScreenEvent, SubmissionState};
use crate::task::poll_tasks;

/// Dispatches certification requests and reports their failures
pub struct SubmissionController<S: CertificationService> {
    service: S,
    notifications: Notifications,
    /// Status written when the period changes on a valid form
    in_progress_status: String,
    /// Notification shown when a request fails
    unavailable_message: String,
    /// Requests still waiting for their HTTP response, in dispatch order
    tasks: Vec<JoinHandle<Result<(), ServiceError>>>,
}

impl<S: CertificationService> SubmissionController<S> {
    pub fn new(
        service: S,
        notifications: Notifications,
        in_progress_status: impl Into<String>,
        unavailable_message: impl Into<String>,
    ) -> Self {
        Self {
            service,
            notifications,
            in_progress_status: in_progress_status.into(),
            unavailable_message: unavailable_message.into(),
            tasks: Vec::new(),
        }
    }

    /// Number of requests whose HTTP response has not arrived yet
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Submit the form.
    ///
    /// An invalid form is ignored without surfacing anything. Every valid submit
    /// is dispatched, and `state.loading` is set before this returns.
    pub fn submit(
        &mut self,
        form: &CertificationForm,
        state: &mut SubmissionState,
    ) -> Option<ScreenEvent> {
        let Some(request) = form.to_request() else {
            tracing::debug!("Submit ignored: form is invalid");
            return None;
        };

        tracing::info!(
            "Requesting certification of {} for {}",
            request.codigo,
            request.periodo
        );
        state.loading = true;

        let service = self.service.clone();
        self.tasks
            .push(tokio::spawn(async move { service.certify(request).await }));

        Some(ScreenEvent::SubmissionDispatched)
    }

    /// React to a (deduplicated) period change.
    /// Returns true when the status was reset to the in-progress marker.
    pub fn on_field_change(&self, form: &CertificationForm, state: &mut SubmissionState) -> bool {
        if form.periodo_valid() && form.codigo_valid() {
            state.status = self.in_progress_status.clone();
            true
        } else {
            false
        }
    }

    /// Poll the request tasks; each resolved request is reported once
    pub fn poll(&mut self, state: &mut SubmissionState) -> Vec<ScreenEvent> {
        let mut events = Vec::new();

        for result in poll_tasks(&mut self.tasks) {
            match result {
                Ok(Ok(())) => {
                    // Loading ends with the status push, not with the HTTP response
                    events.push(ScreenEvent::LogInfo(
                        "Certification request accepted, waiting for status".to_string(),
                    ));
                }
                Ok(Err(e)) => {
                    self.fail(state, &mut events, format!("Certification request failed: {}", e));
                }
                Err(e) => {
                    self.fail(state, &mut events, format!("Certification task panicked: {}", e));
                }
            }
        }

        events
    }

    fn fail(&self, state: &mut SubmissionState, events: &mut Vec<ScreenEvent>, msg: String) {
        tracing::error!("{}", msg);
        self.notifications.set(self.unavailable_message.clone());
        state.loading = false;
        events.push(ScreenEvent::LogError(msg.clone()));
        events.push(ScreenEvent::SubmissionFailed(msg));
    }
}
