//! Consultant period screen.
//!
//! Ties the status channel, the submission controller and the form together:
//!
//! - a period edit (deduplicated) on a valid form resets the status to the
//!   in-progress marker
//! - submit forwards the form to the submission controller
//! - each pushed status replaces the displayed one and ends the busy indicator
//! - outside clicks and navigation clear the notification
//! - destroying the screen disconnects the channel exactly once
//!
//! The screen is driven from a single loop that calls [`ConsultantPeriodScreen::poll`].

use chrono::NaiveDate;

use crate::channel::{ChannelEvent, ConnectionState, StatusChannel};
use crate::config::Config;
use crate::form::{CertificationForm, DistinctChanges};
use crate::notification::{ClickTarget, Dismissal, Notifications};
use crate::service::{Budget, CertificationService};
use crate::state::{CodesState, ScreenEvent, SubmissionController, SubmissionState};
use crate::transport::Transport;

/// Settings the screen needs from the configuration
#[derive(Debug, Clone)]
pub struct ScreenSettings {
    pub topic: String,
    pub connect_headers: Vec<(String, String)>,
    pub in_progress_status: String,
    pub service_unavailable_message: String,
    pub first_day_only: bool,
}

impl Default for ScreenSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ScreenSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            topic: config.broker.topic.clone(),
            connect_headers: config.broker.connect_headers(),
            in_progress_status: config.screen.in_progress_status.clone(),
            service_unavailable_message: config.screen.service_unavailable_message.clone(),
            first_day_only: config.screen.first_day_only,
        }
    }
}

pub struct ConsultantPeriodScreen<S: CertificationService> {
    form: CertificationForm,
    /// Period change subscription
    periodo_changes: DistinctChanges<Option<NaiveDate>>,
    state: SubmissionState,
    /// Status subscription; `None` once the screen is destroyed
    channel: Option<StatusChannel>,
    submission: SubmissionController<S>,
    codes: CodesState,
    dismissal: Dismissal,
    notifications: Notifications,
}

impl<S: CertificationService> ConsultantPeriodScreen<S> {
    /// Open the screen: connect the status channel and start loading the code list
    pub fn open<T: Transport>(
        transport: T,
        service: S,
        notifications: Notifications,
        settings: ScreenSettings,
    ) -> Self {
        let channel =
            StatusChannel::connect(transport, settings.topic.clone(), settings.connect_headers);

        let mut codes = CodesState::default();
        codes.fetch(&service);

        let submission = SubmissionController::new(
            service,
            notifications.clone(),
            settings.in_progress_status,
            settings.service_unavailable_message,
        );

        Self {
            form: CertificationForm::new(settings.first_day_only),
            periodo_changes: DistinctChanges::default(),
            state: SubmissionState::default(),
            channel: Some(channel),
            submission,
            codes,
            dismissal: Dismissal::new(notifications.clone()),
            notifications,
        }
    }

    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    pub fn form(&self) -> &CertificationForm {
        &self.form
    }

    /// Disconnected before the handshake, after a failure and once destroyed
    pub fn connection_state(&self) -> ConnectionState {
        self.channel
            .as_ref()
            .map(StatusChannel::state)
            .unwrap_or_default()
    }

    pub fn codes(&self) -> &[Budget] {
        &self.codes.budgets
    }

    /// Error from the code list fetch, if it failed
    pub fn codes_error(&self) -> Option<&str> {
        self.codes.error.as_deref()
    }

    /// Certification requests still waiting for their HTTP response
    pub fn pending_requests(&self) -> usize {
        self.submission.in_flight()
    }

    /// Last status pushed on the topic, `None` before the first push or once destroyed
    pub fn last_pushed_status(&self) -> Option<&str> {
        self.channel.as_ref().and_then(StatusChannel::last_status)
    }

    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    pub fn is_destroyed(&self) -> bool {
        self.channel.is_none()
    }

    /// Edit the period field
    pub fn set_periodo(&mut self, periodo: Option<NaiveDate>) {
        self.form.set_periodo(periodo);
        if self.periodo_changes.push(periodo)
            && self.submission.on_field_change(&self.form, &mut self.state)
        {
            tracing::debug!("Status reset to {:?}", self.state.status);
        }
    }

    /// Edit the code field
    pub fn set_codigo(&mut self, codigo: impl Into<String>) {
        self.form.set_codigo(codigo);
    }

    /// Submit the current form. Returns `None` when nothing was sent.
    pub fn submit(&mut self) -> Option<ScreenEvent> {
        if self.is_destroyed() {
            return None;
        }
        self.submission.submit(&self.form, &mut self.state)
    }

    pub fn on_click(&self, target: ClickTarget) {
        self.dismissal.on_click(target);
    }

    pub fn on_navigation(&self) {
        self.dismissal.on_navigation();
    }

    /// Apply everything that happened in the background since the last poll
    pub fn poll(&mut self) -> Vec<ScreenEvent> {
        let mut events = Vec::new();

        if let Some(channel) = self.channel.as_mut() {
            for event in channel.poll() {
                match event {
                    ChannelEvent::Connected => events.push(ScreenEvent::Connected),
                    ChannelEvent::Status(status) => {
                        self.state.status = status.status;
                        self.state.loading = false;
                        events.push(ScreenEvent::StatusChanged(self.state.status.clone()));
                    }
                    ChannelEvent::Malformed(reason) => {
                        events.push(ScreenEvent::LogError(format!(
                            "Ignored malformed status message: {}",
                            reason
                        )));
                    }
                    ChannelEvent::Failed(reason) => {
                        events.push(ScreenEvent::ConnectionFailed(reason));
                    }
                    ChannelEvent::Closed(reason) => {
                        events.push(ScreenEvent::ChannelClosed(reason));
                    }
                }
            }
        }

        events.extend(self.submission.poll(&mut self.state));
        events.extend(self.codes.poll());

        events
    }

    /// Tear the screen down: disconnect the channel and cancel the listeners.
    /// Calling it again is a no-op.
    pub fn destroy(&mut self) {
        self.periodo_changes.cancel();
        self.dismissal.cancel();
        if let Some(mut channel) = self.channel.take() {
            channel.disconnect();
            tracing::info!("Screen destroyed");
        }
    }

    /// Destroy the screen and wait until the channel session has closed
    pub async fn close(&mut self) {
        self.periodo_changes.cancel();
        self.dismissal.cancel();
        if let Some(mut channel) = self.channel.take() {
            channel.disconnect();
            channel.closed().await;
            tracing::info!("Screen closed");
        }
    }
}

impl<S: CertificationService> Drop for ConsultantPeriodScreen<S> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        MemoryBroker, ScriptedService, drain, memory_transport, rejecting_transport, settle,
    };

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    async fn connected_screen(
        service: ScriptedService,
    ) -> (MemoryBroker, ConsultantPeriodScreen<ScriptedService>, Notifications) {
        let (broker, transport) = memory_transport();
        let notifications = Notifications::new();
        let mut screen = ConsultantPeriodScreen::open(
            transport,
            service,
            notifications.clone(),
            ScreenSettings::default(),
        );
        settle(&mut screen, |s, _| {
            s.connection_state() == ConnectionState::Connected && !s.codes().is_empty()
        })
        .await;
        (broker, screen, notifications)
    }

    #[tokio::test]
    async fn test_submit_then_status_push() {
        let service = ScriptedService::accepting();
        let (broker, mut screen, _) = connected_screen(service.clone()).await;

        screen.set_periodo(date(2024, 1, 1));
        screen.set_codigo("A1");
        assert_eq!(screen.submit(), Some(ScreenEvent::SubmissionDispatched));
        assert!(screen.state().loading);

        // HTTP acceptance alone does not end loading
        let events = settle(&mut screen, |_, events| {
            events.iter().any(|e| matches!(e, ScreenEvent::LogInfo(_)))
        })
        .await;
        assert!(!events.iter().any(|e| matches!(e, ScreenEvent::SubmissionFailed(_))));
        assert!(screen.state().loading);

        broker.publish_status("Completado");
        let events = settle(&mut screen, |s, _| !s.state().loading).await;

        assert_eq!(events, vec![ScreenEvent::StatusChanged("Completado".to_string())]);
        assert_eq!(screen.state().status, "Completado");
        assert_eq!(
            service.requests()[0],
            crate::service::SubmissionRequest {
                periodo: "01/01/2024".to_string(),
                codigo: "A1".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_resubmit_after_status_push_while_request_unresolved() {
        let service = ScriptedService::accepting().with_delay(std::time::Duration::from_millis(200));
        let (broker, mut screen, _) = connected_screen(service.clone()).await;

        screen.set_codigo("A1");
        screen.set_periodo(date(2024, 1, 1));
        assert_eq!(screen.submit(), Some(ScreenEvent::SubmissionDispatched));

        broker.publish_status("Completado");
        settle(&mut screen, |s, _| !s.state().loading).await;
        assert_eq!(screen.pending_requests(), 1);
        assert_eq!(screen.last_pushed_status(), Some("Completado"));

        screen.set_codigo("B2");
        assert_eq!(screen.submit(), Some(ScreenEvent::SubmissionDispatched));
        assert!(screen.state().loading);

        settle(&mut screen, |s, _| s.pending_requests() == 0).await;
        let codes: Vec<String> = service.requests().into_iter().map(|r| r.codigo).collect();
        assert_eq!(codes, vec!["A1".to_string(), "B2".to_string()]);
    }

    #[tokio::test]
    async fn test_submit_with_empty_codigo_is_noop() {
        let service = ScriptedService::accepting();
        let (_broker, mut screen, _) = connected_screen(service.clone()).await;

        screen.set_periodo(date(2024, 1, 1));
        screen.set_codigo("");
        assert_eq!(screen.submit(), None);
        assert!(!screen.state().loading);

        drain(&mut screen).await;
        assert!(service.requests().is_empty());
        assert!(!screen.state().loading);
    }

    #[tokio::test]
    async fn test_endpoint_rejection() {
        let (_broker, mut screen, notifications) =
            connected_screen(ScriptedService::rejecting()).await;

        screen.set_codigo("A1");
        screen.set_periodo(date(2024, 1, 1));
        assert_eq!(screen.state().status, "En curso");
        screen.submit();
        assert!(screen.state().loading);

        let events = settle(&mut screen, |s, _| !s.state().loading).await;
        assert_eq!(notifications.current().as_deref(), Some("Service unavailable"));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ScreenEvent::SubmissionFailed(_)))
                .count(),
            1
        );
        // A failed submission does not clear the in-progress status
        assert_eq!(screen.state().status, "En curso");
    }

    #[tokio::test]
    async fn test_period_edit_resets_status_only_when_valid() {
        let (broker, mut screen, _) = connected_screen(ScriptedService::accepting()).await;

        broker.publish_status("Completado");
        settle(&mut screen, |s, _| s.state().status == "Completado").await;

        // Code still empty: edit leaves status alone
        screen.set_periodo(date(2024, 2, 1));
        assert_eq!(screen.state().status, "Completado");

        // Code edits do not trigger a reset by themselves
        screen.set_codigo("A1");
        assert_eq!(screen.state().status, "Completado");

        // Same period again is deduplicated
        screen.set_periodo(date(2024, 2, 1));
        assert_eq!(screen.state().status, "Completado");

        screen.set_periodo(date(2024, 3, 1));
        assert_eq!(screen.state().status, "En curso");
        assert!(!screen.state().loading);

        // Mid-month period is invalid: status unchanged
        broker.publish_status("Error");
        settle(&mut screen, |s, _| s.state().status == "Error").await;
        screen.set_periodo(date(2024, 3, 15));
        assert_eq!(screen.state().status, "Error");
    }

    #[tokio::test]
    async fn test_status_while_idle_updates_status() {
        let (broker, mut screen, _) = connected_screen(ScriptedService::accepting()).await;

        broker.publish_status("Procesando");
        let events = settle(&mut screen, |s, _| s.state().status == "Procesando").await;
        assert_eq!(events, vec![ScreenEvent::StatusChanged("Procesando".to_string())]);
        assert!(!screen.state().loading);
    }

    #[tokio::test]
    async fn test_no_updates_after_destroy() {
        let (broker, mut screen, _) = connected_screen(ScriptedService::accepting()).await;

        screen.set_codigo("A1");
        screen.set_periodo(date(2024, 1, 1));
        screen.submit();
        screen.destroy();
        assert!(screen.is_destroyed());
        assert_eq!(screen.connection_state(), ConnectionState::Disconnected);

        broker.publish_status("Tarde");
        let events = drain(&mut screen).await;
        assert!(!events.iter().any(|e| matches!(e, ScreenEvent::StatusChanged(_))));
        assert_eq!(screen.state().status, "En curso");

        // Field subscription is cancelled too
        screen.set_periodo(date(2024, 5, 1));
        assert_eq!(screen.state().status, "En curso");

        assert_eq!(broker.log().last().map(String::as_str), Some("DISCONNECT"));

        // Destroying twice disconnects once
        screen.destroy();
        let disconnects = broker.log().iter().filter(|l| *l == "DISCONNECT").count();
        assert_eq!(disconnects, 1);
    }

    #[tokio::test]
    async fn test_close_waits_for_disconnect() {
        let (broker, mut screen, _) = connected_screen(ScriptedService::accepting()).await;
        screen.close().await;
        assert_eq!(broker.log().last().map(String::as_str), Some("DISCONNECT"));
        assert_eq!(screen.submit(), None);
    }

    #[tokio::test]
    async fn test_handshake_failure_reported() {
        let (_broker, transport) = rejecting_transport("no broker");
        let mut screen = ConsultantPeriodScreen::open(
            transport,
            ScriptedService::accepting(),
            Notifications::new(),
            ScreenSettings::default(),
        );

        let events = settle(&mut screen, |_, events| {
            events
                .iter()
                .any(|e| matches!(e, ScreenEvent::ConnectionFailed(_)))
        })
        .await;
        assert!(events.iter().any(
            |e| matches!(e, ScreenEvent::ConnectionFailed(msg) if msg.contains("no broker"))
        ));
        assert_eq!(screen.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_dismissal_clears_notification() {
        let (_broker, screen, notifications) =
            connected_screen(ScriptedService::accepting()).await;

        notifications.set("Service unavailable");
        screen.on_click(ClickTarget::Notification);
        assert!(notifications.current().is_some());
        screen.on_click(ClickTarget::Elsewhere);
        assert!(notifications.current().is_none());

        notifications.set("Service unavailable");
        screen.on_navigation();
        assert!(notifications.current().is_none());
    }
}
