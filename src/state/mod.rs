//! Screen state modules
//!
//! Each state struct owns its background task and a poll method. Poll methods
//! report what happened as `ScreenEvent`s instead of reaching into the screen.

mod codes;
mod submission;

pub use codes::CodesState;
pub use submission::SubmissionController;

/// Events that poll methods return.
/// These communicate results back to the screen owner without direct mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenEvent {
    /// The status channel completed its handshake and subscribed
    Connected,

    /// The status channel handshake failed; no status will arrive
    ConnectionFailed(String),

    /// Status updates stopped after the handshake (broker error or closed transport)
    ChannelClosed(String),

    /// A pushed status replaced the displayed one
    StatusChanged(String),

    /// A certification request was sent
    SubmissionDispatched,

    /// The certification request failed; carries the failure detail
    SubmissionFailed(String),

    /// The code list finished loading
    CodesLoaded(usize),

    /// Log an info message
    LogInfo(String),

    /// Log an error message
    LogError(String),
}

/// What the screen displays about the submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionState {
    /// Busy indicator: set on dispatch, cleared by a failure or the next status push
    pub loading: bool,
    /// Status text: blank, the in-progress marker, or the last pushed status
    pub status: String,
}
