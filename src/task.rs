//! Task polling utilities
//!
//! Background requests run as tokio tasks; the screen loop checks on them
//! without blocking.

use futures::FutureExt;
use tokio::task::JoinHandle;

/// Result of polling a task
pub enum PollResult<T> {
    /// No task to poll (task was None)
    NoTask,
    /// Task is still running
    Pending,
    /// Task completed with result (may be Ok or join error)
    Complete(Result<T, tokio::task::JoinError>),
}

/// Poll an optional task handle and take its result if finished.
///
/// The handle is consumed on completion, so each result is reported once.
///
/// ```ignore
/// match poll_task(&mut self.task) {
///     PollResult::Complete(Ok(Ok(()))) => { /* request accepted */ }
///     PollResult::Complete(Ok(Err(e))) => { /* request failed */ }
///     PollResult::Complete(Err(e)) => { /* task panicked */ }
///     PollResult::Pending | PollResult::NoTask => {}
/// }
/// ```
pub fn poll_task<T>(task: &mut Option<JoinHandle<T>>) -> PollResult<T> {
    match task {
        None => return PollResult::NoTask,
        Some(handle) if !handle.is_finished() => return PollResult::Pending,
        Some(_) => {}
    }

    let Some(mut handle) = task.take() else {
        return PollResult::NoTask;
    };
    match (&mut handle).now_or_never() {
        Some(result) => PollResult::Complete(result),
        None => {
            // Shouldn't happen since we checked is_finished()
            tracing::warn!("Task not ready despite is_finished()");
            *task = Some(handle);
            PollResult::Pending
        }
    }
}

/// Poll every handle, returning finished results in dispatch order.
/// Unfinished handles stay in `tasks`.
pub fn poll_tasks<T>(tasks: &mut Vec<JoinHandle<T>>) -> Vec<Result<T, tokio::task::JoinError>> {
    let mut finished = Vec::new();
    let mut pending = Vec::with_capacity(tasks.len());

    for handle in tasks.drain(..) {
        let mut slot = Some(handle);
        match poll_task(&mut slot) {
            PollResult::Complete(result) => finished.push(result),
            PollResult::Pending | PollResult::NoTask => pending.extend(slot),
        }
    }

    *tasks = pending;
    finished
}
