//! Per-submission handle.

use crate::types::{FailureKind, TaskId, TaskOutcome};
use tokio::sync::oneshot;

/// Handle to a submitted task
///
/// Dropping the handle does not cancel the task; use
/// [`UploadQueue::cancel`](super::UploadQueue::cancel) for that.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    outcome: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId, outcome: oneshot::Receiver<TaskOutcome>) -> Self {
        Self { id, outcome }
    }

    /// The task's id in the queue
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Wait for the task to reach a terminal status
    pub async fn outcome(self) -> TaskOutcome {
        match self.outcome.await {
            Ok(outcome) => outcome,
            // the driver only drops the sender when the task vanished before dispatch
            Err(_) => TaskOutcome::Failed {
                kind: FailureKind::Cancelled,
                message: "task driver stopped".to_string(),
            },
        }
    }
}
