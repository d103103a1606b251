//! Task control: cancel, remove, clear, shutdown.

use crate::error::{QueueError, Result};
use crate::types::{Event, Status, TaskId};
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::UploadQueue;

/// How long [`UploadQueue::shutdown`] waits for drivers to settle
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll interval while waiting for drivers during shutdown
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(50);

impl UploadQueue {
    /// Cancel a pending or uploading task
    ///
    /// The task ends in [`Status::Error`] with
    /// [`FailureKind::Cancelled`](crate::types::FailureKind::Cancelled) once its
    /// driver observes the signal; await its handle to know when.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NotFound`] if the task does not exist
    /// - [`QueueError::InvalidState`] if the task already finished
    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        let task = self.store.get(id).await.ok_or(QueueError::NotFound { id })?;
        if task.status.is_terminal() {
            return Err(QueueError::InvalidState {
                id,
                operation: "cancel".to_string(),
                current_state: task.status,
            }
            .into());
        }

        let token = self.state.active_tasks.lock().await.get(&id).cloned();
        match token {
            Some(token) => {
                tracing::info!(task_id = id.0, "cancelling upload");
                token.cancel();
                Ok(())
            }
            // the driver finished between the two reads
            None => Err(QueueError::InvalidState {
                id,
                operation: "cancel".to_string(),
                current_state: self
                    .store
                    .get(id)
                    .await
                    .map(|t| t.status)
                    .unwrap_or(Status::Error),
            }
            .into()),
        }
    }

    /// Remove a completed or failed task from the store
    ///
    /// # Errors
    ///
    /// - [`QueueError::NotFound`] if the task does not exist
    /// - [`QueueError::InvalidState`] if the task is still pending or uploading
    pub async fn remove(&self, id: TaskId) -> Result<()> {
        self.store.remove_terminal(id).await?;
        self.event_tx.send(Event::Removed { id }).ok();
        tracing::debug!(task_id = id.0, "task removed");
        Ok(())
    }

    /// Remove every completed task; returns how many were removed
    pub async fn clear_completed(&self) -> usize {
        let removed = self
            .store
            .remove_where(|t| t.status == Status::Completed)
            .await;
        self.emit_removed(&removed);
        removed.len()
    }

    /// Remove every completed or failed task; returns how many were removed
    pub async fn clear_finished(&self) -> usize {
        let removed = self.store.remove_where(|t| t.status.is_terminal()).await;
        self.emit_removed(&removed);
        removed.len()
    }

    fn emit_removed(&self, ids: &[TaskId]) {
        for id in ids {
            self.event_tx.send(Event::Removed { id: *id }).ok();
        }
        if !ids.is_empty() {
            tracing::debug!(count = ids.len(), "cleared finished tasks");
        }
    }

    /// Stop accepting submissions and cancel every unfinished task
    ///
    /// Waits (up to 30 seconds) for the drivers to record their outcome.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("shutting down upload queue");

        self.state.accepting_new.store(false, Ordering::SeqCst);
        self.state.shutdown_token.cancel();

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_drivers()).await {
            Ok(()) => tracing::info!("all uploads settled"),
            Err(_) => tracing::warn!("timeout waiting for uploads to settle"),
        }
        Ok(())
    }

    /// Whether new submissions are accepted
    pub fn is_accepting(&self) -> bool {
        self.state.accepting_new.load(Ordering::SeqCst)
    }

    async fn wait_for_drivers(&self) {
        loop {
            let remaining = self.state.active_tasks.lock().await.len();
            if remaining == 0 {
                return;
            }
            tracing::debug!(remaining, "waiting for uploads to settle");
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
    }
}
