//! Derived views over the task store.

use crate::types::{BatchSummary, Status, TaskId, UploadTask};

use super::UploadQueue;

impl UploadQueue {
    /// Get a snapshot of one task
    pub async fn get(&self, id: TaskId) -> Option<UploadTask> {
        self.store.get(id).await
    }

    /// Snapshot of every task, in submission order
    pub async fn tasks(&self) -> Vec<UploadTask> {
        self.store.snapshot().await
    }

    /// Pending or uploading tasks
    pub async fn active(&self) -> Vec<UploadTask> {
        self.store.filter(|t| t.status.is_active()).await
    }

    /// Completed tasks
    pub async fn completed(&self) -> Vec<UploadTask> {
        self.store.filter(|t| t.status == Status::Completed).await
    }

    /// Tasks in [`Status::Error`], duplicates included
    pub async fn errored(&self) -> Vec<UploadTask> {
        self.store.filter(|t| t.status == Status::Error).await
    }

    /// Tasks that ended as duplicates (a subset of [`errored`](Self::errored))
    pub async fn duplicates(&self) -> Vec<UploadTask> {
        self.store
            .filter(|t| t.status == Status::Error && t.is_duplicate())
            .await
    }

    /// Whether any task is still pending or uploading
    pub async fn has_active_uploads(&self) -> bool {
        !self.active().await.is_empty()
    }

    /// Aggregate counts; duplicates are not counted as errors
    pub async fn summary(&self) -> BatchSummary {
        let tasks = self.store.snapshot().await;
        tasks
            .iter()
            .fold(BatchSummary::default(), |mut summary, task| {
                summary.total += 1;
                match task.status {
                    Status::Pending | Status::Uploading => summary.active += 1,
                    Status::Completed => summary.completed += 1,
                    Status::Error if task.is_duplicate() => summary.duplicates += 1,
                    Status::Error => summary.errors += 1,
                }
                summary
            })
    }
}
