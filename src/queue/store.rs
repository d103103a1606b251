//! Task store: the single shared collection of upload tasks.

use crate::error::QueueError;
use crate::types::{Status, TaskId, UploadTask};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared, ordered task collection (submission order)
///
/// Every mutation replaces a task by id under the write lock: the update is
/// applied to a copy which is then written back, so readers never see a
/// half-applied change. Readers always get clones.
#[derive(Clone, Default)]
pub(crate) struct TaskStore {
    tasks: Arc<RwLock<Vec<UploadTask>>>,
}

impl TaskStore {
    pub(crate) async fn insert(&self, task: UploadTask) {
        self.tasks.write().await.push(task);
    }

    pub(crate) async fn get(&self, id: TaskId) -> Option<UploadTask> {
        self.tasks.read().await.iter().find(|t| t.id == id).cloned()
    }

    pub(crate) async fn snapshot(&self) -> Vec<UploadTask> {
        self.tasks.read().await.clone()
    }

    /// Clones of the tasks matching `predicate`
    pub(crate) async fn filter<F>(&self, predicate: F) -> Vec<UploadTask>
    where
        F: Fn(&UploadTask) -> bool,
    {
        self.tasks
            .read()
            .await
            .iter()
            .filter(|t| predicate(t))
            .cloned()
            .collect()
    }

    /// Apply `update` to the task with this id
    ///
    /// Returns `None` when the task is not in the store.
    pub(crate) async fn update<F, R>(&self, id: TaskId, update: F) -> Option<R>
    where
        F: FnOnce(&mut UploadTask) -> R,
    {
        let mut tasks = self.tasks.write().await;
        let slot = tasks.iter_mut().find(|t| t.id == id)?;
        let mut next = slot.clone();
        let result = update(&mut next);
        *slot = next;
        Some(result)
    }

    /// Move a task to `next`, applying `update` in the same step
    ///
    /// Rejects transitions the state machine does not allow.
    pub(crate) async fn transition<F>(
        &self,
        id: TaskId,
        next: Status,
        operation: &str,
        update: F,
    ) -> Result<UploadTask, QueueError>
    where
        F: FnOnce(&mut UploadTask),
    {
        let mut tasks = self.tasks.write().await;
        let slot = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(QueueError::NotFound { id })?;

        if !slot.status.can_transition_to(next) {
            return Err(QueueError::InvalidState {
                id,
                operation: operation.to_string(),
                current_state: slot.status,
            });
        }

        let mut task = slot.clone();
        task.status = next;
        update(&mut task);
        *slot = task.clone();
        Ok(task)
    }

    /// Remove a terminal task
    pub(crate) async fn remove_terminal(&self, id: TaskId) -> Result<UploadTask, QueueError> {
        let mut tasks = self.tasks.write().await;
        let index = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(QueueError::NotFound { id })?;

        if !tasks[index].status.is_terminal() {
            return Err(QueueError::InvalidState {
                id,
                operation: "remove".to_string(),
                current_state: tasks[index].status,
            });
        }

        Ok(tasks.remove(index))
    }

    /// Remove every task matching `predicate`, returning the removed ids
    pub(crate) async fn remove_where<F>(&self, predicate: F) -> Vec<TaskId>
    where
        F: Fn(&UploadTask) -> bool,
    {
        let mut tasks = self.tasks.write().await;
        let mut removed = Vec::new();
        tasks.retain(|t| {
            if predicate(t) {
                removed.push(t.id);
                false
            } else {
                true
            }
        });
        removed
    }
}
