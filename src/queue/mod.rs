//! Upload task queue split into focused submodules.
//!
//! The [`UploadQueue`] owns the task store and drives every task's state machine
//! in its own spawned driver:
//! - [`store`] - Shared task collection with replace-by-id updates
//! - [`driver`] - Per-task lifecycle (permit, job creation, upload, outcome)
//! - [`control`] - Cancel, remove, clear, shutdown
//! - [`views`] - Derived views and aggregate counts
//! - [`handle`] - Awaitable per-submission handle

mod control;
mod driver;
mod handle;
mod store;
mod views;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use driver::upload_percent;
pub use handle::TaskHandle;

use crate::classifier::DocumentType;
use crate::config::UploadConfig;
use crate::error::{Error, Result};
use crate::notifications::NotificationFeed;
use crate::registry;
use crate::transport::Transport;
use crate::types::{Event, ExtractedFile, Status, TaskId, UploadTask};
use driver::UploadTaskContext;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use store::TaskStore;
use tokio::sync::{Mutex, Semaphore, broadcast, oneshot};
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

/// A file to upload as a given document type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitRequest {
    /// File name; also selects format-specific endpoints
    pub name: String,
    /// File content
    pub content: Vec<u8>,
    /// Type the file is submitted as
    pub document_type: DocumentType,
}

impl SubmitRequest {
    /// Create a submission
    pub fn new(
        name: impl Into<String>,
        content: impl Into<Vec<u8>>,
        document_type: DocumentType,
    ) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            document_type,
        }
    }

    /// Submit an extracted file as `document_type`
    pub fn from_extracted(file: ExtractedFile, document_type: DocumentType) -> Self {
        Self {
            name: file.name,
            content: file.content,
            document_type,
        }
    }
}

/// Scheduling state shared by the queue and its drivers
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Limits how many tasks are Uploading at once
    pub(crate) concurrent_limit: Arc<Semaphore>,
    /// Cancellation token of every task that has not finished
    pub(crate) active_tasks: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
    /// Parent of every task token; cancelled on shutdown
    pub(crate) shutdown_token: CancellationToken,
    /// Cleared on shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
    next_id: Arc<AtomicU64>,
}

/// Concurrent upload queue (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct UploadQueue {
    pub(crate) store: TaskStore,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) notifications: NotificationFeed,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) state: QueueState,
}

impl std::fmt::Debug for UploadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadQueue")
            .field(
                "accepting_new",
                &self.state.accepting_new.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}

impl UploadQueue {
    /// Create a queue sending files through `transport`
    ///
    /// Terminal outcomes are reported to `notifications`; lifecycle events are
    /// broadcast on `event_tx`.
    pub fn new(
        config: &UploadConfig,
        transport: Arc<dyn Transport>,
        notifications: NotificationFeed,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            store: TaskStore::default(),
            transport,
            notifications,
            event_tx,
            state: QueueState {
                concurrent_limit: Arc::new(Semaphore::new(config.max_concurrent_uploads.max(1))),
                active_tasks: Arc::new(Mutex::new(HashMap::new())),
                shutdown_token: CancellationToken::new(),
                accepting_new: Arc::new(AtomicBool::new(true)),
                next_id: Arc::new(AtomicU64::new(1)),
            },
        }
    }

    /// Queue a file for upload and start driving it
    ///
    /// The task is created in [`Status::Pending`] and returned immediately; its
    /// driver resolves the endpoint, waits for a concurrency permit and performs
    /// the transfer in the background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use docingest::*;
    /// # async fn example(queue: UploadQueue) -> Result<()> {
    /// let request = SubmitRequest::new("F24_2024.pdf", b"%PDF".to_vec(), DocumentType::TaxForm);
    /// let handle = queue.submit(request).await?;
    /// match handle.outcome().await {
    ///     TaskOutcome::Completed(result) => println!("{}", result.summary),
    ///     other => println!("{:?}", other),
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit(&self, request: SubmitRequest) -> Result<TaskHandle> {
        if !self.state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let id = TaskId(self.state.next_id.fetch_add(1, Ordering::SeqCst));
        let endpoint = registry::resolve(request.document_type, &request.name);

        let task = UploadTask {
            id,
            name: request.name.clone(),
            document_type: request.document_type,
            status: Status::Pending,
            progress: 0,
            created_at: chrono::Utc::now(),
            started_at: None,
            finished_at: None,
            endpoint: endpoint.upload_path.to_string(),
            size_bytes: request.content.len() as u64,
            result: None,
            error: None,
            failure: None,
        };
        self.store.insert(task).await;

        let cancel_token = self.state.shutdown_token.child_token();
        self.state
            .active_tasks
            .lock()
            .await
            .insert(id, cancel_token.clone());

        self.event_tx
            .send(Event::Queued {
                id,
                name: request.name.clone(),
                document_type: request.document_type,
            })
            .ok();

        tracing::info!(
            task_id = id.0,
            name = %request.name,
            document_type = %request.document_type,
            endpoint = endpoint.upload_path,
            "upload queued"
        );

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let ctx = UploadTaskContext {
            id,
            request,
            endpoint,
            queue: self.clone(),
            cancel_token,
            outcome_tx,
        };
        tokio::spawn(driver::run_upload_task(ctx));

        Ok(TaskHandle::new(id, outcome_rx))
    }

    /// Subscribe to lifecycle events of every task
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Stream of events concerning one task, from now on
    ///
    /// Events emitted before the call are not replayed.
    pub fn watch(&self, id: TaskId) -> impl Stream<Item = Event> + Send + Unpin + 'static {
        BroadcastStream::new(self.event_tx.subscribe()).filter_map(move |event| match event {
            Ok(event) if event.task_id() == Some(id) => Some(event),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(task_id = id.0, error = %e, "event stream lagged");
                None
            }
        })
    }

    /// The notification feed outcomes are reported to
    pub fn notifications(&self) -> &NotificationFeed {
        &self.notifications
    }
}
