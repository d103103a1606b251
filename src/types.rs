//! Core types for docingest

use crate::classifier::DocumentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for an upload task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Unique identifier for a notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub u64);

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload task status
///
/// The only legal path is `Pending -> Uploading -> {Completed | Error}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Queued, not yet dispatched
    Pending,
    /// Transfer in flight
    Uploading,
    /// Successfully completed
    Completed,
    /// Failed (including duplicates and cancellations, see [`FailureKind`])
    Error,
}

impl Status {
    /// Whether the task has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Error)
    }

    /// Whether the task is still queued or in flight
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether moving from `self` to `next` follows the state machine
    pub fn can_transition_to(&self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Pending, Status::Uploading)
                | (Status::Uploading, Status::Completed)
                | (Status::Uploading, Status::Error)
        )
    }
}

/// Why a task ended in [`Status::Error`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Document already ingested (HTTP 409 or duplicate message); non-fatal
    Duplicate,
    /// The job resource could not be created (job-based protocol)
    JobCreation,
    /// The server rejected the file upload
    Upload,
    /// Network/connection failure
    Transport,
    /// Cancelled by the caller or by shutdown
    Cancelled,
}

/// Successful upload result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    /// One-line summary synthesized from the response body
    pub summary: String,
    /// Raw response body (opaque)
    pub body: serde_json::Value,
}

/// One unit of work: the transfer of a single file to a single endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadTask {
    /// Task ID
    pub id: TaskId,
    /// Display name (usually the file name)
    pub name: String,
    /// Document type the file is submitted as
    pub document_type: DocumentType,
    /// Current status
    pub status: Status,
    /// Progress percentage (0 to 100)
    pub progress: u8,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the transfer was dispatched
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status
    pub finished_at: Option<DateTime<Utc>>,
    /// Upload path the file is sent to
    pub endpoint: String,
    /// Payload size in bytes
    pub size_bytes: u64,
    /// Result on success
    pub result: Option<UploadResult>,
    /// Human-readable error message on failure
    pub error: Option<String>,
    /// Failure classification on failure
    pub failure: Option<FailureKind>,
}

impl UploadTask {
    /// Whether this task ended as a duplicate
    pub fn is_duplicate(&self) -> bool {
        self.failure == Some(FailureKind::Duplicate)
    }
}

/// Final outcome of a task, delivered through its [`TaskHandle`](crate::queue::TaskHandle)
#[derive(Clone, Debug, PartialEq)]
pub enum TaskOutcome {
    /// Upload succeeded
    Completed(UploadResult),
    /// Document was already present remotely
    Duplicate {
        /// Message stored on the task
        message: String,
    },
    /// Upload failed
    Failed {
        /// Failure classification
        kind: FailureKind,
        /// Message stored on the task
        message: String,
    },
}

/// Content category inferred from a file suffix
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    /// XML (electronic invoices, SEPA/CBI flows)
    Xml,
    /// PDF
    Pdf,
    /// Comma/semicolon separated values
    Csv,
    /// Excel/OpenDocument spreadsheet
    Spreadsheet,
    /// Anything else
    Other,
}

impl ContentCategory {
    /// Infer the category from a file name (case-insensitive)
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        match lower.rsplit_once('.').map(|(_, ext)| ext) {
            Some("xml") => ContentCategory::Xml,
            Some("pdf") => ContentCategory::Pdf,
            Some("csv") => ContentCategory::Csv,
            Some("xlsx" | "xls" | "xlsm" | "ods") => ContentCategory::Spreadsheet,
            _ => ContentCategory::Other,
        }
    }
}

/// Container format detected by file name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    /// ZIP archive (.zip)
    Zip,
    /// 7-Zip archive (.7z)
    SevenZip,
    /// Uncompressed tarball (.tar)
    Tar,
    /// Gzip-compressed tarball (.tar.gz, .tgz)
    TarGz,
}

/// A file handed to the pipeline by the caller, container or not
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingFile {
    /// File name as provided by the caller (may include directories)
    pub name: String,
    /// File content
    pub content: Vec<u8>,
}

impl IncomingFile {
    /// Create an incoming file
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// A leaf file produced by the extractor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Leaf name, directory components removed
    pub name: String,
    /// File content
    pub content: Vec<u8>,
    /// Category inferred from the suffix
    pub category: ContentCategory,
}

impl ExtractedFile {
    /// Build an extracted file, inferring its category from `name`
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        let name = name.into();
        let category = ContentCategory::from_name(&name);
        Self {
            name,
            content,
            category,
        }
    }
}

/// Aggregate counts over the task store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// All tasks currently in the store
    pub total: usize,
    /// Pending or uploading
    pub active: usize,
    /// Completed
    pub completed: usize,
    /// Ended as duplicates (not counted in `errors`)
    pub duplicates: usize,
    /// Ended in error for any reason other than duplicate
    pub errors: usize,
}

/// Notification kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Task completed
    Success,
    /// Task failed
    Error,
}

/// Ephemeral record of a task outcome
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification ID
    pub id: NotificationId,
    /// Success or error
    pub kind: NotificationKind,
    /// Short title
    pub title: String,
    /// Message body
    pub message: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Originating task, if any
    pub task_id: Option<TaskId>,
}

/// Event emitted during the task lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task created in Pending
    Queued {
        /// Task ID
        id: TaskId,
        /// Display name
        name: String,
        /// Document type
        document_type: DocumentType,
    },

    /// Transfer dispatched
    UploadStarted {
        /// Task ID
        id: TaskId,
        /// Upload path
        endpoint: String,
    },

    /// Remote job created (job-based protocol)
    JobCreated {
        /// Task ID
        id: TaskId,
        /// Remote job identifier
        job_id: String,
    },

    /// Progress update
    Progress {
        /// Task ID
        id: TaskId,
        /// Progress percentage (10 to 90 while uploading)
        percent: u8,
    },

    /// Task completed
    TaskCompleted {
        /// Task ID
        id: TaskId,
        /// Result summary
        summary: String,
    },

    /// Task failed (including duplicates)
    TaskFailed {
        /// Task ID
        id: TaskId,
        /// Failure classification
        kind: FailureKind,
        /// Error message
        error: String,
    },

    /// Task removed from the store
    Removed {
        /// Task ID
        id: TaskId,
    },

    /// Notification raised
    Notified {
        /// The notification
        notification: Notification,
    },

    /// Notification expired or dismissed
    NotificationDismissed {
        /// Notification ID
        id: NotificationId,
    },
}

impl Event {
    /// The task this event refers to, if any
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Event::Queued { id, .. }
            | Event::UploadStarted { id, .. }
            | Event::JobCreated { id, .. }
            | Event::Progress { id, .. }
            | Event::TaskCompleted { id, .. }
            | Event::TaskFailed { id, .. }
            | Event::Removed { id } => Some(*id),
            Event::Notified { notification } => notification.task_id,
            Event::NotificationDismissed { .. } => None,
        }
    }
}
