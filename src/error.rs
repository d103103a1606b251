//! Error types for docingest
//!
//! This module provides the error handling for the library:
//! - A crate-wide [`Error`] with `#[from]` conversions
//! - Domain-specific error types (extraction, transport, queue)
//! - Duplicate/conflict detection for remote failures

use crate::types::{Status, TaskId};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Result type alias for docingest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for docingest
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "base_url")
        key: Option<String>,
    },

    /// Archive extraction error
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Remote submission error
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Task queue error
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid URL
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new submissions
    #[error("shutdown in progress: not accepting new uploads")]
    ShuttingDown,
}

/// Archive extraction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// Container could not be opened or one of its entries could not be read
    #[error("failed to read container {container}: {reason}")]
    Corrupt {
        /// Name of the container (leaf name as seen by the walk)
        container: String,
        /// The reason the container could not be read
        reason: String,
    },

    /// Container nested deeper than the configured maximum
    #[error("container {container} exceeds maximum nesting depth {max_depth}")]
    DepthExceeded {
        /// Name of the container that was not opened
        container: String,
        /// Configured maximum depth
        max_depth: u32,
    },

    /// Extracted content exceeds the configured byte budget
    #[error("extracted content exceeds limit of {limit} bytes")]
    TooLarge {
        /// Configured byte limit
        limit: u64,
    },

    /// File is not a supported container
    #[error("unsupported container type: {0}")]
    UnsupportedContainer(String),

    /// Extraction was cancelled
    #[error("extraction cancelled")]
    Cancelled,
}

/// Which step of a submission failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStep {
    /// Creating the remote job (job-based protocol only)
    CreateJob,
    /// Uploading the file
    Upload,
}

/// Errors returned by a [`Transport`](crate::transport::Transport)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server answered with a non-success status
    #[error("server returned {status}: {message}")]
    Status {
        /// Step that failed
        step: TransportStep,
        /// HTTP status code
        status: u16,
        /// Normalized, human-readable message
        message: String,
    },

    /// Connection, timeout or body I/O failure
    #[error("request failed: {message}")]
    Network {
        /// Step that failed
        step: TransportStep,
        /// Normalized, human-readable message
        message: String,
    },

    /// The response body could not be understood
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// Step that failed
        step: TransportStep,
        /// What was wrong with the body
        message: String,
    },
}

impl TransportError {
    /// The step that failed
    pub fn step(&self) -> TransportStep {
        match self {
            TransportError::Status { step, .. }
            | TransportError::Network { step, .. }
            | TransportError::InvalidResponse { step, .. } => *step,
        }
    }

    /// HTTP status, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The normalized message, without the variant prefix
    pub fn message(&self) -> &str {
        match self {
            TransportError::Status { message, .. }
            | TransportError::Network { message, .. }
            | TransportError::InvalidResponse { message, .. } => message,
        }
    }

    /// Whether this failure means the document was already ingested
    ///
    /// HTTP 409, or a message mentioning a duplicate ("duplicat", "esiste già").
    pub fn is_duplicate(&self) -> bool {
        self.status() == Some(409) || is_duplicate_message(self.message())
    }
}

/// Check whether a server message signals a duplicate/conflict outcome
pub fn is_duplicate_message(message: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"(?i)duplicat|esiste gi(à|a')").ok());
    match pattern {
        Some(re) => re.is_match(message),
        None => {
            let lower = message.to_lowercase();
            lower.contains("duplicat") || lower.contains("esiste già")
        }
    }
}

/// Task queue errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Task not found in the store
    #[error("task {id} not found")]
    NotFound {
        /// The task ID that was not found
        id: TaskId,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} task {id} in state {current_state:?}")]
    InvalidState {
        /// The task ID that is in an invalid state for the operation
        id: TaskId,
        /// The operation that was attempted (e.g., "remove", "cancel")
        operation: String,
        /// The current state that prevents the operation
        current_state: Status,
    },
}
