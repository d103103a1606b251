//! # docingest
//!
//! Document ingestion pipeline for accounting back offices.
//!
//! Heterogeneous financial documents (electronic invoices, bank statements, F24
//! forms, payslips, wire transfer flows...) arrive as single files or nested
//! archives. docingest expands them, suggests a document type from each file
//! name, routes each file to the right import endpoint and drives many uploads
//! concurrently, reporting progress and outcomes as events.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Independent outcomes** - One file failing never affects another
//! - **Sensible defaults** - Works out of the box against a local API
//!
//! ## Quick Start
//!
//! ```no_run
//! use docingest::{Config, ExtensionFilter, IncomingFile, Ingestor, TaskOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.upload.base_url = "https://gestionale.example.com".to_string();
//!
//!     let ingestor = Ingestor::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = ingestor.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let archive = std::fs::read("documenti_marzo.zip")?;
//!     let batch = ingestor
//!         .prepare(vec![IncomingFile::new("documenti_marzo.zip", archive)], &ExtensionFilter::Any)
//!         .await?;
//!
//!     for candidate in batch.candidates {
//!         let handle = ingestor.submit(candidate).await?;
//!         if let TaskOutcome::Completed(result) = handle.outcome().await {
//!             println!("{}", result.summary);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Filename-based document classification
pub mod classifier;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Archive extraction
pub mod extraction;
/// Pipeline façade
pub mod ingestor;
/// Self-expiring notification feed
pub mod notifications;
/// Concurrent upload queue (decomposed into focused submodules)
pub mod queue;
/// Document type registry and endpoint resolution
pub mod registry;
/// Remote submission transport
pub mod transport;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use classifier::{DocumentType, classify};
pub use config::{Config, ExtractionConfig, NotificationConfig, UploadConfig};
pub use error::{Error, ExtractionError, QueueError, Result, TransportError};
pub use extraction::{ExtensionFilter, Extraction, Extractor};
pub use ingestor::{Candidate, Ingestor, PreparedBatch};
pub use notifications::NotificationFeed;
pub use queue::{SubmitRequest, TaskHandle, UploadQueue};
pub use registry::{Protocol, ResolvedEndpoint, resolve};
pub use transport::{HttpTransport, Transport};
pub use types::{
    BatchSummary, Event, ExtractedFile, FailureKind, IncomingFile, Notification,
    NotificationKind, Status, TaskId, TaskOutcome, UploadResult, UploadTask,
};

/// Helper function to run the pipeline until a termination signal arrives.
///
/// Waits for SIGTERM/SIGINT (Ctrl+C elsewhere) and then calls the ingestor's
/// `shutdown()` method, cancelling unfinished uploads.
///
/// # Example
///
/// ```no_run
/// use docingest::{Config, Ingestor, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let ingestor = Ingestor::new(Config::default())?;
///
///     // hand clones of `ingestor` to whatever feeds it files, then:
///     run_with_shutdown(ingestor).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(ingestor: Ingestor) -> Result<()> {
    wait_for_signal().await;
    ingestor.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration may fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
