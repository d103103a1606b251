//! Pipeline façade
//!
//! [`Ingestor`] wires the pieces together: incoming files are expanded by the
//! [`Extractor`], each leaf gets a suggested [`DocumentType`] and endpoint, and
//! the caller submits the candidates (optionally overriding the type) to the
//! [`UploadQueue`].

use crate::classifier::{DocumentType, classify};
use crate::config::Config;
use crate::error::{ExtractionError, Result};
use crate::extraction::{ExtensionFilter, Extractor};
use crate::notifications::NotificationFeed;
use crate::queue::{SubmitRequest, TaskHandle, UploadQueue};
use crate::registry::{self, ResolvedEndpoint};
use crate::transport::{HttpTransport, Transport};
use crate::types::{Event, ExtractedFile, IncomingFile};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// A leaf file ready to be submitted, with its suggested routing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// The file
    pub file: ExtractedFile,
    /// Type suggested by the classifier
    pub document_type: DocumentType,
    /// Where the suggested type routes this file
    pub endpoint: ResolvedEndpoint,
}

impl Candidate {
    /// Classify and route a leaf file
    pub fn new(file: ExtractedFile) -> Self {
        let document_type = classify(&file.name);
        Self::with_type(file, document_type)
    }

    /// Route a leaf file as `document_type`, ignoring the classifier
    ///
    /// A file whose extension the type's endpoint does not accept is still
    /// routed there, with a warning.
    pub fn with_type(file: ExtractedFile, document_type: DocumentType) -> Self {
        let endpoint = registry::resolve(document_type, &file.name);
        let candidate = Self {
            file,
            document_type,
            endpoint,
        };
        if !candidate.is_accepted() {
            tracing::warn!(
                file = %candidate.file.name,
                document_type = %document_type,
                endpoint = candidate.endpoint.upload_path,
                "file extension not accepted by the target endpoint"
            );
        }
        candidate
    }

    /// Whether the endpoint's parser accepts this file's extension
    pub fn is_accepted(&self) -> bool {
        registry::descriptor(self.document_type).accepts(&self.file.name)
    }

    /// Replace the suggested type, re-resolving the endpoint
    pub fn override_type(self, document_type: DocumentType) -> Self {
        Self::with_type(self.file, document_type)
    }

    /// Turn the candidate into a queue submission
    pub fn into_request(self) -> SubmitRequest {
        SubmitRequest::from_extracted(self.file, self.document_type)
    }
}

/// Candidates produced from one batch of incoming files
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PreparedBatch {
    /// Leaf files in extraction order
    pub candidates: Vec<Candidate>,
    /// Containers that could not be expanded
    pub failures: Vec<ExtractionError>,
}

/// Document ingestion pipeline (cloneable - all fields are Arc-wrapped)
#[derive(Clone, Debug)]
pub struct Ingestor {
    config: Arc<Config>,
    extractor: Extractor,
    queue: UploadQueue,
    notifications: NotificationFeed,
    event_tx: broadcast::Sender<Event>,
}

impl Ingestor {
    /// Create a pipeline uploading over HTTP to `config.upload.base_url`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) when the configuration is
    /// invalid, or an I/O error if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config.upload)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a pipeline with a custom transport
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(config.event_buffer);
        let notifications = NotificationFeed::new(config.notifications.clone(), event_tx.clone());
        let queue = UploadQueue::new(
            &config.upload,
            transport,
            notifications.clone(),
            event_tx.clone(),
        );

        tracing::info!(
            base_url = %config.upload.base_url,
            max_concurrent_uploads = config.upload.max_concurrent_uploads,
            "ingestion pipeline ready"
        );

        Ok(Self {
            extractor: Extractor::new(config.extraction.clone()),
            config: Arc::new(config),
            queue,
            notifications,
            event_tx,
        })
    }

    /// Expand incoming files and suggest a type and endpoint for each leaf
    ///
    /// Containers are extracted (nested ones included); plain files pass through.
    /// Nothing is uploaded yet.
    pub async fn prepare(
        &self,
        files: Vec<IncomingFile>,
        filter: &ExtensionFilter,
    ) -> Result<PreparedBatch> {
        self.prepare_with_cancel(files, filter, &CancellationToken::new())
            .await
    }

    /// Same as [`prepare`](Self::prepare), stopping early when `cancel` fires
    pub async fn prepare_with_cancel(
        &self,
        files: Vec<IncomingFile>,
        filter: &ExtensionFilter,
        cancel: &CancellationToken,
    ) -> Result<PreparedBatch> {
        let extraction = self
            .extractor
            .expand_incoming(files, filter, cancel)
            .await?;

        let candidates: Vec<Candidate> = extraction.files.into_iter().map(Candidate::new).collect();
        tracing::debug!(
            candidates = candidates.len(),
            failures = extraction.failures.len(),
            "batch prepared"
        );

        Ok(PreparedBatch {
            candidates,
            failures: extraction.failures,
        })
    }

    /// Submit one candidate
    pub async fn submit(&self, candidate: Candidate) -> Result<TaskHandle> {
        self.queue.submit(candidate.into_request()).await
    }

    /// Submit every candidate, in order
    pub async fn submit_all(&self, candidates: Vec<Candidate>) -> Result<Vec<TaskHandle>> {
        let mut handles = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            handles.push(self.submit(candidate).await?);
        }
        Ok(handles)
    }

    /// Prepare and submit in one step
    ///
    /// With `document_type` set, every leaf is submitted as that type instead of
    /// the classifier's suggestion. Returns the handles and the containers that
    /// could not be expanded.
    ///
    /// # Example
    /// ```no_run
    /// use docingest::{Config, ExtensionFilter, IncomingFile, Ingestor};
    ///
    /// # async fn example(zip_bytes: Vec<u8>) -> docingest::Result<()> {
    /// let ingestor = Ingestor::new(Config::default())?;
    /// let (handles, _failures) = ingestor
    ///     .ingest(
    ///         vec![IncomingFile::new("documenti.zip", zip_bytes)],
    ///         &ExtensionFilter::Any,
    ///         None,
    ///     )
    ///     .await?;
    /// for handle in handles {
    ///     println!("{:?}", handle.outcome().await);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn ingest(
        &self,
        files: Vec<IncomingFile>,
        filter: &ExtensionFilter,
        document_type: Option<DocumentType>,
    ) -> Result<(Vec<TaskHandle>, Vec<ExtractionError>)> {
        let batch = self.prepare(files, filter).await?;
        let candidates = match document_type {
            Some(document_type) => batch
                .candidates
                .into_iter()
                .map(|c| c.override_type(document_type))
                .collect(),
            None => batch.candidates,
        };
        let handles = self.submit_all(candidates).await?;
        Ok((handles, batch.failures))
    }

    /// Subscribe to task and notification events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The upload queue (views, removal, cancellation)
    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    /// The notification feed
    pub fn notifications(&self) -> &NotificationFeed {
        &self.notifications
    }

    /// The configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop accepting uploads and cancel unfinished ones
    pub async fn shutdown(&self) -> Result<()> {
        self.queue.shutdown().await
    }
}
