//! Remote submission transport
//!
//! The [`Transport`] trait is the seam between the task queue and the ingestion
//! API: creating a job for job-based types and uploading one file as multipart
//! form data while reporting byte progress. [`HttpTransport`] implements it over
//! `reqwest`; tests substitute their own implementations.
//!
//! This module also holds the response-body handling shared by every transport:
//! [`error_message`] turns a failure body into one human-readable line and
//! [`summarize`] turns a success body into a short result summary.

use crate::classifier::DocumentType;
use crate::config::UploadConfig;
use crate::error::{Error, Result, TransportError, TransportStep};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Bytes sent so far out of the payload total
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteProgress {
    /// Bytes handed to the connection
    pub loaded: u64,
    /// Payload size
    pub total: u64,
}

/// Receives [`ByteProgress`] updates during an upload
pub type ProgressSender = mpsc::UnboundedSender<ByteProgress>;

/// One file upload
#[derive(Clone, Debug)]
pub struct UploadRequest {
    /// Upload path relative to the API base URL, job identifier already substituted
    pub path: String,
    /// File name sent with the file part
    pub file_name: String,
    /// Sent as the `document_type` form field
    pub document_type: DocumentType,
    /// File content
    pub content: Vec<u8>,
}

/// Access to the remote ingestion API
#[async_trait]
pub trait Transport: Send + Sync {
    /// Create a remote job and return its identifier
    ///
    /// # Arguments
    ///
    /// * `create_path` - Job creation path relative to the API base URL
    /// * `document_type` - Type of the document the job is for
    /// * `file_name` - Name of the file that will be uploaded to the job
    async fn create_job(
        &self,
        create_path: &str,
        document_type: DocumentType,
        file_name: &str,
    ) -> std::result::Result<String, TransportError>;

    /// Upload a file and return the (opaque) response body
    ///
    /// Implementations should send a [`ByteProgress`] on `progress` as the
    /// payload is consumed. A closed receiver is not an error.
    async fn upload(
        &self,
        request: UploadRequest,
        progress: ProgressSender,
    ) -> std::result::Result<Value, TransportError>;
}

/// [`Transport`] over HTTP
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    chunk_size: usize,
}

impl HttpTransport {
    /// Build a transport from the upload settings
    pub fn new(config: &UploadConfig) -> Result<Self> {
        url::Url::parse(&config.base_url)?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            Error::Io(std::io::Error::other(format!(
                "failed to create HTTP client: {}",
                e
            )))
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            chunk_size: config.chunk_size.max(1),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(self.url(path));
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn create_job(
        &self,
        create_path: &str,
        document_type: DocumentType,
        file_name: &str,
    ) -> std::result::Result<String, TransportError> {
        let step = TransportStep::CreateJob;
        let payload = serde_json::json!({
            "document_type": document_type.as_str(),
            "filename": file_name,
        });

        let response = self
            .post(create_path)
            .json(&payload)
            .send()
            .await
            .map_err(|e| network_error(step, &e))?;

        let body = read_response(step, response).await?;
        let job_id = job_id(&body).ok_or_else(|| TransportError::InvalidResponse {
            step,
            message: "job creation response carries no job identifier".to_string(),
        })?;

        debug!(path = create_path, job_id = %job_id, "created remote job");
        Ok(job_id)
    }

    async fn upload(
        &self,
        request: UploadRequest,
        progress: ProgressSender,
    ) -> std::result::Result<Value, TransportError> {
        let step = TransportStep::Upload;
        let content = Bytes::from(request.content);
        let len = content.len();
        let total = len as u64;
        let mime = mime_guess::from_path(&request.file_name).first_or_octet_stream();

        // chunks share the payload buffer; progress is reported as each one is
        // pulled by the connection
        let chunk_size = self.chunk_size.max(1);
        let chunks = (0..len)
            .step_by(chunk_size)
            .map(move |start| content.slice(start..(start + chunk_size).min(len)));
        let mut loaded = 0u64;
        let stream = futures::stream::iter(chunks).map(move |chunk| {
            loaded += chunk.len() as u64;
            let _ = progress.send(ByteProgress { loaded, total });
            Ok::<_, std::io::Error>(chunk)
        });

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
            .file_name(request.file_name.clone())
            .mime_str(mime.essence_str())
            .map_err(|e| TransportError::InvalidResponse {
                step,
                message: format!("invalid MIME type {}: {}", mime, e),
            })?;
        let form = Form::new()
            .part("file", part)
            .text("document_type", request.document_type.as_str());

        debug!(
            path = %request.path,
            file = %request.file_name,
            size = total,
            mime = %mime,
            "uploading file"
        );

        let response = self
            .post(&request.path)
            .multipart(form)
            .send()
            .await
            .map_err(|e| network_error(step, &e))?;

        read_response(step, response).await
    }
}

fn network_error(step: TransportStep, e: &reqwest::Error) -> TransportError {
    let message = if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    };
    warn!(?step, error = %message, "request failed");
    TransportError::Network { step, message }
}

/// Read a response, turning non-success statuses into [`TransportError::Status`]
async fn read_response(
    step: TransportStep,
    response: reqwest::Response,
) -> std::result::Result<Value, TransportError> {
    let status = response.status();
    let text = response.text().await.map_err(|e| TransportError::Network {
        step,
        message: format!("failed to read response body: {}", e),
    })?;

    if !status.is_success() {
        return Err(TransportError::Status {
            step,
            status: status.as_u16(),
            message: error_message(status.as_u16(), &text),
        });
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    // a non-JSON success body is kept verbatim
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

/// Extract the job identifier (`id` or `job_id`, string or number)
pub fn job_id(body: &Value) -> Option<String> {
    ["id", "job_id"]
        .iter()
        .filter_map(|key| body.get(key))
        .find_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Normalize a failure body into one human-readable message
///
/// Looks at `detail` (a string, or a list of `{msg}` objects joined with `"; "`),
/// then `message` and `error`, then the raw body text, and finally falls back to
/// `"HTTP {status}"`.
pub fn error_message(status: u16, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        match json.get("detail") {
            Some(Value::String(detail)) if !detail.is_empty() => return detail.clone(),
            Some(Value::Array(items)) => {
                let messages: Vec<String> = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        other => other.get("msg").and_then(Value::as_str).map(str::to_string),
                    })
                    .collect();
                if !messages.is_empty() {
                    return messages.join("; ");
                }
            }
            _ => {}
        }

        for key in ["message", "error"] {
            if let Some(Value::String(message)) = json.get(key)
                && !message.is_empty()
            {
                return message.clone();
            }
        }
    }

    let raw = body.trim();
    if raw.is_empty() {
        format!("HTTP {}", status)
    } else {
        raw.to_string()
    }
}

/// One-line summary of a success body
///
/// Counters win over the message: `imported`, then `created`, then `count`.
pub fn summarize(body: &Value) -> String {
    let counter = |key: &str| body.get(key).and_then(Value::as_u64);

    if let Some(n) = counter("imported") {
        format!("{} record importati", n)
    } else if let Some(n) = counter("created") {
        format!("{} record creati", n)
    } else if let Some(n) = counter("count") {
        format!("{} record elaborati", n)
    } else if let Some(message) = body.get("message").and_then(Value::as_str)
        && !message.is_empty()
    {
        message.to_string()
    } else {
        "Caricamento completato".to_string()
    }
}
