//! Configuration types for docingest

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Archive extraction configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Maximum depth for nested containers (default: 10)
    ///
    /// The top-level container is depth 0. Containers found deeper than this
    /// are not opened and are reported as failures.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Upper bound on the total bytes extracted from one top-level container (default: 512 MiB)
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,

    /// Name suffixes to treat as containers (without leading dots)
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_total_bytes: default_max_total_bytes(),
            archive_extensions: default_archive_extensions(),
        }
    }
}

/// Remote submission configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Base URL of the ingestion API (default: "http://127.0.0.1:8000")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Optional bearer token sent with every request
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Maximum number of tasks uploading at once (default: 4)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_uploads: usize,

    /// Size of the chunks the file part is streamed in (default: 64 KiB)
    ///
    /// Progress is reported once per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Request timeout (None = transport default, no explicit timeout)
    #[serde(default, with = "optional_duration_serde")]
    pub request_timeout: Option<Duration>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_token: None,
            max_concurrent_uploads: default_max_concurrent(),
            chunk_size: default_chunk_size(),
            request_timeout: None,
        }
    }
}

/// Notification feed configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Time after which a notification expires (default: 5 seconds)
    #[serde(default = "default_notification_ttl", with = "duration_serde")]
    pub ttl: Duration,

    /// Maximum number of notifications retained; oldest are dropped first (default: 100)
    #[serde(default = "default_notification_capacity")]
    pub capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            ttl: default_notification_ttl(),
            capacity: default_notification_capacity(),
        }
    }
}

/// Main configuration for [`Ingestor`](crate::Ingestor)
///
/// Fields are organized into sub-configs:
/// - [`extraction`](ExtractionConfig): container handling limits
/// - [`upload`](UploadConfig): remote API, concurrency, streaming
/// - [`notifications`](NotificationConfig): feed expiry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Archive extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Remote submission settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Notification feed settings
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Event broadcast channel capacity (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig::default(),
            upload: UploadConfig::default(),
            notifications: NotificationConfig::default(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Config {
    /// Check settings that would otherwise fail later at runtime
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.upload.base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL '{}': {}", self.upload.base_url, e),
            key: Some("base_url".to_string()),
        })?;

        if self.upload.max_concurrent_uploads == 0 {
            return Err(Error::Config {
                message: "max_concurrent_uploads must be at least 1".to_string(),
                key: Some("max_concurrent_uploads".to_string()),
            });
        }

        if self.upload.chunk_size == 0 {
            return Err(Error::Config {
                message: "chunk_size must be at least 1".to_string(),
                key: Some("chunk_size".to_string()),
            });
        }

        if self.event_buffer == 0 {
            return Err(Error::Config {
                message: "event_buffer must be at least 1".to_string(),
                key: Some("event_buffer".to_string()),
            });
        }

        Ok(())
    }
}

// Default value functions
fn default_max_depth() -> u32 {
    10
}

fn default_max_total_bytes() -> u64 {
    512 * 1024 * 1024
}

fn default_archive_extensions() -> Vec<String> {
    vec![
        "zip".into(),
        "7z".into(),
        "tar".into(),
        "tgz".into(),
        "tar.gz".into(),
    ]
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_max_concurrent() -> usize {
    4
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_notification_ttl() -> Duration {
    Duration::from_secs(5)
}

fn default_notification_capacity() -> usize {
    100
}

fn default_event_buffer() -> usize {
    1000
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
