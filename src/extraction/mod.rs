//! Archive extraction
//!
//! Expands containers (ZIP, 7z, TAR, gzip TAR) held in memory into a flat, ordered
//! list of leaf files. Nested containers are expanded depth-first with an explicit
//! worklist, so a nested container's files appear contiguously where the container
//! sat among its siblings. Nesting depth and total extracted bytes are bounded by
//! [`ExtractionConfig`].
//!
//! Unreadable containers do not abort the walk: each one is logged and reported in
//! [`Extraction::failures`], and extraction continues with the remaining entries.

mod sevenz;
mod shared;
mod tar;
mod zip;


// Re-exports
pub use shared::{detect_archive_type, is_archive, leaf_name};

use crate::config::ExtractionConfig;
use crate::error::{ExtractionError, Result};
use crate::types::{ExtractedFile, IncomingFile};
use shared::{ByteBudget, read_container};
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which leaf files to keep
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ExtensionFilter {
    /// Keep every leaf file
    #[default]
    Any,
    /// Keep files whose name ends with one of these suffixes (lower-case, no leading dot)
    Suffixes(Vec<String>),
}

impl ExtensionFilter {
    /// Build a suffix filter; suffixes are matched case-insensitively, with or without a leading dot
    ///
    /// # Example
    ///
    /// ```
    /// use docingest::extraction::ExtensionFilter;
    ///
    /// let filter = ExtensionFilter::suffixes([".XML", "pdf"]);
    /// assert!(filter.matches("fattura.xml"));
    /// assert!(filter.matches("F24.PDF"));
    /// assert!(!filter.matches("notes.txt"));
    /// ```
    pub fn suffixes<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ExtensionFilter::Suffixes(
            suffixes
                .into_iter()
                .map(|s| s.as_ref().trim_start_matches('.').to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    /// Whether a file name passes the filter
    pub fn matches(&self, name: &str) -> bool {
        match self {
            ExtensionFilter::Any => true,
            ExtensionFilter::Suffixes(suffixes) => {
                let lower = name.to_lowercase();
                suffixes
                    .iter()
                    .any(|suffix| lower.ends_with(&format!(".{suffix}")))
            }
        }
    }
}

/// Result of expanding one or more containers
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Leaf files, in depth-first order
    pub files: Vec<ExtractedFile>,
    /// Containers that could not be expanded (corrupt, too deep, unsupported)
    pub failures: Vec<ExtractionError>,
}

impl Extraction {
    /// True when every container was expanded
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn append(&mut self, other: Extraction) {
        self.files.extend(other.files);
        self.failures.extend(other.failures);
    }
}

/// Pending step of the depth-first walk
struct WorkItem {
    /// Path as seen from the top-level container, for logging
    path: String,
    content: Vec<u8>,
    depth: u32,
}

/// Container extractor
#[derive(Clone, Debug, Default)]
pub struct Extractor {
    config: ExtractionConfig,
}

impl Extractor {
    /// Create an extractor with the given limits
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// The configuration in use
    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Whether `name` is treated as a container
    pub fn is_container(&self, name: &str) -> bool {
        is_archive(name, &self.config.archive_extensions)
    }

    /// Expand a container into its matching leaf files
    ///
    /// # Arguments
    /// * `name` - Container file name; its suffix selects the format
    /// * `content` - Container bytes
    /// * `filter` - Which leaf files to keep
    ///
    /// # Returns
    /// * `Ok(Extraction)` - Files in depth-first order plus any per-container failures.
    ///   A corrupt top-level container yields no files and one failure.
    /// * `Err(Error)` - The name is not a supported container, the byte budget was
    ///   exceeded, or the walk was cancelled
    ///
    /// # Example
    /// ```no_run
    /// use docingest::extraction::{ExtensionFilter, Extractor};
    ///
    /// # async fn example(bytes: Vec<u8>) -> docingest::Result<()> {
    /// let extractor = Extractor::default();
    /// let extraction = extractor
    ///     .extract("documenti.zip", bytes, &ExtensionFilter::Any)
    ///     .await?;
    /// println!("{} files", extraction.files.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn extract(
        &self,
        name: &str,
        content: Vec<u8>,
        filter: &ExtensionFilter,
    ) -> Result<Extraction> {
        self.extract_with_cancel(name, content, filter, &CancellationToken::new())
            .await
    }

    /// Same as [`extract`](Self::extract), stopping early when `cancel` fires
    pub async fn extract_with_cancel(
        &self,
        name: &str,
        content: Vec<u8>,
        filter: &ExtensionFilter,
        cancel: &CancellationToken,
    ) -> Result<Extraction> {
        if !self.is_container(name) || detect_archive_type(name).is_none() {
            return Err(ExtractionError::UnsupportedContainer(name.to_string()).into());
        }

        let mut budget = ByteBudget::new(self.config.max_total_bytes);
        let mut extraction = Extraction::default();
        let mut stack = vec![WorkItem {
            path: name.to_string(),
            content,
            depth: 0,
        }];

        while let Some(item) = stack.pop() {
            if cancel.is_cancelled() {
                info!(container = name, "extraction cancelled");
                return Err(ExtractionError::Cancelled.into());
            }

            let leaf = match leaf_name(&item.path) {
                Some(leaf) => leaf.to_string(),
                None => continue,
            };

            if !self.is_container(&leaf) {
                if filter.matches(&leaf) {
                    extraction.files.push(ExtractedFile::new(leaf, item.content));
                } else {
                    debug!(entry = %item.path, "entry does not match filter");
                }
                continue;
            }

            if item.depth > self.config.max_depth {
                warn!(
                    container = %item.path,
                    depth = item.depth,
                    max_depth = self.config.max_depth,
                    "container nested too deeply, not expanding"
                );
                extraction.failures.push(ExtractionError::DepthExceeded {
                    container: leaf,
                    max_depth: self.config.max_depth,
                });
                continue;
            }

            let Some(archive_type) = detect_archive_type(&leaf) else {
                warn!(container = %item.path, "no decoder for container suffix");
                extraction
                    .failures
                    .push(ExtractionError::UnsupportedContainer(leaf));
                continue;
            };

            // decode off the async executor; one container per step
            let container_name = leaf.clone();
            let content = item.content;
            let mut step_budget = budget;
            let decoded = spawn_blocking(move || {
                let result = read_container(&container_name, archive_type, &content, &mut step_budget);
                (result, step_budget)
            })
            .await;

            let entries = match decoded {
                Ok((Ok(entries), spent)) => {
                    budget = spent;
                    entries
                }
                Ok((Err(e @ ExtractionError::TooLarge { .. }), _)) => {
                    warn!(container = name, limit = self.config.max_total_bytes, "extraction byte budget exceeded");
                    return Err(e.into());
                }
                Ok((Err(e), _)) => {
                    warn!(container = %item.path, error = %e, "failed to expand container, continuing");
                    extraction.failures.push(e);
                    continue;
                }
                Err(e) => {
                    warn!(container = %item.path, error = %e, "container decoder panicked");
                    extraction.failures.push(ExtractionError::Corrupt {
                        container: leaf,
                        reason: format!("decoder task failed: {}", e),
                    });
                    continue;
                }
            };

            debug!(
                container = %item.path,
                depth = item.depth,
                entries = entries.len(),
                remaining_bytes = budget.remaining(),
                "expanded container"
            );

            // reversed so the first entry is popped first
            for entry in entries.into_iter().rev() {
                stack.push(WorkItem {
                    path: format!("{}/{}", item.path, entry.path),
                    content: entry.content,
                    depth: item.depth + 1,
                });
            }
        }

        info!(
            container = name,
            files = extraction.files.len(),
            failures = extraction.failures.len(),
            "extraction finished"
        );

        Ok(extraction)
    }

    /// Expand a batch of caller-provided files
    ///
    /// Containers are extracted; plain files are passed through (leaf name only)
    /// when they match `filter`. Order follows the input order.
    ///
    /// A container that cannot be expanded (unsupported, over the byte budget)
    /// is reported in [`Extraction::failures`] and the batch goes on; only
    /// cancellation aborts it.
    pub async fn expand_incoming(
        &self,
        files: Vec<IncomingFile>,
        filter: &ExtensionFilter,
        cancel: &CancellationToken,
    ) -> Result<Extraction> {
        let mut expanded = Extraction::default();

        for file in files {
            let Some(leaf) = leaf_name(&file.name).map(str::to_string) else {
                continue;
            };

            if self.is_container(&leaf) {
                match self
                    .extract_with_cancel(&leaf, file.content, filter, cancel)
                    .await
                {
                    Ok(extraction) => expanded.append(extraction),
                    Err(crate::Error::Extraction(ExtractionError::Cancelled)) => {
                        return Err(ExtractionError::Cancelled.into());
                    }
                    Err(crate::Error::Extraction(e)) => {
                        warn!(file = %leaf, error = %e, "container could not be expanded, continuing");
                        expanded.failures.push(e);
                    }
                    Err(e) => return Err(e),
                }
            } else if filter.matches(&leaf) {
                expanded.files.push(ExtractedFile::new(leaf, file.content));
            }
        }

        Ok(expanded)
    }
}
