use crate::error::ExtractionError;
use crate::types::ArchiveType;
use std::io::Read;
use tracing::debug;

use super::sevenz::read_7z_entries;
use super::tar::read_tar_entries;
use super::zip::read_zip_entries;

/// A non-directory entry read out of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawEntry {
    /// Path inside the container, as stored
    pub path: String,
    /// Entry content
    pub content: Vec<u8>,
}

/// Tracks how many more bytes may be read before the extraction budget is spent
#[derive(Debug, Clone, Copy)]
pub(crate) struct ByteBudget {
    limit: u64,
    remaining: u64,
}

impl ByteBudget {
    pub(crate) fn new(limit: u64) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Read `reader` to the end, charging the bytes against the budget
    pub(crate) fn read_entry(&mut self, reader: &mut dyn Read) -> Result<Vec<u8>, ReadFailure> {
        let mut content = Vec::new();
        // one byte past the budget tells "exactly at the limit" apart from "over it"
        reader
            .take(self.remaining.saturating_add(1))
            .read_to_end(&mut content)
            .map_err(|e| ReadFailure::Io(e.to_string()))?;

        let read = content.len() as u64;
        if read > self.remaining {
            return Err(ReadFailure::OverBudget);
        }
        self.remaining -= read;
        Ok(content)
    }

    pub(crate) fn over_budget(&self) -> ExtractionError {
        ExtractionError::TooLarge { limit: self.limit }
    }
}

/// Why reading a single entry failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReadFailure {
    Io(String),
    OverBudget,
}

impl ReadFailure {
    pub(crate) fn into_error(self, container: &str, budget: &ByteBudget) -> ExtractionError {
        match self {
            ReadFailure::Io(reason) => ExtractionError::Corrupt {
                container: container.to_string(),
                reason,
            },
            ReadFailure::OverBudget => budget.over_budget(),
        }
    }
}

/// Detect container type by file name
///
/// Supports ZIP (.zip), 7z (.7z), TAR (.tar) and gzip TAR (.tar.gz, .tgz).
pub fn detect_archive_type(name: &str) -> Option<ArchiveType> {
    let lower = name.to_lowercase();

    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Some(ArchiveType::TarGz)
    } else if lower.ends_with(".tar") {
        Some(ArchiveType::Tar)
    } else if lower.ends_with(".zip") {
        Some(ArchiveType::Zip)
    } else if lower.ends_with(".7z") {
        Some(ArchiveType::SevenZip)
    } else {
        None
    }
}

/// Check if a file name ends with one of the configured container suffixes
///
/// # Arguments
/// * `name` - File name or path to check
/// * `archive_extensions` - Suffixes to treat as containers (without dots)
pub fn is_archive(name: &str, archive_extensions: &[String]) -> bool {
    let lower = name.to_lowercase();
    archive_extensions.iter().any(|ext| {
        let ext = ext.trim_start_matches('.').to_lowercase();
        !ext.is_empty() && lower.ends_with(&format!(".{ext}"))
    })
}

/// Strip directory components from an entry path
///
/// Both `/` and `\` are treated as separators since archives built on Windows
/// frequently store backslashes. Returns `None` for paths without a file name.
pub fn leaf_name(path: &str) -> Option<&str> {
    let leaf = path.rsplit(['/', '\\']).next()?;
    if leaf.is_empty() { None } else { Some(leaf) }
}

/// Whether an entry is archiver metadata rather than user content
pub(crate) fn is_metadata_entry(path: &str) -> bool {
    path.starts_with("__MACOSX/")
        || path.contains("/__MACOSX/")
        || leaf_name(path).is_some_and(|leaf| leaf.starts_with("._") || leaf == ".DS_Store")
}

/// Decode every non-directory entry of one container
///
/// Blocking: callers run this on the blocking pool.
pub(crate) fn read_container(
    name: &str,
    archive_type: ArchiveType,
    bytes: &[u8],
    budget: &mut ByteBudget,
) -> Result<Vec<RawEntry>, ExtractionError> {
    debug!(
        container = name,
        ?archive_type,
        size = bytes.len(),
        "reading container"
    );

    let entries = match archive_type {
        ArchiveType::Zip => read_zip_entries(name, bytes, budget),
        ArchiveType::SevenZip => read_7z_entries(name, bytes, budget),
        ArchiveType::Tar => read_tar_entries(name, bytes, budget),
        ArchiveType::TarGz => {
            let decoder = flate2::read::GzDecoder::new(bytes);
            read_tar_entries(name, decoder, budget)
        }
    }?;

    Ok(entries
        .into_iter()
        .filter(|entry| {
            let skip = is_metadata_entry(&entry.path);
            if skip {
                debug!(container = name, entry = %entry.path, "skipping archiver metadata");
            }
            !skip
        })
        .collect())
}
