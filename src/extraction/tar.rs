use crate::error::ExtractionError;
use std::io::Read;
use tracing::debug;

use super::shared::{ByteBudget, RawEntry};

/// Read every regular-file entry of a tar stream
///
/// `reader` is either the raw bytes or a gzip decoder over them.
pub(crate) fn read_tar_entries<R: Read>(
    name: &str,
    reader: R,
    budget: &mut ByteBudget,
) -> Result<Vec<RawEntry>, ExtractionError> {
    let corrupt = |reason: String| ExtractionError::Corrupt {
        container: name.to_string(),
        reason,
    };

    let mut archive = tar::Archive::new(reader);
    let tar_entries = archive
        .entries()
        .map_err(|e| corrupt(format!("failed to read TAR archive: {}", e)))?;

    let mut entries = Vec::new();

    for entry in tar_entries {
        let mut entry = entry.map_err(|e| corrupt(format!("failed to read TAR entry: {}", e)))?;

        // symlinks, hard links and directories carry no content of their own
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| corrupt(format!("failed to read TAR entry path: {}", e)))?
            .to_string_lossy()
            .to_string();

        let content = match budget.read_entry(&mut entry) {
            Ok(content) => content,
            Err(failure) => return Err(failure.into_error(name, budget)),
        };

        debug!(container = name, entry = %path, size = content.len(), "read TAR entry");
        entries.push(RawEntry { path, content });
    }

    Ok(entries)
}
