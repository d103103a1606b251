use crate::error::ExtractionError;
use std::io::Cursor;
use tracing::debug;

use super::shared::{ByteBudget, RawEntry};

/// Read every file entry of an in-memory ZIP archive
pub(crate) fn read_zip_entries(
    name: &str,
    bytes: &[u8],
    budget: &mut ByteBudget,
) -> Result<Vec<RawEntry>, ExtractionError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractionError::Corrupt {
            container: name.to_string(),
            reason: format!("failed to read ZIP archive: {}", e),
        })?;

    let mut entries = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| {
            let err_str = e.to_string();
            let reason = if err_str.contains("password") || err_str.contains("encrypted") {
                "encrypted ZIP entries are not supported".to_string()
            } else {
                format!("failed to read ZIP entry: {}", e)
            };
            ExtractionError::Corrupt {
                container: name.to_string(),
                reason,
            }
        })?;

        if file.is_dir() {
            continue;
        }

        let path = file.name().to_string();
        let content = match budget.read_entry(&mut file) {
            Ok(content) => content,
            Err(failure) => return Err(failure.into_error(name, budget)),
        };

        debug!(container = name, entry = %path, size = content.len(), "read ZIP entry");
        entries.push(RawEntry { path, content });
    }

    Ok(entries)
}
