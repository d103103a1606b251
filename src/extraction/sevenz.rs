use crate::error::ExtractionError;
use sevenz_rust::{Password, SevenZReader};
use std::io::Cursor;
use tracing::debug;

use super::shared::{ByteBudget, RawEntry};

/// Read every file entry of an in-memory 7z archive
///
/// Encrypted archives are not supported; they surface as a read failure.
pub(crate) fn read_7z_entries(
    name: &str,
    bytes: &[u8],
    budget: &mut ByteBudget,
) -> Result<Vec<RawEntry>, ExtractionError> {
    let mut archive = SevenZReader::new(Cursor::new(bytes), bytes.len() as u64, Password::empty())
        .map_err(|e| ExtractionError::Corrupt {
            container: name.to_string(),
            reason: format!("failed to read 7z archive: {}", e),
        })?;

    let mut entries = Vec::new();
    let mut failure = None;

    archive
        .for_each_entries(|entry, reader| {
            if entry.is_directory() {
                return Ok(true);
            }

            let path = entry.name().to_string();
            match budget.read_entry(reader) {
                Ok(content) => {
                    debug!(container = name, entry = %path, size = content.len(), "read 7z entry");
                    entries.push(RawEntry { path, content });
                    Ok(true)
                }
                Err(e) => {
                    failure = Some(e);
                    // stop walking, the failure is reported below
                    Ok(false)
                }
            }
        })
        .map_err(|e| ExtractionError::Corrupt {
            container: name.to_string(),
            reason: format!("failed to read 7z entries: {}", e),
        })?;

    match failure {
        Some(failure) => Err(failure.into_error(name, budget)),
        None => Ok(entries),
    }
}
