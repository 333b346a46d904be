//! Source validation: make sure a stored document is a readable PDF.
//!
//! pdfium reports a missing file, a permission problem and a JPEG renamed to
//! `.pdf` with the same opaque load error. Checking the path and the `%PDF`
//! magic bytes first turns those into precise ingestion errors.

use crate::error::TriageError;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Validate that `path` exists, is readable and starts with `%PDF`.
pub fn validate_pdf(path: &Path) -> Result<(), TriageError> {
    if !path.exists() {
        return Err(TriageError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(TriageError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(TriageError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(TriageError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Validated PDF source: {}", path.display());
    Ok(())
}
