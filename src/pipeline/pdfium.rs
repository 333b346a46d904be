//! Binding the pdfium shared library and opening documents with it.
//!
//! `Pdfium` is bound per operation inside `spawn_blocking`: the library
//! handle is cheap to re-bind (the OS caches `dlopen`) and keeping it local
//! means no pdfium state crosses thread boundaries.

use crate::error::TriageError;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::debug;

/// Bind pdfium: `PDFIUM_LIB_PATH` (a file or a directory) first, then the
/// current directory, then the system library search path.
pub fn bind_pdfium() -> Result<Pdfium, TriageError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        let lib = if Path::new(&path).is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&path)
        } else {
            path.clone().into()
        };
        debug!(path = %path, "Binding pdfium from PDFIUM_LIB_PATH");
        let bindings = Pdfium::bind_to_library(&lib)
            .map_err(|e| TriageError::PdfiumBindingFailed(format!("{path}: {e:?}")))?;
        return Ok(Pdfium::new(bindings));
    }

    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| TriageError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Map a pdfium load failure onto the ingestion error taxonomy.
pub fn map_load_error(e: PdfiumError, path: &Path, password: Option<&str>) -> TriageError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            TriageError::WrongPassword {
                path: path.to_path_buf(),
            }
        } else {
            TriageError::PasswordRequired {
                path: path.to_path_buf(),
            }
        }
    } else {
        TriageError::CorruptPdf {
            path: path.to_path_buf(),
            detail: err_str,
        }
    }
}
