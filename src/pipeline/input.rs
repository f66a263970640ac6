//! Upload handling: persist the client's file and validate it is a PDF.
//!
//! The PDF engine needs a file-system path, so every upload is written into
//! the session's working directory first. The client-supplied name is reduced
//! to its final path component so a name like `../../etc/passwd` cannot
//! escape that directory.

use crate::error::DocuBotError;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A document persisted for indexing. Immutable once saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedDocument {
    /// Sanitised file name, as stored.
    pub name: String,
    /// Location under the working directory.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
}

/// Reduce a client-supplied file name to a safe single path component.
pub fn sanitize_upload_name(name: &str) -> Result<String, DocuBotError> {
    let reject = |reason: &str| DocuBotError::InvalidUpload {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.contains('\0') {
        return Err(reject("contains a NUL byte"));
    }

    // Both separators: names may come from Windows clients.
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    match base {
        "" => Err(reject("empty file name")),
        "." | ".." => Err(reject("not a file name")),
        _ => Ok(base.to_string()),
    }
}

/// Write `bytes` to `working_dir/<sanitised name>` and return the stored document.
///
/// Uses a temp file + rename so a failed write never leaves a truncated PDF
/// behind for the extractor to trip over.
pub async fn persist_upload(
    working_dir: &Path,
    name: &str,
    bytes: &[u8],
) -> Result<UploadedDocument, DocuBotError> {
    let file_name = sanitize_upload_name(name)?;
    let path = working_dir.join(&file_name);

    tokio::fs::create_dir_all(working_dir)
        .await
        .map_err(|e| DocuBotError::UploadWriteFailed {
            path: working_dir.to_path_buf(),
            source: e,
        })?;

    let tmp_path = working_dir.join(format!(".{file_name}.part"));
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| DocuBotError::UploadWriteFailed {
            path: path.clone(),
            source: e,
        })?;

    if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
        warn!("Could not move upload into '{}': {}", path.display(), e);
        if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
            debug!("Leftover '{}' not removed: {}", tmp_path.display(), cleanup);
        }
        return Err(DocuBotError::UploadWriteFailed {
            path: path.clone(),
            source: e,
        });
    }

    info!("Stored upload '{}' ({} bytes)", path.display(), bytes.len());

    Ok(UploadedDocument {
        name: file_name,
        path,
        size: bytes.len() as u64,
    })
}

/// Validate that `path` exists, is readable, and starts with `%PDF`.
pub fn check_pdf_file(path: &Path) -> Result<(), DocuBotError> {
    if !path.exists() {
        return Err(DocuBotError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(DocuBotError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DocuBotError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(DocuBotError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Validated PDF: {}", path.display());
    Ok(())
}
