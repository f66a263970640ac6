//! Text extraction: pull per-page text out of a PDF via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated thread pool
//! thread, so a large document never stalls the Tokio worker threads.
//!
//! ## Binding
//!
//! `PDFIUM_LIB_PATH` names an explicit copy of the library; otherwise pdfium
//! is looked up in the system library path.

use crate::error::DocuBotError;
use crate::pipeline::input::check_pdf_file;
use crate::pipeline::normalize::clean_page_text;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The text of one page, after normalisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    /// 1-indexed page number.
    pub page: usize,
    pub text: String,
}

/// Loader output: ordered non-empty segments plus the document's page count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub segments: Vec<TextSegment>,
    pub total_pages: usize,
}

/// Turns a persisted document into ordered text segments.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Extract text from the file at `path`.
    ///
    /// Fails with an extraction-class [`DocuBotError`] when the file is
    /// unreadable, corrupt, or carries no text layer at all.
    async fn load(&self, path: &Path) -> Result<ExtractedDocument, DocuBotError>;
}

/// [`DocumentLoader`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumLoader {
    password: Option<String>,
}

impl PdfiumLoader {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }
}

#[async_trait]
impl DocumentLoader for PdfiumLoader {
    async fn load(&self, path: &Path) -> Result<ExtractedDocument, DocuBotError> {
        check_pdf_file(path)?;

        let path = path.to_path_buf();
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || extract_text_blocking(&path, password.as_deref()))
            .await
            .map_err(|e| DocuBotError::Internal(format!("Extraction task panicked: {}", e)))?
    }
}

/// Bind to pdfium, honouring `PDFIUM_LIB_PATH`.
fn bind_pdfium() -> Result<Pdfium, DocuBotError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(p) if !p.is_empty() => Pdfium::bind_to_library(PathBuf::from(&p))
            .map_err(|e| DocuBotError::PdfiumBindingFailed(format!("{p}: {e}")))?,
        _ => Pdfium::bind_to_system_library()
            .map_err(|e| DocuBotError::PdfiumBindingFailed(e.to_string()))?,
    };
    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of text extraction.
fn extract_text_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<ExtractedDocument, DocuBotError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                DocuBotError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                DocuBotError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            DocuBotError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let mut segments = Vec::with_capacity(total_pages);

    for (idx, page) in pages.iter().enumerate() {
        let raw = match page.text() {
            Ok(text) => text.all(),
            Err(e) => {
                warn!("Page {}: no text layer ({:?}), skipping", idx + 1, e);
                continue;
            }
        };

        let text = clean_page_text(&raw);
        if text.is_empty() {
            debug!("Page {}: empty after normalisation", idx + 1);
            continue;
        }

        debug!("Page {}: {} chars", idx + 1, text.chars().count());
        segments.push(TextSegment {
            page: idx + 1,
            text,
        });
    }

    if segments.is_empty() {
        return Err(DocuBotError::NoExtractableText {
            path: pdf_path.to_path_buf(),
            pages: total_pages,
        });
    }

    Ok(ExtractedDocument {
        segments,
        total_pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loader_rejects_missing_file_before_binding() {
        let loader = PdfiumLoader::default();
        let err = loader
            .load(Path::new("/definitely/not/a/real/file.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocuBotError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn loader_rejects_non_pdf_before_binding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pdf");
        std::fs::write(&path, b"PK\x03\x04zip").unwrap();
        let err = PdfiumLoader::new(None).load(&path).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Extraction);
        assert!(matches!(err, DocuBotError::NotAPdf { .. }));
    }
}
