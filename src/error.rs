//! Error types for the docubot library.
//!
//! Every fallible operation returns [`DocuBotError`]. The variants are grouped
//! by pipeline stage and [`DocuBotError::kind`] folds them into the coarse
//! [`ErrorKind`] taxonomy the session controller reports on:
//!
//! * **Extraction**: the uploaded file cannot be turned into text.
//! * **Embedding**: the embedding backend failed; no partial index is kept.
//! * **Index**: the vector index could not be built from the chunks.
//! * **Generation**: a hosted-model call (map, reduce or condense) failed.
//! * **Configuration**: invalid settings or an unavailable provider.
//! * **Session**: the request is not valid in the session's current state.
//!
//! None of these are retried automatically. An indexing failure returns the
//! session to its empty state; an answering failure leaves the index and the
//! conversation memory exactly as they were.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the docubot library.
#[derive(Debug, Error)]
pub enum DocuBotError {
    // ── Extraction errors ─────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The PDF opened fine but no page carries a text layer.
    #[error("PDF '{path}' contains no extractable text ({pages} pages scanned).\nScanned documents need an OCR pass first.")]
    NoExtractableText { path: PathBuf, pages: usize },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium system-wide, or set PDFIUM_LIB_PATH=/path/to/libpdfium\n\
to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Embedding errors ──────────────────────────────────────────────────
    /// The embedding backend returned an error or an unusable response.
    #[error("Embedding backend '{backend}' failed: {detail}")]
    EmbeddingFailed { backend: String, detail: String },

    // ── Index errors ──────────────────────────────────────────────────────
    /// Chunking produced nothing to index.
    #[error("Cannot build a vector index from zero chunks")]
    EmptyIndex,

    /// Vectors of different sizes were offered to one index.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    // ── Generation errors ─────────────────────────────────────────────────
    /// The hosted model rejected the credential (401/403) or none was set.
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// The hosted model returned HTTP 429.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// A hosted-model call exceeded the configured deadline.
    #[error("{stage} call timed out after {elapsed_ms}ms")]
    ApiTimeout { stage: String, elapsed_ms: u64 },

    /// The hosted model returned any other error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── Configuration errors ──────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A named provider could not be constructed.
    #[error("Provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Session errors ────────────────────────────────────────────────────
    /// A question arrived before any document was indexed.
    #[error("No document indexed yet. Upload a PDF before asking questions.")]
    NoDocumentIndexed,

    /// The submitted question was blank.
    #[error("Question is empty")]
    EmptyQuestion,

    /// The client-supplied file name cannot be stored safely.
    #[error("Rejected upload name '{name}': {reason}")]
    InvalidUpload { name: String, reason: String },

    /// Could not persist the uploaded bytes.
    #[error("Failed to store upload at '{path}': {source}")]
    UploadWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse failure class of a [`DocuBotError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Extraction,
    Embedding,
    Index,
    Generation,
    Configuration,
    Session,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Extraction => "extraction",
            ErrorKind::Embedding => "embedding",
            ErrorKind::Index => "index",
            ErrorKind::Generation => "generation",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Session => "session",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl DocuBotError {
    /// The taxonomy class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use DocuBotError::*;
        match self {
            FileNotFound { .. }
            | PermissionDenied { .. }
            | NotAPdf { .. }
            | CorruptPdf { .. }
            | PasswordRequired { .. }
            | WrongPassword { .. }
            | NoExtractableText { .. }
            | PdfiumBindingFailed(_) => ErrorKind::Extraction,
            EmbeddingFailed { .. } => ErrorKind::Embedding,
            EmptyIndex | DimensionMismatch { .. } => ErrorKind::Index,
            AuthError { .. }
            | RateLimitExceeded { .. }
            | ApiTimeout { .. }
            | LlmApiError { .. } => ErrorKind::Generation,
            InvalidConfig(_) | ProviderNotConfigured { .. } => ErrorKind::Configuration,
            NoDocumentIndexed
            | EmptyQuestion
            | InvalidUpload { .. }
            | UploadWriteFailed { .. } => ErrorKind::Session,
            Internal(_) => ErrorKind::Internal,
        }
    }
}
