//! # docubot
//!
//! Chat with a PDF: upload one document, then ask questions answered by a
//! hosted language model grounded in the document's own text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     persist the upload under the working directory
//!  ├─ 2. Extract   per-page text via pdfium (spawn_blocking)
//!  ├─ 3. Normalize line endings, invisible chars, blank-line runs
//!  ├─ 4. Chunk     1000-char windows with 200-char overlap
//!  ├─ 5. Embed     HTTP embeddings / edgequake-llm / local hashing
//!  └─ 6. Index     in-memory cosine-similarity store
//!
//! question
//!  │
//!  ├─ retrieve top-4 chunks
//!  ├─ map: one model call per chunk
//!  └─ reduce: one call combining the partial answers
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docubot::{Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::builder()
//!         .api_key(std::env::var("GROQ_API_KEY").unwrap_or_default())
//!         .build()?;
//!     let mut session = Session::new(config)?;
//!     session.upload_file("report.pdf").await?;
//!     let answer = session.ask("What is the main conclusion?").await?;
//!     println!("{}", answer.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docubot` binary (clap + anyhow + rustyline + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docubot = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Model
//!
//! | Model | Notes |
//! |-------|-------|
//! | `gemma2-9b-it` | Default |
//! | `llama-3.1-8b-instant` | Faster, shorter answers |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod chain;
pub mod config;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use chain::{Answer, AnswerChain, AnswerStats};
pub use config::{
    ChatBackend, ChunkingConfig, EmbeddingBackend, HostedModel, SessionConfig,
    SessionConfigBuilder,
};
pub use error::{DocuBotError, ErrorKind};
pub use memory::{ConversationMemory, ConversationTurn, Exchange};
pub use pipeline::chunk::TextChunk;
pub use pipeline::embed::{Embedder, HashingEmbedder};
pub use pipeline::extract::{DocumentLoader, ExtractedDocument, PdfiumLoader, TextSegment};
pub use pipeline::index::{ScoredChunk, VectorStore};
pub use pipeline::input::UploadedDocument;
pub use pipeline::llm::{ChatModel, Completion, CompletionRequest};
pub use progress::{IndexingProgressCallback, NoopProgressCallback, ProgressCallback};
pub use session::{Session, SessionState, UploadOutcome};
