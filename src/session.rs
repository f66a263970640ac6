//! Session controller: one uploaded document, then a question loop.
//!
//! ```text
//!            upload ok                      reset
//!  Empty ──────────────▶ Indexing ──▶ Ready ─────▶ Empty
//!    ▲                      │
//!    └──── indexing error ──┘
//! ```
//!
//! Every method takes `&mut self`, so a session handles one upload or one
//! question at a time. Sessions share nothing with each other.

use crate::chain::{Answer, AnswerChain};
use crate::config::{ChatBackend, SessionConfig};
use crate::error::DocuBotError;
use crate::memory::{ConversationMemory, ConversationTurn};
use crate::pipeline::chunk::chunk_segments;
use crate::pipeline::embed::{create_embedder, Embedder};
use crate::pipeline::extract::{DocumentLoader, PdfiumLoader};
use crate::pipeline::index::VectorStore;
use crate::pipeline::input::{persist_upload, UploadedDocument};
use crate::pipeline::llm::{create_chat_model, ChatModel};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Empty,
    Indexing,
    Ready,
}

/// Result of [`Session::upload`].
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The document was stored and indexed.
    Indexed {
        document: UploadedDocument,
        total_pages: usize,
        pages_with_text: usize,
        chunks: usize,
    },
    /// A document is already indexed; the upload was not processed.
    Ignored { current: UploadedDocument },
}

struct ReadyState {
    document: UploadedDocument,
    chain: AnswerChain,
}

/// A single-user document chat session.
pub struct Session {
    config: SessionConfig,
    loader: Arc<dyn DocumentLoader>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    state: SessionState,
    ready: Option<ReadyState>,
    transcript: Vec<ConversationTurn>,
    memory: ConversationMemory,
}

impl Session {
    /// Create a session with the pdfium loader and the backends named in
    /// `config`.
    ///
    /// A missing Groq key does not fail here; every answer will fail with
    /// [`DocuBotError::AuthError`] instead.
    pub fn new(config: SessionConfig) -> Result<Self, DocuBotError> {
        if config.chat_backend == ChatBackend::Groq && config.api_key.is_none() {
            warn!("GROQ_API_KEY is not set; questions will fail with an authentication error");
        }
        let loader: Arc<dyn DocumentLoader> = Arc::new(PdfiumLoader::new(config.password.clone()));
        let embedder = create_embedder(&config)?;
        let model = create_chat_model(&config)?;
        Ok(Self::with_components(config, loader, embedder, model))
    }

    /// Create a session from explicit components.
    pub fn with_components(
        config: SessionConfig,
        loader: Arc<dyn DocumentLoader>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        info!(
            "Session started: model={} via {}, embedder={}",
            model.model(),
            model.provider(),
            embedder.name()
        );
        Self {
            config,
            loader,
            embedder,
            model,
            state: SessionState::Empty,
            ready: None,
            transcript: Vec::new(),
            memory: ConversationMemory::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The indexed document, once Ready.
    pub fn document(&self) -> Option<&UploadedDocument> {
        self.ready.as_ref().map(|r| &r.document)
    }

    /// Number of indexed chunks, once Ready.
    pub fn indexed_chunks(&self) -> Option<usize> {
        self.ready.as_ref().map(|r| r.chain.store().len())
    }

    pub fn transcript(&self) -> &[ConversationTurn] {
        &self.transcript
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Store `bytes` as `name` and index it.
    ///
    /// Once a document is Ready further uploads are ignored until
    /// [`Session::reset`]. Any failure returns the session to Empty.
    pub async fn upload(&mut self, name: &str, bytes: &[u8]) -> Result<UploadOutcome, DocuBotError> {
        if let Some(ready) = &self.ready {
            info!(
                "Ignoring upload '{}': '{}' is already indexed",
                name, ready.document.name
            );
            return Ok(UploadOutcome::Ignored {
                current: ready.document.clone(),
            });
        }

        self.state = SessionState::Indexing;
        match self.index(name, bytes).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.state = SessionState::Empty;
                warn!("Indexing '{}' failed: {}", name, e);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_indexing_failed(&e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Read a local file and [`upload`](Session::upload) it under its file name.
    pub async fn upload_file(&mut self, path: impl AsRef<Path>) -> Result<UploadOutcome, DocuBotError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.ready.is_some() {
            return self.upload(&name, &[]).await;
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DocuBotError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => DocuBotError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => DocuBotError::Internal(format!("reading '{}': {e}", path.display())),
        })?;
        self.upload(&name, &bytes).await
    }

    async fn index(&mut self, name: &str, bytes: &[u8]) -> Result<UploadOutcome, DocuBotError> {
        let start = Instant::now();
        let cb = self.config.progress_callback.clone();

        // ── Step 1: Persist ──────────────────────────────────────────────
        let document = persist_upload(&self.config.working_dir, name, bytes).await?;
        if let Some(ref cb) = cb {
            cb.on_indexing_start(&document.name);
        }

        // ── Step 2: Extract ──────────────────────────────────────────────
        let extracted = self.loader.load(&document.path).await?;
        let pages_with_text = extracted.segments.len();
        info!(
            "Extracted text from {}/{} pages",
            pages_with_text, extracted.total_pages
        );
        if let Some(ref cb) = cb {
            cb.on_text_extracted(pages_with_text, extracted.total_pages);
        }

        // ── Step 3: Chunk ────────────────────────────────────────────────
        let chunks = chunk_segments(&extracted.segments, &self.config.chunking);
        let total_chunks = chunks.len();
        info!("Split into {} chunks", total_chunks);
        if let Some(ref cb) = cb {
            cb.on_chunked(total_chunks);
        }

        // ── Step 4: Embed + index ────────────────────────────────────────
        let store = VectorStore::build(
            chunks,
            self.embedder.as_ref(),
            self.config.embed_batch_size,
            cb.as_ref(),
        )
        .await?;

        let chain = AnswerChain::new(
            store,
            Arc::clone(&self.embedder),
            Arc::clone(&self.model),
            &self.config,
        );
        self.ready = Some(ReadyState {
            document: document.clone(),
            chain,
        });
        self.state = SessionState::Ready;

        info!(
            "Indexed '{}' in {}ms",
            document.name,
            start.elapsed().as_millis()
        );
        if let Some(ref cb) = cb {
            cb.on_indexing_complete(total_chunks);
        }

        Ok(UploadOutcome::Indexed {
            document,
            total_pages: extracted.total_pages,
            pages_with_text,
            chunks: total_chunks,
        })
    }

    /// Answer a question about the indexed document.
    ///
    /// The question is added to the transcript before the chain runs. It is
    /// followed by the answer on success, or by a `Failed` turn carrying the
    /// error. Memory changes only on success.
    pub async fn ask(&mut self, question: &str) -> Result<Answer, DocuBotError> {
        let Some(ready) = &self.ready else {
            return Err(DocuBotError::NoDocumentIndexed);
        };
        let question = question.trim();
        if question.is_empty() {
            return Err(DocuBotError::EmptyQuestion);
        }

        self.transcript.push(ConversationTurn::User(question.to_string()));
        match ready.chain.ask(question, &mut self.memory).await {
            Ok(answer) => {
                self.transcript
                    .push(ConversationTurn::Assistant(answer.text.clone()));
                Ok(answer)
            }
            Err(e) => {
                warn!("Question failed: {}", e);
                self.transcript
                    .push(ConversationTurn::Failed(format!("[{}] {}", e.kind(), e)));
                Err(e)
            }
        }
    }

    /// Drop the document, index, transcript and memory.
    pub fn reset(&mut self) {
        if let Some(ready) = self.ready.take() {
            info!("Session reset; dropped '{}'", ready.document.name);
        }
        self.state = SessionState::Empty;
        self.transcript.clear();
        self.memory.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extract::{ExtractedDocument, TextSegment};
    use crate::pipeline::embed::HashingEmbedder;
    use crate::pipeline::llm::{Completion, CompletionRequest};
    use async_trait::async_trait;

    struct OnePage;

    #[async_trait]
    impl DocumentLoader for OnePage {
        async fn load(&self, _path: &Path) -> Result<ExtractedDocument, DocuBotError> {
            Ok(ExtractedDocument {
                segments: vec![TextSegment {
                    page: 1,
                    text: "The capital of France is Paris.".into(),
                }],
                total_pages: 1,
            })
        }
    }

    struct Fixed;

    #[async_trait]
    impl ChatModel for Fixed {
        fn provider(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed-1"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<Completion, DocuBotError> {
            Ok(Completion {
                text: "Paris".into(),
                ..Default::default()
            })
        }
    }

    fn session(dir: &Path) -> Session {
        let config = SessionConfig::builder().working_dir(dir).build().unwrap();
        Session::with_components(
            config,
            Arc::new(OnePage),
            Arc::new(HashingEmbedder::new(64)),
            Arc::new(Fixed),
        )
    }

    #[tokio::test]
    async fn blank_question_is_rejected_without_transcript_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        s.upload("doc.pdf", b"%PDF-1.4").await.unwrap();
        let err = s.ask("   ").await.unwrap_err();
        assert!(matches!(err, DocuBotError::EmptyQuestion));
        assert!(s.transcript().is_empty());
    }

    #[tokio::test]
    async fn upload_sanitises_name_into_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        let outcome = s.upload("../../etc/report.pdf", b"%PDF-1.4").await.unwrap();
        match outcome {
            UploadOutcome::Indexed { document, chunks, .. } => {
                assert_eq!(document.name, "report.pdf");
                assert_eq!(document.path, dir.path().join("report.pdf"));
                assert_eq!(chunks, 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(s.indexed_chunks(), Some(1));
    }

    #[tokio::test]
    async fn upload_file_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session(dir.path());
        let err = s.upload_file(dir.path().join("missing.pdf")).await.unwrap_err();
        assert!(matches!(err, DocuBotError::FileNotFound { .. }));
        assert_eq!(s.state(), SessionState::Empty);
    }
}
