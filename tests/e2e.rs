//! End-to-end integration tests for docubot.
//!
//! These tests use real PDF files in `./test_cases/`, a real pdfium library
//! and live API calls. They are gated behind the `E2E_ENABLED` environment
//! variable so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 GROQ_API_KEY=gsk_... cargo test --test e2e -- --nocapture
//!
//! Embeddings default to the local hashing backend so only the chat call
//! needs network access; set `E2E_EMBEDDING_URL` to exercise a real
//! `/v1/embeddings` server as well.

use docubot::{
    DocuBotError, EmbeddingBackend, ErrorKind, HostedModel, IndexingProgressCallback,
    NoopProgressCallback, Session, SessionConfig, SessionState, UploadOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn live_config(model: HostedModel, working_dir: &std::path::Path) -> SessionConfig {
    let embedding = match std::env::var("E2E_EMBEDDING_URL") {
        Ok(url) if !url.is_empty() => EmbeddingBackend::Http {
            url,
            model: std::env::var("E2E_EMBEDDING_MODEL")
                .unwrap_or_else(|_| docubot::config::DEFAULT_EMBEDDING_MODEL.to_string()),
            api_key: std::env::var("EMBEDDING_API_KEY").ok(),
        },
        _ => EmbeddingBackend::Hashing { dimension: 1024 },
    };
    SessionConfig::builder()
        .model(model)
        .api_key(std::env::var("GROQ_API_KEY").unwrap_or_default())
        .embedding(embedding)
        .working_dir(working_dir)
        .build()
        .unwrap()
}

// ── Live tests ───────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_index_and_ask_sample_pdf() {
    let pdf = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::new(live_config(HostedModel::Gemma2_9bIt, dir.path())).unwrap();

    let outcome = session.upload_file(&pdf).await.unwrap();
    let chunks = match outcome {
        UploadOutcome::Indexed { chunks, .. } => chunks,
        other => panic!("unexpected: {other:?}"),
    };
    assert!(chunks > 0);
    assert_eq!(session.state(), SessionState::Ready);

    let answer = session.ask("What is this document about?").await.unwrap();
    println!("answer: {}", answer.text);
    assert!(!answer.text.trim().is_empty());
    assert!(!answer.sources.is_empty());
    assert_eq!(session.memory().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_follow_up_uses_history_with_llama() {
    let pdf = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));
    let dir = tempfile::tempdir().unwrap();
    let mut session =
        Session::new(live_config(HostedModel::Llama31_8bInstant, dir.path())).unwrap();
    session.upload_file(&pdf).await.unwrap();

    session.ask("Summarise the first page in one sentence.").await.unwrap();
    session.ask("Can you say that more briefly?").await.unwrap();
    assert_eq!(session.memory().len(), 2);
    assert_eq!(session.transcript().len(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_key_is_an_auth_error() {
    let pdf = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig::builder()
        .api_key("gsk_definitely_not_valid")
        .embedding(EmbeddingBackend::Hashing { dimension: 256 })
        .working_dir(dir.path())
        .build()
        .unwrap();
    let mut session = Session::new(config).unwrap();
    session.upload_file(&pdf).await.unwrap();

    let err = session.ask("What is this about?").await.unwrap_err();
    assert!(
        matches!(err, DocuBotError::AuthError { .. }),
        "expected AuthError, got {err}"
    );
    assert!(session.memory().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_non_pdf_upload_is_rejected() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::new(live_config(HostedModel::Gemma2_9bIt, dir.path())).unwrap();
    let err = session
        .upload("notes.pdf", b"just some plain text")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Extraction);
    assert_eq!(session.state(), SessionState::Empty);
}

// ── Offline checks ───────────────────────────────────────────────────────────

#[test]
fn test_noop_callback_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<NoopProgressCallback>();
    let _cb: Arc<dyn IndexingProgressCallback> = Arc::new(NoopProgressCallback);
}

#[tokio::test]
async fn test_callback_send_in_tokio_spawn() {
    struct Counter(std::sync::atomic::AtomicUsize);
    impl IndexingProgressCallback for Counter {
        fn on_batch_embedded(&self, _embedded: usize, _total: usize) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }
    let cb: Arc<dyn IndexingProgressCallback> =
        Arc::new(Counter(std::sync::atomic::AtomicUsize::new(0)));
    let handle = tokio::spawn({
        let cb = Arc::clone(&cb);
        async move { cb.on_batch_embedded(1, 2) }
    });
    handle.await.unwrap();
}

#[test]
fn test_session_starts_without_api_key() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig::builder()
        .embedding(EmbeddingBackend::Hashing { dimension: 64 })
        .working_dir(dir.path())
        .build()
        .unwrap();
    let session = Session::new(config).unwrap();
    assert_eq!(session.state(), SessionState::Empty);
}
