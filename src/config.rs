//! Configuration types for a document chat session.
//!
//! All session behaviour is controlled through [`SessionConfig`], built via
//! its [`SessionConfigBuilder`]. The model choice and every retrieval knob are
//! read once when the session starts and stay fixed for its lifetime.

use crate::error::DocuBotError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default Groq chat-completions endpoint (OpenAI-compatible).
pub const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Default embeddings endpoint: a local text-embeddings-inference server.
pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:8080/v1/embeddings";

/// Default embedding model served at [`DEFAULT_EMBEDDING_URL`].
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-mpnet-base-v2";

/// Configuration for one document chat session.
///
/// # Example
/// ```rust
/// use docubot::{HostedModel, SessionConfig};
///
/// let config = SessionConfig::builder()
///     .model(HostedModel::Llama31_8bInstant)
///     .chunk_size(800)
///     .chunk_overlap(100)
///     .top_k(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.chunking.chunk_size, 800);
/// ```
#[derive(Clone)]
pub struct SessionConfig {
    /// Hosted model answering questions. Default: `gemma2-9b-it`.
    pub model: HostedModel,

    /// Where chat completions are sent. Default: [`ChatBackend::Groq`].
    pub chat_backend: ChatBackend,

    /// Chat-completions URL used by the Groq backend.
    pub groq_url: String,

    /// Credential for the Groq backend, read once at process start.
    ///
    /// When absent the session still starts, but every hosted-model call
    /// fails with [`DocuBotError::AuthError`].
    pub api_key: Option<String>,

    /// Which embedding backend turns chunks and questions into vectors.
    pub embedding: EmbeddingBackend,

    /// Text splitting parameters.
    pub chunking: ChunkingConfig,

    /// Number of chunks retrieved per question. Default: 4.
    pub top_k: usize,

    /// Chunks sent to the embedder per request while indexing. Default: 32.
    pub embed_batch_size: usize,

    /// Map-step calls allowed in flight at once. Default: 1 (sequential).
    pub map_concurrency: usize,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens generated per hosted-model call. Default: 1024.
    pub max_tokens: usize,

    /// Deadline for each hosted-model call in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Deadline for each embedding request in seconds. Default: 120.
    pub embed_timeout_secs: u64,

    /// Rephrase follow-up questions into standalone ones before retrieval.
    /// Costs one extra call per question once history exists. Default: false.
    pub condense_question: bool,

    /// Directory uploads are persisted into. Default: `./uploads`.
    pub working_dir: PathBuf,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Receives indexing events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: HostedModel::default(),
            chat_backend: ChatBackend::default(),
            groq_url: GROQ_CHAT_URL.to_string(),
            api_key: None,
            embedding: EmbeddingBackend::default(),
            chunking: ChunkingConfig::default(),
            top_k: 4,
            embed_batch_size: 32,
            map_concurrency: 1,
            temperature: 0.0,
            max_tokens: 1024,
            api_timeout_secs: 60,
            embed_timeout_secs: 120,
            condense_question: false,
            working_dir: PathBuf::from("uploads"),
            password: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("model", &self.model)
            .field("chat_backend", &self.chat_backend)
            .field("groq_url", &self.groq_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("embedding", &self.embedding)
            .field("chunking", &self.chunking)
            .field("top_k", &self.top_k)
            .field("embed_batch_size", &self.embed_batch_size)
            .field("map_concurrency", &self.map_concurrency)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("embed_timeout_secs", &self.embed_timeout_secs)
            .field("condense_question", &self.condense_question)
            .field("working_dir", &self.working_dir)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn IndexingProgressCallback>"),
            )
            .finish()
    }
}

impl SessionConfig {
    /// Create a new builder for `SessionConfig`.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn model(mut self, model: HostedModel) -> Self {
        self.config.model = model;
        self
    }

    pub fn chat_backend(mut self, backend: ChatBackend) -> Self {
        self.config.chat_backend = backend;
        self
    }

    pub fn groq_url(mut self, url: impl Into<String>) -> Self {
        self.config.groq_url = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.api_key = if key.is_empty() { None } else { Some(key) };
        self
    }

    pub fn embedding(mut self, backend: EmbeddingBackend) -> Self {
        self.config.embedding = backend;
        self
    }

    pub fn separator(mut self, sep: impl Into<String>) -> Self {
        self.config.chunking.separator = sep.into();
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunking.chunk_size = n;
        self
    }

    pub fn chunk_overlap(mut self, n: usize) -> Self {
        self.config.chunking.chunk_overlap = n;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k.max(1);
        self
    }

    pub fn embed_batch_size(mut self, n: usize) -> Self {
        self.config.embed_batch_size = n.max(1);
        self
    }

    pub fn map_concurrency(mut self, n: usize) -> Self {
        self.config.map_concurrency = n.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn embed_timeout_secs(mut self, secs: u64) -> Self {
        self.config.embed_timeout_secs = secs;
        self
    }

    pub fn condense_question(mut self, v: bool) -> Self {
        self.config.condense_question = v;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.working_dir = dir.into();
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SessionConfig, DocuBotError> {
        let c = &self.config;
        c.chunking.validate()?;
        if c.api_timeout_secs == 0 {
            return Err(DocuBotError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if let ChatBackend::Provider(name) = &c.chat_backend {
            if name.trim().is_empty() {
                return Err(DocuBotError::InvalidConfig(
                    "Provider name must not be empty".into(),
                ));
            }
        }
        if let EmbeddingBackend::Hashing { dimension } = c.embedding {
            if dimension == 0 {
                return Err(DocuBotError::InvalidConfig(
                    "Hashing embedder dimension must be ≥ 1".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Chunking ─────────────────────────────────────────────────────────────

/// Character-based splitting parameters. Sizes count `char`s, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Preferred split point. Default: `"\n"`.
    pub separator: String,
    /// Maximum chunk length. Default: 1000.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks. Default: 200.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            separator: "\n".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), DocuBotError> {
        if self.chunk_size == 0 {
            return Err(DocuBotError::InvalidConfig(
                "Chunk size must be ≥ 1".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(DocuBotError::InvalidConfig(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.separator.is_empty() {
            return Err(DocuBotError::InvalidConfig(
                "Separator must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Hosted models a session may be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HostedModel {
    /// Google Gemma 2 9B instruction-tuned. (default)
    #[default]
    #[serde(rename = "gemma2-9b-it")]
    Gemma2_9bIt,
    /// Meta Llama 3.1 8B instant.
    #[serde(rename = "llama-3.1-8b-instant")]
    Llama31_8bInstant,
}

impl HostedModel {
    /// Every selectable model, in menu order.
    pub const ALL: [HostedModel; 2] = [HostedModel::Gemma2_9bIt, HostedModel::Llama31_8bInstant];

    /// Wire identifier sent to the hosted API.
    pub fn as_str(&self) -> &'static str {
        match self {
            HostedModel::Gemma2_9bIt => "gemma2-9b-it",
            HostedModel::Llama31_8bInstant => "llama-3.1-8b-instant",
        }
    }
}

impl fmt::Display for HostedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostedModel {
    type Err = DocuBotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HostedModel::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                DocuBotError::InvalidConfig(format!(
                    "Unknown model '{}'. Choose one of: {}",
                    s,
                    HostedModel::ALL
                        .iter()
                        .map(|m| m.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

/// Where chat completions are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatBackend {
    /// Groq's OpenAI-compatible endpoint with `api_key`. (default)
    #[default]
    Groq,
    /// Any provider `edgequake-llm` knows by name ("openai", "anthropic",
    /// "ollama", …). Its credential comes from that provider's env var.
    Provider(String),
}

/// Which embedding backend to use.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub enum EmbeddingBackend {
    /// OpenAI-compatible `/v1/embeddings` endpoint. (default)
    Http {
        url: String,
        model: String,
        api_key: Option<String>,
    },
    /// Embedding provider auto-detected from the environment by
    /// `edgequake-llm` (OPENAI_API_KEY, …).
    Provider,
    /// Local feature-hashing bag-of-words. No network, lower quality.
    Hashing { dimension: usize },
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        EmbeddingBackend::Http {
            url: DEFAULT_EMBEDDING_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            api_key: None,
        }
    }
}

impl fmt::Debug for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingBackend::Http { url, model, api_key } => f
                .debug_struct("Http")
                .field("url", url)
                .field("model", model)
                .field("api_key", &api_key.as_ref().map(|_| "<redacted>"))
                .finish(),
            EmbeddingBackend::Provider => f.write_str("Provider"),
            EmbeddingBackend::Hashing { dimension } => f
                .debug_struct("Hashing")
                .field("dimension", dimension)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = SessionConfig::default();
        assert_eq!(c.model, HostedModel::Gemma2_9bIt);
        assert_eq!(c.chunking.chunk_size, 1000);
        assert_eq!(c.chunking.chunk_overlap, 200);
        assert_eq!(c.chunking.separator, "\n");
        assert_eq!(c.top_k, 4);
        assert_eq!(c.temperature, 0.0);
        assert!(!c.condense_question);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let err = SessionConfig::builder()
            .chunk_size(100)
            .chunk_overlap(100)
            .build()
            .unwrap_err();
        assert!(matches!(err, DocuBotError::InvalidConfig(_)));
    }

    #[test]
    fn empty_separator_rejected() {
        assert!(SessionConfig::builder().separator("").build().is_err());
    }

    #[test]
    fn builder_clamps_counts() {
        let c = SessionConfig::builder()
            .top_k(0)
            .map_concurrency(0)
            .temperature(5.0)
            .build()
            .unwrap();
        assert_eq!(c.top_k, 1);
        assert_eq!(c.map_concurrency, 1);
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn empty_api_key_is_treated_as_missing() {
        let c = SessionConfig::builder().api_key("").build().unwrap();
        assert!(c.api_key.is_none());
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = SessionConfig::builder()
            .api_key("gsk_secret")
            .password("hunter2")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("gsk_secret"));
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("api_key: Some(\"<redacted>\")"));
        assert!(dbg.contains("password: Some(\"<redacted>\")"));
        assert!(dbg.contains("embed_timeout_secs: 120"));

        let plain = format!("{:?}", SessionConfig::default());
        assert!(plain.contains("password: None"));
    }

    #[test]
    fn hosted_model_round_trips_through_str() {
        for m in HostedModel::ALL {
            assert_eq!(m.as_str().parse::<HostedModel>().unwrap(), m);
        }
        assert!("gpt-4o".parse::<HostedModel>().is_err());
    }

    #[test]
    fn hosted_model_serde_uses_wire_ids() {
        let json = serde_json::to_string(&HostedModel::Llama31_8bInstant).unwrap();
        assert_eq!(json, "\"llama-3.1-8b-instant\"");
    }
}
