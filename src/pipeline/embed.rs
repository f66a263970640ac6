//! Embedding backends: map text to fixed-dimension vectors.
//!
//! The same [`Embedder`] instance indexes the document and embeds every
//! question, so query and chunk vectors always come from one model.
//!
//! | Backend | Transport | When to use |
//! |---------|-----------|-------------|
//! | [`HttpEmbedder`] | OpenAI-compatible `/v1/embeddings` | text-embeddings-inference, Ollama, OpenAI (default) |
//! | [`ProviderEmbedder`] | `edgequake-llm` | whichever provider the environment configures |
//! | [`HashingEmbedder`] | none | offline runs, tests |

use crate::config::{EmbeddingBackend, SessionConfig};
use crate::error::DocuBotError;
use async_trait::async_trait;
use edgequake_llm::{EmbeddingProvider, ProviderFactory};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Maps a batch of texts to one vector each, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Embed `texts`. The result has exactly `texts.len()` vectors.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DocuBotError>;
}

/// Embed a single text.
pub async fn embed_one(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, DocuBotError> {
    let mut vectors = embedder.embed(&[text.to_string()]).await?;
    vectors.pop().ok_or_else(|| DocuBotError::EmbeddingFailed {
        backend: embedder.name().to_string(),
        detail: "backend returned no vector".into(),
    })
}

/// Build the embedder selected by `config.embedding`.
pub fn create_embedder(config: &SessionConfig) -> Result<Arc<dyn Embedder>, DocuBotError> {
    let timeout = Duration::from_secs(config.embed_timeout_secs.max(1));
    let embedder: Arc<dyn Embedder> = match &config.embedding {
        EmbeddingBackend::Http {
            url,
            model,
            api_key,
        } => Arc::new(HttpEmbedder::new(
            url.clone(),
            model.clone(),
            api_key.clone(),
            timeout,
        )?),
        EmbeddingBackend::Provider => Arc::new(ProviderEmbedder::from_env(timeout)?),
        EmbeddingBackend::Hashing { dimension } => Arc::new(HashingEmbedder::new(*dimension)),
    };
    Ok(embedder)
}

// ── HTTP (OpenAI-compatible) ─────────────────────────────────────────────

/// Client for any endpoint implementing `POST /v1/embeddings`.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(
        url: String,
        model: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DocuBotError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocuBotError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url,
            model,
            api_key,
        })
    }

    fn fail(&self, detail: impl Into<String>) -> DocuBotError {
        DocuBotError::EmbeddingFailed {
            backend: format!("http:{}", self.model),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DocuBotError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let payload = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        debug!(url = %self.url, batch = texts.len(), "sending embedding request");

        let mut req = self.client.post(&self.url).json(&payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!(url = %self.url, error = %e, "embedding request failed (transport)");
            self.fail(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.fail(format!("HTTP {}: {}", status, truncate(&body, 200))));
        }

        let mut parsed = response
            .json::<EmbeddingResponse>()
            .await
            .map_err(|e| self.fail(format!("failed to parse response body: {e}")))?;

        if parsed.data.len() != texts.len() {
            return Err(self.fail(format!(
                "expected {} vectors, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

// ── edgequake-llm provider ───────────────────────────────────────────────

/// Adapter over an environment-detected `edgequake-llm` embedding provider.
pub struct ProviderEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
}

impl ProviderEmbedder {
    /// Use whichever embedding provider `ProviderFactory::from_env` finds.
    pub fn from_env(timeout: Duration) -> Result<Self, DocuBotError> {
        let (_llm, embedding) =
            ProviderFactory::from_env().map_err(|e| DocuBotError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!(
                    "No embedding provider could be auto-detected from environment.\n\
                    Set OPENAI_API_KEY or configure a provider.\n\
                    Error: {}",
                    e
                ),
            })?;
        Ok(Self {
            inner: embedding,
            timeout,
        })
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn name(&self) -> &str {
        "provider"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DocuBotError> {
        let fail = |detail: String| DocuBotError::EmbeddingFailed {
            backend: "provider".to_string(),
            detail,
        };

        let vectors = tokio::time::timeout(self.timeout, self.inner.embed(texts))
            .await
            .map_err(|_| fail(format!("timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| fail(e.to_string()))?;

        if vectors.len() != texts.len() {
            return Err(fail(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

// ── Local feature hashing ────────────────────────────────────────────────

/// Words too common to say anything about a chunk's topic.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "has", "have",
    "how", "in", "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "were",
    "what", "when", "where", "which", "who", "why", "with",
];

/// Deterministic bag-of-words embedder using signed feature hashing.
///
/// Each lowercase alphanumeric token (minus stopwords) is hashed with FNV-1a
/// into one of `dimension` buckets; the result is L2-normalised. Texts that
/// share vocabulary land close together under cosine similarity.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed one text synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DocuBotError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}\u{2026}")
    } else {
        s.to_string()
    }
}
