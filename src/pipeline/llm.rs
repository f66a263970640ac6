//! Hosted-model interaction: one prompt in, one completion out.
//!
//! This module only moves text to and from the hosted model. All prompt
//! wording lives in [`crate::prompts`] and all orchestration (map, reduce,
//! condense) lives in [`crate::chain`].
//!
//! ## Deadline, no retries
//!
//! Every call runs under `api_timeout_secs`. A failed or timed-out call is
//! reported immediately as a generation-class [`DocuBotError`]; the user
//! decides whether to ask again.

use crate::config::{ChatBackend, SessionConfig};
use crate::error::DocuBotError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// A single-turn request: system message + user prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Generated text plus token usage when the backend reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// A hosted chat model bound to one model identifier.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name for logs and errors ("groq", "openai", …).
    fn provider(&self) -> &str;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Run one completion. Implementations do not retry.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, DocuBotError>;
}

/// Run `request` against `model`, failing with [`DocuBotError::ApiTimeout`]
/// once `timeout` elapses.
pub async fn complete_with_deadline(
    model: &dyn ChatModel,
    stage: &str,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<Completion, DocuBotError> {
    let start = Instant::now();
    let result = tokio::time::timeout(timeout, model.complete(request)).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(completion)) => {
            debug!(
                stage,
                provider = model.provider(),
                input_tokens = completion.input_tokens,
                output_tokens = completion.output_tokens,
                elapsed_ms,
                "completion finished"
            );
            Ok(completion)
        }
        Ok(Err(e)) => {
            warn!(stage, provider = model.provider(), "completion failed: {}", e);
            Err(e)
        }
        Err(_) => {
            warn!(stage, elapsed_ms, "completion timed out");
            Err(DocuBotError::ApiTimeout {
                stage: stage.to_string(),
                elapsed_ms,
            })
        }
    }
}

/// Build the chat model selected by `config.chat_backend`.
pub fn create_chat_model(config: &SessionConfig) -> Result<Arc<dyn ChatModel>, DocuBotError> {
    let model: Arc<dyn ChatModel> = match &config.chat_backend {
        ChatBackend::Groq => Arc::new(GroqChat::new(
            config.groq_url.clone(),
            config.model.as_str().to_string(),
            config.api_key.clone(),
            Duration::from_secs(config.api_timeout_secs),
        )?),
        ChatBackend::Provider(name) => {
            let provider = ProviderFactory::create_llm_provider(name, config.model.as_str())
                .map_err(|e| DocuBotError::ProviderNotConfigured {
                    provider: name.clone(),
                    hint: format!("{e}"),
                })?;
            Arc::new(ProviderChat::new(name.clone(), config.model.as_str(), provider))
        }
    };
    Ok(model)
}

// ── Groq (OpenAI-compatible chat completions) ────────────────────────────

/// Client for Groq's `/openai/v1/chat/completions` endpoint.
///
/// Constructed once per session; cheap to clone because `reqwest::Client`
/// is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct GroqChat {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl GroqChat {
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
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageData {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[async_trait]
impl ChatModel for GroqChat {
    fn provider(&self) -> &str {
        "groq"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, DocuBotError> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(DocuBotError::AuthError {
                provider: "groq".into(),
                detail: "GROQ_API_KEY is not set".into(),
            });
        };

        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                WireMessage {
                    role: "system",
                    content: &request.system,
                },
                WireMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            model = %self.model,
            prompt_len = request.prompt.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.url, error = %e, "chat request failed (transport)");
                DocuBotError::LlmApiError {
                    message: format!("groq unreachable: {e}"),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body));
        }

        let parsed = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| DocuBotError::LlmApiError {
                message: format!("failed to parse response body: {e}"),
            })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DocuBotError::LlmApiError {
                message: "empty or missing content in response".into(),
            })?;

        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(Completion {
            text,
            input_tokens,
            output_tokens,
        })
    }
}

/// Map a non-2xx response to the matching generation error.
fn classify_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> DocuBotError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DocuBotError::AuthError {
            provider: "groq".into(),
            detail: format!("HTTP {}", status.as_u16()),
        },
        StatusCode::TOO_MANY_REQUESTS => DocuBotError::RateLimitExceeded {
            provider: "groq".into(),
            retry_after_secs: retry_after,
        },
        _ => DocuBotError::LlmApiError {
            message: format!("HTTP {}: {}", status.as_u16(), body.trim()),
        },
    }
}

// ── edgequake-llm providers ──────────────────────────────────────────────

/// Adapter over any `edgequake-llm` chat provider.
pub struct ProviderChat {
    name: String,
    model: String,
    inner: Arc<dyn LLMProvider>,
}

impl ProviderChat {
    pub fn new(name: impl Into<String>, model: impl Into<String>, inner: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            inner,
        }
    }
}

#[async_trait]
impl ChatModel for ProviderChat {
    fn provider(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, DocuBotError> {
        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user(request.prompt.as_str()),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        match self.inner.chat(&messages, Some(&options)).await {
            Ok(response) => Ok(Completion {
                text: response.content.trim().to_string(),
                input_tokens: response.prompt_tokens,
                output_tokens: response.completion_tokens,
            }),
            Err(e) => Err(classify_provider_error(&self.name, &e.to_string())),
        }
    }
}

/// `edgequake-llm` errors only expose a message; sort them by its content.
fn classify_provider_error(provider: &str, message: &str) -> DocuBotError {
    let lower = message.to_lowercase();
    if lower.contains("401") || lower.contains("403") || lower.contains("auth") || lower.contains("api key") {
        DocuBotError::AuthError {
            provider: provider.to_string(),
            detail: message.to_string(),
        }
    } else if lower.contains("429") || lower.contains("rate limit") {
        DocuBotError::RateLimitExceeded {
            provider: provider.to_string(),
            retry_after_secs: None,
        }
    } else {
        DocuBotError::LlmApiError {
            message: message.to_string(),
        }
    }
}
