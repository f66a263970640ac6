//! Retrieval-augmented answering over one indexed document.
//!
//! ## Steps per question
//!
//! ```text
//! question ─▶ (condense) ─▶ embed ─▶ top-k search ─▶ map × k ─▶ reduce ─▶ answer
//! ```
//!
//! Map calls see one retrieved chunk each and are issued in retrieval order;
//! with `map_concurrency > 1` several run at once but their outputs are still
//! consumed in order, so the reduce prompt is identical either way.
//!
//! Memory is written only after the reduce call succeeds. A failure in any
//! step leaves it exactly as it was.

use crate::config::SessionConfig;
use crate::error::DocuBotError;
use crate::memory::ConversationMemory;
use crate::pipeline::embed::{embed_one, Embedder};
use crate::pipeline::index::{ScoredChunk, VectorStore};
use crate::pipeline::llm::{complete_with_deadline, ChatModel, Completion, CompletionRequest};
use crate::prompts;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A final answer with the evidence it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Standalone rephrasing used for retrieval, when condensing ran.
    pub standalone_question: Option<String>,
    /// Retrieved chunks in rank order.
    pub sources: Vec<ScoredChunk>,
    pub stats: AnswerStats,
}

/// Cost and timing of one answered question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerStats {
    /// Hosted-model calls made (condense + map + reduce).
    pub model_calls: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub retrieval_ms: u64,
    pub generation_ms: u64,
    pub total_duration_ms: u64,
}

impl AnswerStats {
    fn record(&mut self, completion: &Completion) {
        self.model_calls += 1;
        self.input_tokens += completion.input_tokens as u64;
        self.output_tokens += completion.output_tokens as u64;
    }
}

/// Knobs the chain reads from [`SessionConfig`] once, at construction.
#[derive(Debug, Clone)]
struct ChainSettings {
    top_k: usize,
    map_concurrency: usize,
    temperature: f32,
    max_tokens: usize,
    api_timeout: Duration,
    condense_question: bool,
}

/// Vector store + embedder + chat model, bound together for one document.
pub struct AnswerChain {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    settings: ChainSettings,
}

impl AnswerChain {
    /// `embedder` must be the one that built `store`.
    pub fn new(
        store: VectorStore,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            model,
            settings: ChainSettings {
                top_k: config.top_k.max(1),
                map_concurrency: config.map_concurrency.max(1),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                api_timeout: Duration::from_secs(config.api_timeout_secs.max(1)),
                condense_question: config.condense_question,
            },
        }
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Embed `query` and return the top-k chunks.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>, DocuBotError> {
        let vector = embed_one(self.embedder.as_ref(), query).await?;
        self.store.search(&vector, self.settings.top_k)
    }

    /// Answer `question` against the document and, on success, record the
    /// exchange in `memory`.
    pub async fn ask(
        &self,
        question: &str,
        memory: &mut ConversationMemory,
    ) -> Result<Answer, DocuBotError> {
        let total_start = Instant::now();
        let mut stats = AnswerStats::default();
        let history = memory.format_history();

        // ── Step 1: Condense (optional) ──────────────────────────────────
        let standalone_question = if self.settings.condense_question && !memory.is_empty() {
            let completion = self
                .call("condense", prompts::condense_prompt(&history, question))
                .await?;
            stats.record(&completion);
            let rephrased = completion.text.trim().to_string();
            debug!("Condensed question: {}", rephrased);
            (!rephrased.is_empty()).then_some(rephrased)
        } else {
            None
        };
        let query = standalone_question.as_deref().unwrap_or(question);

        // ── Step 2: Retrieve ─────────────────────────────────────────────
        let retrieval_start = Instant::now();
        let sources = self.retrieve(query).await?;
        stats.retrieval_ms = retrieval_start.elapsed().as_millis() as u64;
        debug!(
            "Retrieved {} chunks: {:?}",
            sources.len(),
            sources.iter().map(|s| s.chunk.index).collect::<Vec<_>>()
        );

        // ── Step 3: Map ──────────────────────────────────────────────────
        let generation_start = Instant::now();
        let partials: Vec<Completion> = stream::iter(sources.iter().map(|source| {
            let prompt = prompts::map_prompt(&source.chunk.text, &history, question);
            self.call("map", prompt)
        }))
        .buffered(self.settings.map_concurrency)
        .try_collect()
        .await?;
        partials.iter().for_each(|c| stats.record(c));

        // ── Step 4: Reduce ───────────────────────────────────────────────
        let partial_texts: Vec<String> = partials.into_iter().map(|c| c.text).collect();
        let reduced = self
            .call(
                "reduce",
                prompts::reduce_prompt(&partial_texts, &history, question),
            )
            .await?;
        stats.record(&reduced);
        stats.generation_ms = generation_start.elapsed().as_millis() as u64;

        // ── Step 5: Remember ─────────────────────────────────────────────
        let text = reduced.text.trim().to_string();
        memory.append(question, text.clone());
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        info!(
            "Answered in {}ms ({} model calls, {} in / {} out tokens)",
            stats.total_duration_ms, stats.model_calls, stats.input_tokens, stats.output_tokens
        );

        Ok(Answer {
            text,
            standalone_question,
            sources,
            stats,
        })
    }

    async fn call(&self, stage: &str, prompt: String) -> Result<Completion, DocuBotError> {
        let request = CompletionRequest {
            system: prompts::SYSTEM_PROMPT.to_string(),
            prompt,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };
        complete_with_deadline(
            self.model.as_ref(),
            stage,
            &request,
            self.settings.api_timeout,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::chunk::TextChunk;
    use crate::pipeline::embed::HashingEmbedder;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Echoes a canned reply per stage and records every prompt.
    struct Recorder {
        prompts: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl Recorder {
        fn new(fail_on: Option<&'static str>) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl ChatModel for Recorder {
        fn provider(&self) -> &str {
            "recorder"
        }

        fn model(&self) -> &str {
            "recorder-1"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<Completion, DocuBotError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            let stage = if request.prompt.ends_with("FINAL ANSWER:") {
                "reduce"
            } else if request.prompt.ends_with("Standalone question:") {
                "condense"
            } else {
                "map"
            };
            if self.fail_on == Some(stage) {
                return Err(DocuBotError::LlmApiError {
                    message: format!("{stage} exploded"),
                });
            }
            let text = match stage {
                "reduce" => "Paris.".to_string(),
                "condense" => "What is the capital of France?".to_string(),
                _ => "The capital of France is Paris.".to_string(),
            };
            Ok(Completion {
                text,
                input_tokens: 10,
                output_tokens: 2,
            })
        }
    }

    async fn chain(model: Arc<dyn ChatModel>, config: &SessionConfig) -> AnswerChain {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(512));
        let texts = [
            "The capital of France is Paris.",
            "Berlin is the capital of Germany.",
            "Rust has no garbage collector.",
            "Photosynthesis happens in chloroplasts.",
            "The Seine flows through Paris.",
        ];
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, t)| TextChunk {
                index: i,
                page: 1,
                start: 0,
                end: t.len(),
                text: t.to_string(),
            })
            .collect();
        let store = VectorStore::build(chunks, embedder.as_ref(), 8, None)
            .await
            .unwrap();
        AnswerChain::new(store, embedder, model, config)
    }

    #[tokio::test]
    async fn map_reduce_makes_k_plus_one_calls() {
        let model = Arc::new(Recorder::new(None));
        let config = SessionConfig::default();
        let chain = chain(model.clone(), &config).await;
        let mut memory = ConversationMemory::new();

        let answer = chain
            .ask("What is the capital of France?", &mut memory)
            .await
            .unwrap();

        assert_eq!(answer.text, "Paris.");
        assert_eq!(answer.sources.len(), 4);
        assert_eq!(answer.sources[0].chunk.index, 0);
        assert_eq!(answer.stats.model_calls, 5);
        assert_eq!(answer.stats.input_tokens, 50);
        assert_eq!(memory.len(), 1);
        assert!(answer.standalone_question.is_none());

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("The capital of France is Paris."));
        assert!(prompts[4].contains("[4]"));
    }

    #[tokio::test]
    async fn reduce_failure_leaves_memory_untouched() {
        let model = Arc::new(Recorder::new(Some("reduce")));
        let chain = chain(model, &SessionConfig::default()).await;
        let mut memory = ConversationMemory::new();
        memory.append("earlier", "answer");

        let err = chain.ask("capital of France?", &mut memory).await.unwrap_err();
        assert!(matches!(err, DocuBotError::LlmApiError { .. }));
        assert_eq!(memory.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_map_keeps_retrieval_order() {
        let model = Arc::new(Recorder::new(None));
        let config = SessionConfig::builder().map_concurrency(4).build().unwrap();
        let chain = chain(model.clone(), &config).await;
        let mut memory = ConversationMemory::new();

        let answer = chain.ask("capital of France", &mut memory).await.unwrap();
        assert_eq!(answer.stats.model_calls, 5);
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts.last().unwrap().ends_with("FINAL ANSWER:"));
    }

    #[tokio::test]
    async fn condense_runs_only_with_history() {
        let model = Arc::new(Recorder::new(None));
        let config = SessionConfig::builder().condense_question(true).build().unwrap();
        let chain = chain(model.clone(), &config).await;
        let mut memory = ConversationMemory::new();

        let first = chain.ask("What is the capital of France?", &mut memory).await.unwrap();
        assert!(first.standalone_question.is_none());

        let second = chain.ask("And which river?", &mut memory).await.unwrap();
        assert_eq!(
            second.standalone_question.as_deref(),
            Some("What is the capital of France?")
        );
        assert_eq!(second.stats.model_calls, 6);
        assert_eq!(memory.exchanges()[1].question, "And which river?");
    }

    #[tokio::test]
    async fn retrieval_is_repeatable() {
        let chain = chain(Arc::new(Recorder::new(None)), &SessionConfig::default()).await;
        let a = chain.retrieve("Which river flows through Paris?").await.unwrap();
        let b = chain.retrieve("Which river flows through Paris?").await.unwrap();
        assert_eq!(a, b);
    }
}
