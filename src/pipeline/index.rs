//! In-memory vector index: exact cosine-similarity search over one document.
//!
//! A session indexes a single PDF, typically a few hundred chunks, so a flat
//! scan is both exact and fast enough; no approximate structure is needed.
//! The store is built in one batch and exposes no way to add or remove
//! entries afterwards.

use crate::error::DocuBotError;
use crate::pipeline::chunk::TextChunk;
use crate::pipeline::embed::Embedder;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

/// A chunk returned by [`VectorStore::search`] with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

#[derive(Debug, Clone)]
struct Entry {
    chunk: TextChunk,
    vector: Vec<f32>,
    norm: f32,
}

/// Immutable (vector, chunk) collection for one document.
#[derive(Debug, Clone)]
pub struct VectorStore {
    entries: Vec<Entry>,
    dimension: usize,
}

impl VectorStore {
    /// Embed `chunks` in batches of `batch_size` and freeze the result.
    ///
    /// Any embedding failure aborts the whole build; no partial store is
    /// returned.
    pub async fn build(
        chunks: Vec<TextChunk>,
        embedder: &dyn Embedder,
        batch_size: usize,
        progress: Option<&ProgressCallback>,
    ) -> Result<Self, DocuBotError> {
        if chunks.is_empty() {
            return Err(DocuBotError::EmptyIndex);
        }

        let total = chunks.len();
        let mut vectors = Vec::with_capacity(total);

        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = embedder.embed(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(DocuBotError::EmbeddingFailed {
                    backend: embedder.name().to_string(),
                    detail: format!("expected {} vectors, got {}", texts.len(), embedded.len()),
                });
            }
            vectors.extend(embedded);
            debug!("Embedded {}/{} chunks", vectors.len(), total);
            if let Some(cb) = progress {
                cb.on_batch_embedded(vectors.len(), total);
            }
        }

        let store = Self::from_embeddings(chunks, vectors)?;
        info!(
            "Vector index ready: {} chunks, dimension {} ({})",
            store.len(),
            store.dimension,
            embedder.name()
        );
        Ok(store)
    }

    /// Assemble a store from precomputed vectors, one per chunk.
    pub fn from_embeddings(
        chunks: Vec<TextChunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, DocuBotError> {
        if chunks.is_empty() {
            return Err(DocuBotError::EmptyIndex);
        }
        if chunks.len() != vectors.len() {
            return Err(DocuBotError::Internal(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(DocuBotError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                if vector.len() != dimension {
                    return Err(DocuBotError::DimensionMismatch {
                        expected: dimension,
                        actual: vector.len(),
                    });
                }
                let norm = l2_norm(&vector);
                Ok(Entry {
                    chunk,
                    vector,
                    norm,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries, dimension })
    }

    /// Top-`k` chunks by cosine similarity to `query`.
    ///
    /// Ties are broken by chunk order, so identical queries against the same
    /// store always return the same chunks in the same order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, DocuBotError> {
        if query.len() != self.dimension {
            return Err(DocuBotError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine(query, query_norm, &e.vector, e.norm)))
            .collect();

        scored.sort_by(|a, b| match b.1.total_cmp(&a.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Indexed chunks in document order.
    pub fn chunks(&self) -> impl Iterator<Item = &TextChunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let score = dot / (a_norm * b_norm);
    if score.is_nan() {
        0.0
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::embed::{embed_one, HashingEmbedder};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn chunk(index: usize, text: &str) -> TextChunk {
        TextChunk {
            index,
            page: 1,
            start: 0,
            end: text.chars().count(),
            text: text.to_string(),
        }
    }

    fn corpus() -> Vec<TextChunk> {
        [
            "Photosynthesis converts light into chemical energy.",
            "The capital of France is Paris.",
            "Rust guarantees memory safety without garbage collection.",
            "Berlin is the capital of Germany.",
            "Mitochondria are the powerhouse of the cell.",
        ]
        .iter()
        .enumerate()
        .map(|(i, t)| chunk(i, t))
        .collect()
    }

    #[test]
    fn search_orders_by_similarity() {
        let store = VectorStore::from_embeddings(
            vec![chunk(0, "x"), chunk(1, "y"), chunk(2, "z")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
        )
        .unwrap();
        let hits = store.search(&[1.0, 0.1], 2).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.chunk.index).collect();
        assert_eq!(order, vec![0, 2]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn ties_break_by_chunk_order() {
        let store = VectorStore::from_embeddings(
            vec![chunk(0, "a"), chunk(1, "b"), chunk(2, "c")],
            vec![vec![1.0, 0.0]; 3],
        )
        .unwrap();
        let order: Vec<usize> = store
            .search(&[1.0, 0.0], 3)
            .unwrap()
            .iter()
            .map(|h| h.chunk.index)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn k_larger_than_store_returns_everything() {
        let store =
            VectorStore::from_embeddings(vec![chunk(0, "a")], vec![vec![0.5, 0.5]]).unwrap();
        assert_eq!(store.search(&[1.0, 0.0], 4).unwrap().len(), 1);
    }

    #[test]
    fn mixed_dimensions_rejected() {
        let err = VectorStore::from_embeddings(
            vec![chunk(0, "a"), chunk(1, "b")],
            vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DocuBotError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn query_dimension_checked() {
        let store =
            VectorStore::from_embeddings(vec![chunk(0, "a")], vec![vec![1.0, 0.0]]).unwrap();
        assert!(store.search(&[1.0], 1).is_err());
    }

    #[test]
    fn zero_vectors_score_zero() {
        let store =
            VectorStore::from_embeddings(vec![chunk(0, "a")], vec![vec![0.0, 0.0]]).unwrap();
        assert_eq!(store.search(&[1.0, 0.0], 1).unwrap()[0].score, 0.0);
    }

    #[tokio::test]
    async fn empty_chunk_list_is_an_index_error() {
        let e = HashingEmbedder::new(8);
        let err = VectorStore::build(Vec::new(), &e, 4, None).await.unwrap_err();
        assert!(matches!(err, DocuBotError::EmptyIndex));
    }

    #[tokio::test]
    async fn rebuilding_gives_identical_neighbours() {
        let e = HashingEmbedder::new(1024);
        let a = VectorStore::build(corpus(), &e, 2, None).await.unwrap();
        let b = VectorStore::build(corpus(), &e, 3, None).await.unwrap();
        assert_eq!(a.dimension(), 1024);
        let order: Vec<usize> = b.chunks().map(|c| c.index).collect();
        assert_eq!(order, (0..corpus().len()).collect::<Vec<_>>());
        let q = embed_one(&e, "Which city is the capital of France?").await.unwrap();

        let ha = a.search(&q, 4).unwrap();
        let hb = b.search(&q, 4).unwrap();
        assert_eq!(ha, hb);
        assert_eq!(ha[0].chunk.text, "The capital of France is Paris.");
    }

    struct FailingAfter {
        calls: AtomicUsize,
        ok_batches: usize,
    }

    #[async_trait]
    impl Embedder for FailingAfter {
        fn name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DocuBotError> {
            let n = self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            if n >= self.ok_batches {
                return Err(DocuBotError::EmbeddingFailed {
                    backend: "failing".into(),
                    detail: "model offline".into(),
                });
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn embedding_failure_aborts_whole_build() {
        let e = FailingAfter {
            calls: AtomicUsize::new(0),
            ok_batches: 1,
        };
        let err = VectorStore::build(corpus(), &e, 2, None).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Embedding);
        assert_eq!(e.calls.load(AtomicOrdering::SeqCst), 2);
    }
}
