//! Embedding generation with a write-through cache.
//!
//! The cache is keyed by `(content_hash, backend_id)` and consulted
//! before every backend call. Values are pure functions of the key, so
//! racing writers need no coordination; last write wins identically.

pub mod backend;
pub mod backfill;

use std::sync::Arc;
use std::time::Duration;

use quarry_core::config::EmbeddingConfig;
use quarry_core::error::{RetrievalError, Result};
use quarry_core::splitter::{split_text, SplitterConfig};
use quarry_core::text::content_hash;
use quarry_core::traits::{CacheStore, EmbeddingBackend};
use tracing::{debug, warn};

pub use backend::HashingBackend;
pub use backfill::EmbeddingBackfill;

/// One item of a batch embedding call. A failed item carries a
/// zero-vector placeholder instead of aborting its siblings.
#[derive(Debug, Clone)]
pub struct BatchEmbedding {
    pub vector: Vec<f32>,
    pub failed: bool,
}

pub struct EmbeddingService {
    backend: Arc<dyn EmbeddingBackend>,
    cache: Arc<dyn CacheStore>,
    cache_ttl: Duration,
}

impl EmbeddingService {
    pub fn new(
        backend: Arc<dyn EmbeddingBackend>,
        cache: Arc<dyn CacheStore>,
        config: &EmbeddingConfig,
    ) -> Self {
        Self {
            backend,
            cache,
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
        }
    }

    pub fn backend_id(&self) -> &str {
        self.backend.id()
    }

    pub fn dim(&self) -> usize {
        self.backend.dim()
    }

    /// Embed one text, cache-checked. A cache hit makes zero backend
    /// calls. Backend failure is a typed error and never populates the
    /// cache; cache outage degrades to compute-only.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = self.cache_key(text);
        if let Some(vector) = self.cache_get(&key).await {
            debug!(key, "embedding cache hit");
            return Ok(vector);
        }

        let vector = self.compute(text).await?;
        self.cache_put(&key, &vector).await;
        Ok(vector)
    }

    /// Embed many texts. Cache hits are served without backend calls;
    /// misses go through one batched backend call where possible. A
    /// failing item yields a zero-vector placeholder with `failed` set.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<BatchEmbedding>> {
        let mut out: Vec<Option<BatchEmbedding>> = vec![None; texts.len()];
        let mut miss_indices: Vec<usize> = Vec::new();
        let mut miss_texts: Vec<String> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let key = self.cache_key(text);
            if let Some(vector) = self.cache_get(&key).await {
                out[i] = Some(BatchEmbedding { vector, failed: false });
            } else if text.chars().count() > self.backend.max_input_len() {
                // Over-limit items take the split-and-average path and
                // cannot join the batched call.
                out[i] = Some(match self.embed(text).await {
                    Ok(vector) => BatchEmbedding { vector, failed: false },
                    Err(e) => {
                        warn!(error = %e, "batch item failed");
                        self.zero_placeholder()
                    }
                });
            } else {
                miss_indices.push(i);
                miss_texts.push(text.clone());
            }
        }

        if !miss_texts.is_empty() {
            match self.backend.embed_batch(&miss_texts).await {
                Ok(vectors) if vectors.len() == miss_texts.len() => {
                    for (j, vector) in vectors.into_iter().enumerate() {
                        let i = miss_indices[j];
                        self.cache_put(&self.cache_key(&texts[i]), &vector).await;
                        out[i] = Some(BatchEmbedding { vector, failed: false });
                    }
                }
                Ok(_) | Err(_) => {
                    // Batched call unusable; isolate failures per item.
                    for (j, text) in miss_texts.iter().enumerate() {
                        let i = miss_indices[j];
                        out[i] = Some(match self.backend.embed(text).await {
                            Ok(vector) => {
                                self.cache_put(&self.cache_key(text), &vector).await;
                                BatchEmbedding { vector, failed: false }
                            }
                            Err(e) => {
                                warn!(error = %e, "batch item failed");
                                self.zero_placeholder()
                            }
                        });
                    }
                }
            }
        }

        Ok(out
            .into_iter()
            .map(|e| e.unwrap_or_else(|| self.zero_placeholder()))
            .collect())
    }

    /// Backend call, splitting over-limit input with the same splitter
    /// the indexing pipeline uses and averaging the piece vectors.
    async fn compute(&self, text: &str) -> Result<Vec<f32>> {
        let max = self.backend.max_input_len();
        if text.chars().count() <= max {
            return self
                .backend
                .embed(text)
                .await
                .map_err(|e| RetrievalError::Embedding(e.to_string()));
        }

        // The splitter's target is soft: a piece may carry `overlap + 2`
        // extra characters, so leave that headroom below the backend limit.
        let overlap = max / 10;
        let cfg = SplitterConfig::new(max.saturating_sub(overlap + 2).max(1), overlap);
        let pieces = split_text(text, &cfg);
        if pieces.is_empty() {
            return Err(RetrievalError::Embedding("empty input after splitting".to_string()));
        }
        debug!(pieces = pieces.len(), "averaging over-limit input");
        let mut sum = vec![0f32; self.backend.dim()];
        for piece in &pieces {
            let v = self
                .backend
                .embed(piece)
                .await
                .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
            for (s, x) in sum.iter_mut().zip(&v) {
                *s += x;
            }
        }
        let n = pieces.len() as f32;
        for s in &mut sum {
            *s /= n;
        }
        Ok(sum)
    }

    fn zero_placeholder(&self) -> BatchEmbedding {
        BatchEmbedding { vector: vec![0f32; self.backend.dim()], failed: true }
    }

    fn cache_key(&self, text: &str) -> String {
        format!("emb:{}:{}", self.backend.id(), content_hash(text))
    }

    async fn cache_get(&self, key: &str) -> Option<Vec<f32>> {
        match self.cache.get(key).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "embedding cache unavailable, computing");
                None
            }
        }
    }

    async fn cache_put(&self, key: &str, vector: &[f32]) {
        let Ok(bytes) = serde_json::to_vec(vector) else {
            return;
        };
        if let Err(e) = self.cache.set(key, bytes, self.cache_ttl).await {
            warn!(error = %e, "embedding cache write failed");
        }
    }
}
