use std::time::Duration;

use async_trait::async_trait;

use crate::types::{Chunk, ChunkEmbedding, ChunkHit, ChunkId, SearchFilters};

/// Result of an upsert keyed by content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No chunk with this content hash existed; a new row was written.
    Created,
    /// An active chunk with the same content hash already existed.
    Reused(ChunkId),
    /// An inactive chunk with the same content hash was reactivated.
    Reactivated(ChunkId),
}

/// Durable chunk store. Read concurrently by many searches, written only
/// by the indexing pipeline (single writer per chunk id, enforced through
/// the content-hash upsert).
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert the chunk unless an equal content hash is already present.
    async fn upsert_by_hash(&self, chunk: Chunk) -> anyhow::Result<UpsertOutcome>;

    async fn get(&self, id: &str) -> anyhow::Result<Option<Chunk>>;

    /// Active chunks whose embedding (from `backend_id`) has cosine
    /// similarity `>= floor` against `vector`, best first.
    async fn nearest_neighbors(
        &self,
        vector: &[f32],
        backend_id: &str,
        limit: usize,
        floor: f32,
        filters: &SearchFilters,
    ) -> anyhow::Result<Vec<ChunkHit>>;

    /// Active chunks ranked by text relevance against the query terms.
    async fn lexical_rank(
        &self,
        terms: &[String],
        limit: usize,
        filters: &SearchFilters,
    ) -> anyhow::Result<Vec<ChunkHit>>;

    /// Active chunks containing any of the literal tokens.
    async fn find_by_token(
        &self,
        tokens: &[String],
        limit: usize,
        filters: &SearchFilters,
    ) -> anyhow::Result<Vec<ChunkHit>>;

    /// Soft-deactivate all active chunks of `doc_id` whose content hash is
    /// not in `keep_hashes`. Returns the number deactivated.
    async fn deactivate_missing(&self, doc_id: &str, keep_hashes: &[String]) -> anyhow::Result<usize>;

    async fn increment_usage(&self, ids: &[ChunkId]) -> anyhow::Result<()>;

    async fn set_embedding(&self, id: &str, embedding: ChunkEmbedding) -> anyhow::Result<()>;

    /// Record a per-chunk embedding failure; the chunk stays pending and
    /// is retried on a later backfill pass.
    async fn set_embedding_error(&self, id: &str, error: &str) -> anyhow::Result<()>;

    /// Active chunks that have no embedding from `backend_id` yet.
    async fn pending_embedding(&self, backend_id: &str, limit: usize) -> anyhow::Result<Vec<Chunk>>;
}

/// Shared TTL key-value store used for the embedding cache and the
/// result cache. Values are opaque bytes.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Pluggable embedding backend with a stable identity string. The id is
/// part of every cache key and stored on every chunk embedding.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    /// Maximum accepted input length, in characters.
    fn max_input_len(&self) -> usize;

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }
}
