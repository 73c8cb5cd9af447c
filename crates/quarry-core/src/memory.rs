//! In-memory reference implementations of the store traits.
//!
//! These back the single-process deployment and every test. They keep
//! the same contracts a durable store must honor: content-hash upsert,
//! active-only reads, cosine nearest-neighbor, TF lexical ranking and
//! literal token lookup.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::text::terms_of;
use crate::traits::{CacheStore, ChunkStore, UpsertOutcome};
use crate::types::{Chunk, ChunkEmbedding, ChunkHit, ChunkId, SearchFilters};

/// Cosine similarity of two vectors; 0.0 on dimension mismatch or a
/// zero-norm side.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }
    dot / (na * nb)
}

fn matches_filters(chunk: &Chunk, filters: &SearchFilters) -> bool {
    if let Some(module) = &filters.module {
        if chunk.module.as_deref() != Some(module.as_str()) {
            return false;
        }
    }
    if let Some(level) = filters.technical_level {
        if chunk.technical_level != level {
            return false;
        }
    }
    if let Some(language) = filters.language {
        if chunk.language != language {
            return false;
        }
    }
    true
}

fn sort_hits(hits: &mut Vec<ChunkHit>, limit: usize) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    hits.truncate(limit);
}

#[derive(Default)]
struct ChunkTable {
    chunks: HashMap<ChunkId, Chunk>,
    /// content_hash -> chunk id; one row per distinct normalized text.
    by_hash: HashMap<String, ChunkId>,
    embed_errors: HashMap<ChunkId, String>,
}

/// RwLock'd chunk table. Reads are concurrent; the indexing pipeline is
/// the only writer.
#[derive(Default)]
pub struct MemoryChunkStore {
    inner: RwLock<ChunkTable>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.chunks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.chunks.is_empty()
    }

    /// Last recorded embedding error for a chunk, if any. Test hook.
    pub async fn embedding_error(&self, id: &str) -> Option<String> {
        self.inner.read().await.embed_errors.get(id).cloned()
    }

    pub async fn active_chunks(&self) -> Vec<Chunk> {
        self.inner
            .read()
            .await
            .chunks
            .values()
            .filter(|c| c.active)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn upsert_by_hash(&self, chunk: Chunk) -> anyhow::Result<UpsertOutcome> {
        let mut table = self.inner.write().await;
        if let Some(existing_id) = table.by_hash.get(&chunk.content_hash).cloned() {
            if let Some(existing) = table.chunks.get_mut(&existing_id) {
                if existing.active {
                    return Ok(UpsertOutcome::Reused(existing_id));
                }
                existing.active = true;
                return Ok(UpsertOutcome::Reactivated(existing_id));
            }
        }
        table.by_hash.insert(chunk.content_hash.clone(), chunk.id.clone());
        table.chunks.insert(chunk.id.clone(), chunk);
        Ok(UpsertOutcome::Created)
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<Chunk>> {
        Ok(self.inner.read().await.chunks.get(id).cloned())
    }

    async fn nearest_neighbors(
        &self,
        vector: &[f32],
        backend_id: &str,
        limit: usize,
        floor: f32,
        filters: &SearchFilters,
    ) -> anyhow::Result<Vec<ChunkHit>> {
        let table = self.inner.read().await;
        let mut hits: Vec<ChunkHit> = table
            .chunks
            .values()
            .filter(|c| c.active && matches_filters(c, filters))
            .filter_map(|c| {
                let emb = c.embedding.as_ref()?;
                if emb.backend_id != backend_id {
                    return None;
                }
                let score = cosine_similarity(vector, &emb.vector);
                (score >= floor).then(|| ChunkHit { chunk: c.clone(), score })
            })
            .collect();
        sort_hits(&mut hits, limit);
        Ok(hits)
    }

    async fn lexical_rank(
        &self,
        terms: &[String],
        limit: usize,
        filters: &SearchFilters,
    ) -> anyhow::Result<Vec<ChunkHit>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let table = self.inner.read().await;
        let mut hits: Vec<ChunkHit> = table
            .chunks
            .values()
            .filter(|c| c.active && matches_filters(c, filters))
            .filter_map(|c| {
                let score = tf_score(terms, c);
                (score > 0.0).then(|| ChunkHit { chunk: c.clone(), score })
            })
            .collect();
        sort_hits(&mut hits, limit);
        Ok(hits)
    }

    async fn find_by_token(
        &self,
        tokens: &[String],
        limit: usize,
        filters: &SearchFilters,
    ) -> anyhow::Result<Vec<ChunkHit>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
        let table = self.inner.read().await;
        let mut hits: Vec<ChunkHit> = table
            .chunks
            .values()
            .filter(|c| c.active && matches_filters(c, filters))
            .filter_map(|c| {
                let content = c.content.to_lowercase();
                let matched = lowered.iter().filter(|t| content.contains(t.as_str())).count();
                let score = matched as f32;
                (matched > 0).then(|| ChunkHit { chunk: c.clone(), score })
            })
            .collect();
        sort_hits(&mut hits, limit);
        Ok(hits)
    }

    async fn deactivate_missing(&self, doc_id: &str, keep_hashes: &[String]) -> anyhow::Result<usize> {
        let mut table = self.inner.write().await;
        let mut deactivated = 0usize;
        for chunk in table.chunks.values_mut() {
            if chunk.doc_id == doc_id
                && chunk.active
                && !keep_hashes.contains(&chunk.content_hash)
            {
                chunk.active = false;
                deactivated += 1;
            }
        }
        Ok(deactivated)
    }

    async fn increment_usage(&self, ids: &[ChunkId]) -> anyhow::Result<()> {
        let mut table = self.inner.write().await;
        for id in ids {
            if let Some(chunk) = table.chunks.get_mut(id) {
                chunk.usage_count += 1;
            }
        }
        Ok(())
    }

    async fn set_embedding(&self, id: &str, embedding: ChunkEmbedding) -> anyhow::Result<()> {
        let mut table = self.inner.write().await;
        table.embed_errors.remove(id);
        match table.chunks.get_mut(id) {
            Some(chunk) => {
                chunk.embedding = Some(embedding);
                Ok(())
            }
            None => anyhow::bail!("unknown chunk id: {id}"),
        }
    }

    async fn set_embedding_error(&self, id: &str, error: &str) -> anyhow::Result<()> {
        let mut table = self.inner.write().await;
        table.embed_errors.insert(id.to_string(), error.to_string());
        Ok(())
    }

    async fn pending_embedding(&self, backend_id: &str, limit: usize) -> anyhow::Result<Vec<Chunk>> {
        let table = self.inner.read().await;
        let mut pending: Vec<Chunk> = table
            .chunks
            .values()
            .filter(|c| {
                c.active
                    && !c
                        .embedding
                        .as_ref()
                        .is_some_and(|e| e.backend_id == backend_id)
            })
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        pending.truncate(limit);
        Ok(pending)
    }
}

/// Term-frequency score: occurrences of each query term in the chunk,
/// normalized by chunk length, with a small boost for tagged keywords.
fn tf_score(terms: &[String], chunk: &Chunk) -> f32 {
    let chunk_terms = terms_of(&chunk.content);
    if chunk_terms.is_empty() {
        return 0.0;
    }
    let mut freq: HashMap<&str, usize> = HashMap::new();
    for t in &chunk_terms {
        *freq.entry(t.as_str()).or_default() += 1;
    }
    let mut score: f32 = terms
        .iter()
        .map(|t| freq.get(t.as_str()).copied().unwrap_or(0) as f32 / chunk_terms.len() as f32)
        .sum();
    for t in terms {
        if chunk.keywords.iter().any(|k| k == t) {
            score += 0.05;
        }
    }
    score
}

/// TTL map behind a mutex; expired entries are dropped on read.
#[derive(Default)]
pub struct MemoryCacheStore {
    inner: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut map = self.inner.lock().await;
        match map.get(key) {
            Some((value, deadline)) if *deadline > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> anyhow::Result<()> {
        let deadline = Instant::now() + ttl;
        self.inner.lock().await.insert(key.to_string(), (value, deadline));
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.inner.lock().await.remove(key);
        Ok(())
    }
}
