//! Background embedding fill-in for chunks.
//!
//! Chunks are persisted before their embedding exists; this worker
//! drains the pending set in batches, writes vectors back, and records
//! per-chunk errors without aborting the batch. Failed chunks stay
//! pending and are retried on the next pass. No caller-facing deadline:
//! a chunk without an embedding is valid, just invisible to the vector
//! generator.

use std::sync::Arc;

use quarry_core::traits::ChunkStore;
use quarry_core::types::ChunkEmbedding;
use tracing::{info, warn};

use crate::EmbeddingService;

pub struct EmbeddingBackfill {
    store: Arc<dyn ChunkStore>,
    service: Arc<EmbeddingService>,
    batch_size: usize,
}

impl EmbeddingBackfill {
    pub fn new(store: Arc<dyn ChunkStore>, service: Arc<EmbeddingService>, batch_size: usize) -> Self {
        Self { store, service, batch_size: batch_size.max(1) }
    }

    /// One pass: embed up to `batch_size` pending chunks. Returns the
    /// number of embeddings written.
    pub async fn run_once(&self) -> anyhow::Result<usize> {
        let pending = self
            .store
            .pending_embedding(self.service.backend_id(), self.batch_size)
            .await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = pending.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.service.embed_batch(&texts).await?;

        let mut written = 0usize;
        for (chunk, embedding) in pending.iter().zip(embeddings) {
            if embedding.failed {
                warn!(chunk_id = %chunk.id, "embedding failed, will retry");
                self.store
                    .set_embedding_error(&chunk.id, "backend failed")
                    .await?;
                continue;
            }
            self.store
                .set_embedding(
                    &chunk.id,
                    ChunkEmbedding {
                        backend_id: self.service.backend_id().to_string(),
                        vector: embedding.vector,
                    },
                )
                .await?;
            written += 1;
        }
        info!(written, pending = pending.len(), "backfill pass complete");
        Ok(written)
    }

    /// Run passes until a pass writes nothing. Returns the total count.
    pub async fn drain(&self) -> anyhow::Result<usize> {
        let mut total = 0usize;
        loop {
            let written = self.run_once().await?;
            if written == 0 {
                return Ok(total);
            }
            total += written;
        }
    }
}
