//! Chunking/indexing pipeline: extracted pages in, tagged chunks out.
//!
//! Pages of one document are processed concurrently under a bounded
//! pool; documents are independent units of work. The pipeline is the
//! only writer of the chunk store, and every write goes through the
//! content-hash upsert, so re-indexing identical text is idempotent and
//! superseded chunks are soft-deactivated, never deleted.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use quarry_core::config::ChunkingConfig;
use quarry_core::splitter::{split_text, SplitterConfig};
use quarry_core::text::{content_hash, normalize_text};
use quarry_core::traits::{ChunkStore, UpsertOutcome};
use quarry_core::types::{Chunk, ChunkEmbedding, ExtractedPage, IndexSummary};
use quarry_embed::EmbeddingService;
use quarry_query::QueryAnalyzer;
use tracing::{debug, info, warn};

pub struct IndexPipeline {
    store: Arc<dyn ChunkStore>,
    analyzer: Arc<QueryAnalyzer>,
    embedder: Arc<EmbeddingService>,
    config: ChunkingConfig,
}

#[derive(Default)]
struct PageOutcome {
    created: usize,
    reused: usize,
    hashes: Vec<String>,
    skipped: bool,
}

impl IndexPipeline {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        analyzer: Arc<QueryAnalyzer>,
        embedder: Arc<EmbeddingService>,
        config: ChunkingConfig,
    ) -> Self {
        Self { store, analyzer, embedder, config }
    }

    /// Index (or re-index) one document from its extracted pages.
    ///
    /// Page failures are absorbed per page: one bad page never aborts
    /// the rest of the document.
    pub async fn index_document(
        &self,
        doc_id: &str,
        pages: &[ExtractedPage],
    ) -> anyhow::Result<IndexSummary> {
        let mut summary = IndexSummary::default();
        let mut keep_hashes: Vec<String> = Vec::new();

        let outcomes: Vec<anyhow::Result<PageOutcome>> = stream::iter(
            pages
                .iter()
                .enumerate()
                .map(|(i, page)| self.process_page(doc_id, i, page)),
        )
        .buffer_unordered(self.config.max_concurrent_pages.max(1))
        .collect()
        .await;

        for outcome in outcomes {
            match outcome {
                Ok(page) => {
                    summary.chunks_created += page.created;
                    summary.chunks_reused += page.reused;
                    if page.skipped {
                        summary.pages_skipped += 1;
                    }
                    keep_hashes.extend(page.hashes);
                }
                Err(e) => {
                    warn!(doc_id, error = %e, "page failed, continuing");
                    summary.pages_failed += 1;
                }
            }
        }

        // Chunks of a previous version whose text no longer occurs are
        // deactivated. Skip this when every page failed, otherwise a
        // transient store error would hide the whole document.
        if summary.pages_failed < pages.len() || pages.is_empty() {
            summary.chunks_deactivated =
                self.store.deactivate_missing(doc_id, &keep_hashes).await?;
        }

        info!(
            doc_id,
            created = summary.chunks_created,
            reused = summary.chunks_reused,
            deactivated = summary.chunks_deactivated,
            "document indexed"
        );
        Ok(summary)
    }

    async fn process_page(
        &self,
        doc_id: &str,
        page_index: usize,
        page: &ExtractedPage,
    ) -> anyhow::Result<PageOutcome> {
        let mut outcome = PageOutcome::default();

        if normalize_text(&page.text).chars().count() < self.config.min_page_len {
            debug!(doc_id, page_index, "page below minimum length, skipped");
            outcome.skipped = true;
            return Ok(outcome);
        }

        let page_number = page.page_number.unwrap_or(page_index as u32);
        let splitter = SplitterConfig {
            target_size: self.config.target_size,
            overlap: self.config.overlap,
            min_chunk_len: self.config.min_chunk_len,
        };

        for (seq, text) in split_text(&page.text, &splitter).into_iter().enumerate() {
            let analysis = self.analyzer.analyze(&text);
            let hash = content_hash(&text);
            // The hash prefix keeps ids of superseded versions distinct:
            // a re-indexed page must never overwrite the inactive rows
            // of its predecessor.
            let chunk = Chunk {
                id: format!("{doc_id}:{page_number}:{seq}:{}", &hash[..8]),
                doc_id: doc_id.to_string(),
                section_title: section_title_of(&text),
                content_hash: hash.clone(),
                page: Some(page_number),
                module: analysis.modules.first().cloned(),
                technical_level: analysis.technical_level,
                language: analysis.language,
                keywords: analysis.keywords,
                usage_count: 0,
                base_relevance: self.config.default_base_relevance,
                embedding: None,
                active: true,
                ingested_at: chrono::Utc::now(),
                content: text,
            };
            let id = chunk.id.clone();
            let content = chunk.content.clone();
            match self.store.upsert_by_hash(chunk).await? {
                UpsertOutcome::Created => {
                    outcome.created += 1;
                    // Best-effort: a failure here leaves the chunk
                    // pending for the backfill worker.
                    match self.embedder.embed(&content).await {
                        Ok(vector) => {
                            let embedding = ChunkEmbedding {
                                backend_id: self.embedder.backend_id().to_string(),
                                vector,
                            };
                            if let Err(e) = self.store.set_embedding(&id, embedding).await {
                                warn!(chunk_id = %id, error = %e, "embedding write failed");
                            }
                        }
                        Err(e) => {
                            warn!(chunk_id = %id, error = %e, "embedding deferred to backfill");
                        }
                    }
                }
                UpsertOutcome::Reused(_) | UpsertOutcome::Reactivated(_) => {
                    outcome.reused += 1;
                }
            }
            outcome.hashes.push(hash);
        }
        Ok(outcome)
    }
}

/// A short first line that does not read like prose is kept as the
/// section title.
fn section_title_of(text: &str) -> Option<String> {
    let first = text.lines().next()?.trim();
    if first.is_empty() || first.len() > 60 || first.ends_with('.') {
        return None;
    }
    Some(first.to_string())
}
