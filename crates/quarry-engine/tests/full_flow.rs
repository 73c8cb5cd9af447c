//! End-to-end flow: index documents through the pipeline, then search
//! through the engine against the same store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::config::{ChunkingConfig, EmbeddingConfig, EngineConfig};
use quarry_core::memory::{MemoryCacheStore, MemoryChunkStore};
use quarry_core::traits::{ChunkStore, EmbeddingBackend, UpsertOutcome};
use quarry_core::types::{
    CallerRole, Chunk, ChunkEmbedding, ChunkHit, ChunkId, ExtractedPage, MatchReason,
    SearchFilters, SearchRequest,
};
use quarry_embed::{EmbeddingService, HashingBackend};
use quarry_engine::RetrievalEngine;
use quarry_index::IndexPipeline;
use quarry_query::QueryAnalyzer;

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

struct World {
    store: Arc<MemoryChunkStore>,
    engine: RetrievalEngine,
    pipeline: IndexPipeline,
}

fn build_world() -> World {
    init_tracing();
    let store = Arc::new(MemoryChunkStore::new());
    let analyzer = Arc::new(QueryAnalyzer::default());
    let embedder = Arc::new(EmbeddingService::new(
        Arc::new(HashingBackend::new(64, 4096)),
        Arc::new(MemoryCacheStore::new()),
        &EmbeddingConfig::default(),
    ));
    let pipeline = IndexPipeline::new(
        store.clone(),
        analyzer.clone(),
        embedder.clone(),
        ChunkingConfig::default(),
    );
    let engine = RetrievalEngine::new(
        store.clone(),
        Arc::new(MemoryCacheStore::new()),
        analyzer,
        embedder,
        EngineConfig::default(),
    )
    .expect("engine");
    World { store, engine, pipeline }
}

async fn seed_corpus(world: &World) {
    let docs = [
        (
            "fin-manual",
            "Invoice Posting\n\nTo post an incoming invoice, open transaction FB01 and \
             enter the vendor invoice data. The posting updates the general ledger \
             account immediately and the payment run picks it up.",
        ),
        (
            "wm-guide",
            "Warehouse Stock\n\nThe warehouse inventory count compares physical stock \
             against the book inventory. Differences are posted as inventory \
             adjustments after approval.",
        ),
        (
            "hr-notes",
            "Payroll Basics\n\nThe payroll run calculates employee salaries including \
             absences and timesheet corrections for the period.",
        ),
    ];
    for (doc_id, text) in docs {
        world
            .pipeline
            .index_document(doc_id, &[ExtractedPage::new(Some(1), text)])
            .await
            .expect("index");
    }
}

#[tokio::test]
async fn empty_query_returns_empty_result_without_error() {
    let world = build_world();
    seed_corpus(&world).await;
    for query in ["", "   ", "\t\n "] {
        let result = world
            .engine
            .search(&SearchRequest::new(query, CallerRole::EndUser))
            .await
            .expect("no error for empty query");
        assert!(result.is_empty());
        assert!(!result.partial);
    }
}

#[tokio::test]
async fn hybrid_search_ranks_relevant_chunks_first() {
    let world = build_world();
    seed_corpus(&world).await;

    let request = SearchRequest::new("how do i post an incoming invoice", CallerRole::EndUser);
    let result = world.engine.search(&request).await.expect("search");
    assert!(!result.is_empty());
    assert_eq!(result.entries[0].doc_id, "fin-manual");

    for entry in &result.entries {
        assert!((0.0..=1.0).contains(&entry.score), "score in unit interval");
        let chunk = world
            .store
            .get(&entry.chunk_id)
            .await
            .expect("get")
            .expect("result id resolves to a chunk");
        assert!(chunk.active, "inactive chunks never surface");
    }
}

#[tokio::test]
async fn repeated_search_is_deterministic() {
    let world = build_world();
    seed_corpus(&world).await;

    let request = SearchRequest::new("warehouse inventory stock count", CallerRole::KeyUser);
    let first = world.engine.search(&request).await.expect("search");
    let second = world.engine.search(&request).await.expect("search");
    let ids = |r: &quarry_core::types::SearchResult| {
        r.entries.iter().map(|e| e.chunk_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second), "same ordered id sequence");

    // Also deterministic without the result cache: a second engine over
    // the same store must produce the same ordering.
    let fresh = RetrievalEngine::new(
        world.store.clone(),
        Arc::new(MemoryCacheStore::new()),
        Arc::new(QueryAnalyzer::default()),
        Arc::new(EmbeddingService::new(
            Arc::new(HashingBackend::new(64, 4096)),
            Arc::new(MemoryCacheStore::new()),
            &EmbeddingConfig::default(),
        )),
        EngineConfig::default(),
    )
    .expect("engine");
    let third = fresh.search(&request).await.expect("search");
    assert_eq!(ids(&first), ids(&third));
}

#[tokio::test]
async fn literal_code_is_found_as_domain_pattern_match() {
    let world = build_world();
    seed_corpus(&world).await;

    // Vector/lexical relevance of this query to the finance chunk is
    // weak; the literal transaction code must still pull it in.
    let request = SearchRequest::new("FB01", CallerRole::Consultant);
    let result = world.engine.search(&request).await.expect("search");
    let entry = result
        .entries
        .iter()
        .find(|e| e.doc_id == "fin-manual")
        .expect("chunk containing the code is returned");
    assert!(entry.domain_match);
    assert!(matches!(entry.reason, MatchReason::DomainPattern | MatchReason::Combined));
}

#[tokio::test]
async fn high_relevance_floor_yields_empty_not_error() {
    let world = build_world();
    seed_corpus(&world).await;

    let mut request = SearchRequest::new("payroll salary overview", CallerRole::EndUser);
    request.min_relevance = 0.99;
    let result = world.engine.search(&request).await.expect("no error");
    assert!(result.is_empty());
}

#[tokio::test]
async fn module_filter_narrows_results() {
    let world = build_world();
    seed_corpus(&world).await;

    let mut request = SearchRequest::new("posting stock inventory", CallerRole::KeyUser);
    request.filters = SearchFilters { module: Some("materials".to_string()), ..Default::default() };
    let result = world.engine.search(&request).await.expect("search");
    assert!(!result.is_empty());
    for entry in &result.entries {
        let chunk = world.store.get(&entry.chunk_id).await.expect("get").expect("chunk");
        assert_eq!(chunk.module.as_deref(), Some("materials"));
    }
}

#[tokio::test]
async fn superseded_chunks_disappear_from_results_even_on_cache_hits() {
    let world = build_world();
    seed_corpus(&world).await;

    // First search populates the result cache with the payroll chunk.
    let request = SearchRequest::new("employee payroll salaries", CallerRole::EndUser);
    let before = world.engine.search(&request).await.expect("search");
    let old_ids: Vec<_> = before
        .entries
        .iter()
        .filter(|e| e.doc_id == "hr-notes")
        .map(|e| e.chunk_id.clone())
        .collect();
    assert!(!old_ids.is_empty());

    // Re-ingest the payroll doc with unrelated content; the cached
    // response now references deactivated chunks.
    world
        .pipeline
        .index_document(
            "hr-notes",
            &[ExtractedPage::new(
                Some(1),
                "Org Chart\n\nThe organizational chart shows reporting lines between \
                 departments and their cost centers for planning purposes.",
            )],
        )
        .await
        .expect("reindex");

    // Same engine, same request: the stale cache entry must not be
    // replayed.
    let after = world.engine.search(&request).await.expect("search");
    for entry in &after.entries {
        assert!(!old_ids.contains(&entry.chunk_id), "deactivated chunk replayed from cache");
        let chunk = world.store.get(&entry.chunk_id).await.expect("get").expect("chunk");
        assert!(chunk.active);
    }
}

#[tokio::test]
async fn usage_counter_moves_once_per_returning_request() {
    let world = build_world();
    seed_corpus(&world).await;

    let request = SearchRequest::new("invoice posting FB01 payment", CallerRole::EndUser);
    let result = world.engine.search(&request).await.expect("search");
    assert!(!result.is_empty());
    let top = &result.entries[0];

    // The chunk was likely proposed by several generators; the counter
    // still moves by exactly one.
    let chunk = world.store.get(&top.chunk_id).await.expect("get").expect("chunk");
    assert_eq!(chunk.usage_count, 1);
}

/// Backend that always fails; stands in for an embedding outage.
struct DownBackend {
    inner: HashingBackend,
}

#[async_trait]
impl EmbeddingBackend for DownBackend {
    fn id(&self) -> &str {
        self.inner.id()
    }
    fn dim(&self) -> usize {
        self.inner.dim()
    }
    fn max_input_len(&self) -> usize {
        self.inner.max_input_len()
    }
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("embedding backend down")
    }
}

#[tokio::test]
async fn query_embedding_outage_degrades_to_lexical_and_domain() {
    let world = build_world();
    seed_corpus(&world).await;

    // Same store, but the engine's embedder can no longer embed queries.
    let engine = RetrievalEngine::new(
        world.store.clone(),
        Arc::new(MemoryCacheStore::new()),
        Arc::new(QueryAnalyzer::default()),
        Arc::new(EmbeddingService::new(
            Arc::new(DownBackend { inner: HashingBackend::new(64, 4096) }),
            Arc::new(MemoryCacheStore::new()),
            &EmbeddingConfig::default(),
        )),
        EngineConfig::default(),
    )
    .expect("engine");

    let result = engine
        .search(&SearchRequest::new("post an incoming invoice", CallerRole::EndUser))
        .await
        .expect("degraded search still answers");
    assert!(result.partial, "vector generator loss is flagged");
    assert!(!result.is_empty());
    for entry in &result.entries {
        assert!(entry.vector_score.is_none(), "no vector signal without a query embedding");
    }
}

/// Store wrapper with per-generator kill switches.
struct SwitchedStore {
    inner: Arc<MemoryChunkStore>,
    fail_vector: AtomicBool,
    fail_lexical: AtomicBool,
    fail_domain: AtomicBool,
}

impl SwitchedStore {
    fn new(inner: Arc<MemoryChunkStore>) -> Self {
        Self {
            inner,
            fail_vector: AtomicBool::new(false),
            fail_lexical: AtomicBool::new(false),
            fail_domain: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ChunkStore for SwitchedStore {
    async fn upsert_by_hash(&self, chunk: Chunk) -> anyhow::Result<UpsertOutcome> {
        self.inner.upsert_by_hash(chunk).await
    }
    async fn get(&self, id: &str) -> anyhow::Result<Option<Chunk>> {
        self.inner.get(id).await
    }
    async fn nearest_neighbors(
        &self,
        vector: &[f32],
        backend_id: &str,
        limit: usize,
        floor: f32,
        filters: &SearchFilters,
    ) -> anyhow::Result<Vec<ChunkHit>> {
        if self.fail_vector.load(Ordering::SeqCst) {
            anyhow::bail!("vector index offline");
        }
        self.inner.nearest_neighbors(vector, backend_id, limit, floor, filters).await
    }
    async fn lexical_rank(
        &self,
        terms: &[String],
        limit: usize,
        filters: &SearchFilters,
    ) -> anyhow::Result<Vec<ChunkHit>> {
        if self.fail_lexical.load(Ordering::SeqCst) {
            anyhow::bail!("lexical index offline");
        }
        self.inner.lexical_rank(terms, limit, filters).await
    }
    async fn find_by_token(
        &self,
        tokens: &[String],
        limit: usize,
        filters: &SearchFilters,
    ) -> anyhow::Result<Vec<ChunkHit>> {
        if self.fail_domain.load(Ordering::SeqCst) {
            anyhow::bail!("token index offline");
        }
        self.inner.find_by_token(tokens, limit, filters).await
    }
    async fn deactivate_missing(&self, doc_id: &str, keep: &[String]) -> anyhow::Result<usize> {
        self.inner.deactivate_missing(doc_id, keep).await
    }
    async fn increment_usage(&self, ids: &[ChunkId]) -> anyhow::Result<()> {
        self.inner.increment_usage(ids).await
    }
    async fn set_embedding(&self, id: &str, embedding: ChunkEmbedding) -> anyhow::Result<()> {
        self.inner.set_embedding(id, embedding).await
    }
    async fn set_embedding_error(&self, id: &str, error: &str) -> anyhow::Result<()> {
        self.inner.set_embedding_error(id, error).await
    }
    async fn pending_embedding(&self, backend_id: &str, limit: usize) -> anyhow::Result<Vec<Chunk>> {
        self.inner.pending_embedding(backend_id, limit).await
    }
}

fn switched_world() -> (Arc<SwitchedStore>, RetrievalEngine, IndexPipeline) {
    init_tracing();
    let inner = Arc::new(MemoryChunkStore::new());
    let store = Arc::new(SwitchedStore::new(inner));
    let analyzer = Arc::new(QueryAnalyzer::default());
    let embedder = Arc::new(EmbeddingService::new(
        Arc::new(HashingBackend::new(64, 4096)),
        Arc::new(MemoryCacheStore::new()),
        &EmbeddingConfig::default(),
    ));
    let pipeline = IndexPipeline::new(
        store.clone(),
        analyzer.clone(),
        embedder.clone(),
        ChunkingConfig::default(),
    );
    let engine = RetrievalEngine::new(
        store.clone(),
        Arc::new(MemoryCacheStore::new()),
        analyzer,
        embedder,
        EngineConfig::default(),
    )
    .expect("engine");
    (store, engine, pipeline)
}

#[tokio::test]
async fn single_generator_failure_degrades_to_partial_result() {
    let (store, engine, pipeline) = switched_world();
    pipeline
        .index_document(
            "doc",
            &[ExtractedPage::new(
                Some(1),
                "Invoice Posting\n\nPost the incoming invoice with transaction FB01 and \
                 check the payment ledger afterwards for the open item.",
            )],
        )
        .await
        .expect("index");

    store.fail_vector.store(true, Ordering::SeqCst);
    let result = engine
        .search(&SearchRequest::new("post invoice FB01", CallerRole::EndUser))
        .await
        .expect("degraded search still answers");
    assert!(result.partial, "degradation is flagged");
    assert!(!result.is_empty(), "lexical and domain generators still match");
}

#[tokio::test]
async fn all_generators_failing_surfaces_retrieval_error() {
    let (store, engine, pipeline) = switched_world();
    pipeline
        .index_document(
            "doc",
            &[ExtractedPage::new(
                Some(1),
                "Invoice Posting\n\nPost the incoming invoice with transaction FB01 and \
                 check the payment ledger afterwards for the open item.",
            )],
        )
        .await
        .expect("index");

    store.fail_vector.store(true, Ordering::SeqCst);
    store.fail_lexical.store(true, Ordering::SeqCst);
    store.fail_domain.store(true, Ordering::SeqCst);

    // The query carries a code so the domain generator actually hits
    // the (failing) store instead of short-circuiting on no tokens.
    let err = engine
        .search(&SearchRequest::new("post invoice FB01", CallerRole::EndUser))
        .await
        .expect_err("no generator left");
    assert!(matches!(err, quarry_core::error::RetrievalError::AllGeneratorsFailed));
}
