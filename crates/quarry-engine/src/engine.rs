//! The hybrid retrieval engine: three-way candidate fan-out, fusion,
//! composite scoring and ranked output.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use quarry_core::config::EngineConfig;
use quarry_core::error::{Result, RetrievalError};
use quarry_core::text::{normalize_text, terms_of};
use quarry_core::traits::{CacheStore, ChunkStore};
use quarry_core::types::{
    ChunkHit, ChunkId, QueryAnalysis, SearchEntry, SearchFilters, SearchRequest, SearchResult,
};
use quarry_embed::EmbeddingService;
use quarry_query::QueryAnalyzer;
use tracing::{debug, warn};

use crate::domain::DomainTokenizer;
use crate::result_cache::ResultCache;
use crate::scoring::{Candidate, Scorer};

/// Request phases, for tracing and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    Analyzing,
    FanningOut,
    Merging,
    Scoring,
    Filtering,
    Done,
}

/// Explicit per-generator result consumed by the merge step. A failed
/// generator contributes an empty candidate set; it never aborts the
/// request unless all three fail.
#[derive(Debug)]
pub enum GeneratorOutcome {
    Hits(Vec<ChunkHit>),
    Failed(String),
}

impl GeneratorOutcome {
    fn failed(&self) -> bool {
        matches!(self, GeneratorOutcome::Failed(_))
    }

    fn hits(self) -> Vec<ChunkHit> {
        match self {
            GeneratorOutcome::Hits(hits) => hits,
            GeneratorOutcome::Failed(_) => Vec::new(),
        }
    }
}

pub struct RetrievalEngine {
    store: Arc<dyn ChunkStore>,
    analyzer: Arc<QueryAnalyzer>,
    embedder: Arc<EmbeddingService>,
    result_cache: ResultCache,
    tokenizer: DomainTokenizer,
    scorer: Scorer,
    config: EngineConfig,
}

impl RetrievalEngine {
    /// All collaborators are injected; tests substitute in-memory fakes.
    pub fn new(
        store: Arc<dyn ChunkStore>,
        cache_store: Arc<dyn CacheStore>,
        analyzer: Arc<QueryAnalyzer>,
        embedder: Arc<EmbeddingService>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.scoring.validate()?;
        let result_cache =
            ResultCache::new(cache_store, Duration::from_secs(config.result_cache_ttl_secs));
        Ok(Self {
            store,
            analyzer,
            embedder,
            result_cache,
            tokenizer: DomainTokenizer::new(),
            scorer: Scorer::new(config.scoring.clone()),
            config,
        })
    }

    /// The sole public entry point of the retrieval core.
    ///
    /// Degrades rather than fails: a broken generator or cache still
    /// yields a ranked (possibly `partial`) result; only the loss of all
    /// three generators surfaces as an error. An empty query returns an
    /// empty result, not an error.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        debug!(phase = ?Phase::Received, query = %request.query);
        let query = normalize_text(&request.query);
        if query.is_empty() {
            return Ok(SearchResult::default());
        }

        // A hit is only replayed if every referenced chunk is still
        // active: a re-index inside the TTL window may have deactivated
        // chunks after the cache write.
        if let Some(cached) = self.result_cache.get(request).await {
            if self.entries_still_active(&cached).await {
                self.record_usage(&cached).await;
                return Ok(cached);
            }
            debug!("cached result references deactivated chunks, recomputing");
            self.result_cache.invalidate(request).await;
        }

        debug!(phase = ?Phase::Analyzing);
        let analysis = self.analyzer.analyze(&query);
        let query_vector = match self.embedder.embed(&query).await {
            Ok(v) => Some(v),
            Err(e) => {
                // Recoverable during search: vector retrieval drops out,
                // lexical and domain continue.
                warn!(error = %e, "query embedding failed, degrading to lexical+domain");
                None
            }
        };

        debug!(phase = ?Phase::FanningOut);
        let candidate_limit = request.limit.max(1) * self.config.candidate_multiplier.max(1);
        let time_box = Duration::from_millis(self.config.generator_timeout_ms);

        let (vector, lexical, domain) = tokio::join!(
            bounded("vector", time_box, self.vector_candidates(
                query_vector.as_deref(),
                candidate_limit,
                &request.filters,
            )),
            bounded("lexical", time_box, self.lexical_candidates(
                &query,
                &analysis,
                candidate_limit,
                &request.filters,
            )),
            bounded("domain", time_box, self.domain_candidates(
                &request.query,
                &analysis,
                candidate_limit,
                &request.filters,
            )),
        );

        let partial = vector.failed() || lexical.failed() || domain.failed();
        if vector.failed() && lexical.failed() && domain.failed() {
            return Err(RetrievalError::AllGeneratorsFailed);
        }

        debug!(phase = ?Phase::Merging);
        let candidates = merge(vector.hits(), lexical.hits(), domain.hits());

        debug!(phase = ?Phase::Scoring, candidates = candidates.len());
        let triggers = self.analyzer.intent_triggers(analysis.intent);
        let now = Utc::now();
        let mut entries: Vec<SearchEntry> = candidates
            .into_iter()
            .map(|c| {
                let score = self.scorer.score(&c, &analysis, request.caller_role, &triggers, now);
                SearchEntry {
                    chunk_id: c.chunk.id.clone(),
                    doc_id: c.chunk.doc_id.clone(),
                    content: c.chunk.content.clone(),
                    vector_score: c.vector_score,
                    lexical_score: c.lexical_score,
                    domain_match: c.domain_match,
                    score,
                    reason: c.reason(),
                }
            })
            .collect();

        debug!(phase = ?Phase::Filtering);
        entries.retain(|e| e.score >= request.min_relevance);
        entries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        entries = self.dedupe_by_content(entries).await;
        entries.truncate(request.limit);

        let result = SearchResult { entries, partial };
        self.record_usage(&result).await;
        self.result_cache.put(request, &result).await;
        debug!(phase = ?Phase::Done, returned = result.entries.len(), partial);
        Ok(result)
    }

    async fn vector_candidates(
        &self,
        query_vector: Option<&[f32]>,
        limit: usize,
        filters: &SearchFilters,
    ) -> anyhow::Result<Vec<ChunkHit>> {
        let Some(vector) = query_vector else {
            anyhow::bail!("query embedding unavailable");
        };
        self.store
            .nearest_neighbors(
                vector,
                self.embedder.backend_id(),
                limit,
                self.config.similarity_floor,
                filters,
            )
            .await
    }

    async fn lexical_candidates(
        &self,
        query: &str,
        analysis: &QueryAnalysis,
        limit: usize,
        filters: &SearchFilters,
    ) -> anyhow::Result<Vec<ChunkHit>> {
        // Keywords are the stopword-free term set; fall back to raw
        // terms when the whole query was stopwords.
        let terms = if analysis.keywords.is_empty() {
            terms_of(query)
        } else {
            analysis.keywords.clone()
        };
        self.store.lexical_rank(&terms, limit, filters).await
    }

    async fn domain_candidates(
        &self,
        raw_query: &str,
        analysis: &QueryAnalysis,
        limit: usize,
        filters: &SearchFilters,
    ) -> anyhow::Result<Vec<ChunkHit>> {
        let mut tokens = self.tokenizer.extract(raw_query);
        let lowered = raw_query.to_lowercase();
        for module in &analysis.modules {
            for term in self.analyzer.module_vocabulary(module) {
                if lowered.contains(&term) && !tokens.iter().any(|t| t.eq_ignore_ascii_case(&term))
                {
                    tokens.push(term);
                }
            }
        }
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        self.store.find_by_token(&tokens, limit, filters).await
    }

    /// A cached result is stale once any of its chunks was deactivated
    /// or removed. Store errors count as stale; recomputing is always
    /// safe.
    async fn entries_still_active(&self, result: &SearchResult) -> bool {
        for entry in &result.entries {
            match self.store.get(&entry.chunk_id).await {
                Ok(Some(chunk)) if chunk.active => {}
                _ => return false,
            }
        }
        true
    }

    /// Duplicate content collapses to one entry; entries arrive sorted,
    /// so the first (best-scored) occurrence wins.
    async fn dedupe_by_content(&self, entries: Vec<SearchEntry>) -> Vec<SearchEntry> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let hash = match self.store.get(&entry.chunk_id).await {
                Ok(Some(chunk)) => chunk.content_hash,
                // Fall back to hashing the carried content.
                _ => quarry_core::text::content_hash(&entry.content),
            };
            if seen.insert(hash) {
                out.push(entry);
            }
        }
        out
    }

    /// Each returned chunk's usage counter moves exactly once per
    /// request, regardless of how many generators proposed it. Failure
    /// here never fails the search.
    async fn record_usage(&self, result: &SearchResult) {
        if result.entries.is_empty() {
            return;
        }
        let ids: Vec<ChunkId> = result.entries.iter().map(|e| e.chunk_id.clone()).collect();
        if let Err(e) = self.store.increment_usage(&ids).await {
            warn!(error = %e, "usage increment failed");
        }
    }
}

/// Time-box one generator; a timeout or error becomes a local failure.
async fn bounded<F>(name: &'static str, time_box: Duration, fut: F) -> GeneratorOutcome
where
    F: Future<Output = anyhow::Result<Vec<ChunkHit>>>,
{
    match tokio::time::timeout(time_box, fut).await {
        Ok(Ok(hits)) => GeneratorOutcome::Hits(hits),
        Ok(Err(e)) => {
            warn!(generator = name, error = %e, "generator failed, excluded from fusion");
            GeneratorOutcome::Failed(e.to_string())
        }
        Err(_) => {
            warn!(generator = name, "generator timed out, excluded from fusion");
            GeneratorOutcome::Failed("timed out".to_string())
        }
    }
}

/// Merge generator hits by chunk id, accumulating one sub-score per
/// generator. Completion order does not matter: each generator writes
/// its own field. Lexical scores are normalized over the candidate set.
fn merge(vector: Vec<ChunkHit>, lexical: Vec<ChunkHit>, domain: Vec<ChunkHit>) -> Vec<Candidate> {
    let mut by_id: HashMap<ChunkId, Candidate> = HashMap::new();

    for hit in vector {
        by_id
            .entry(hit.chunk.id.clone())
            .or_insert_with(|| Candidate {
                chunk: hit.chunk.clone(),
                vector_score: None,
                lexical_score: None,
                domain_match: false,
            })
            .vector_score = Some(hit.score.clamp(0.0, 1.0));
    }

    let lexical_max = lexical
        .iter()
        .map(|h| h.score)
        .fold(0.0f32, f32::max);
    for hit in lexical {
        let normalized = if lexical_max > 0.0 { hit.score / lexical_max } else { 0.0 };
        by_id
            .entry(hit.chunk.id.clone())
            .or_insert_with(|| Candidate {
                chunk: hit.chunk.clone(),
                vector_score: None,
                lexical_score: None,
                domain_match: false,
            })
            .lexical_score = Some(normalized);
    }

    for hit in domain {
        by_id
            .entry(hit.chunk.id.clone())
            .or_insert_with(|| Candidate {
                chunk: hit.chunk.clone(),
                vector_score: None,
                lexical_score: None,
                domain_match: false,
            })
            .domain_match = true;
    }

    by_id.into_values().collect()
}
