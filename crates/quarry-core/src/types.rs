//! Domain types shared by the query, embedding, indexing and engine crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ChunkId = String;

/// Embedding vector together with the identity of the backend that
/// produced it. A chunk never mixes vectors from different backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkEmbedding {
    pub backend_id: String,
    pub vector: Vec<f32>,
}

/// Supported corpus/query languages. `Unknown` is a valid detection
/// outcome, not an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Language {
    En,
    De,
    Unknown,
}

/// Technical register of a text or of the person asking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TechnicalLevel {
    Beginner,
    Intermediate,
    Expert,
}

/// Role of the caller issuing a search, used for the affinity bonus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CallerRole {
    EndUser,
    KeyUser,
    Consultant,
    Developer,
}

/// Coarse intent category detected from the query phrasing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Intent {
    HowTo,
    ErrorResolution,
    Definition,
    Navigation,
    General,
}

/// The atomic retrievable unit: a tagged slice of an ingested document.
///
/// `content_hash` is the blake3 digest of the normalized content and is
/// unique per distinct normalized text (the store's upsert enforces it).
/// `embedding` may lag creation; a chunk without one is valid but
/// invisible to the vector generator. Inactive chunks are excluded from
/// every retrieval path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub doc_id: String,
    pub content: String,
    pub content_hash: String,
    pub page: Option<u32>,
    pub section_title: Option<String>,
    pub module: Option<String>,
    pub technical_level: TechnicalLevel,
    pub language: Language,
    pub keywords: Vec<String>,
    pub usage_count: u64,
    pub base_relevance: f32,
    pub embedding: Option<ChunkEmbedding>,
    pub active: bool,
    pub ingested_at: DateTime<Utc>,
}

/// One unit of extracted text handed to the indexing pipeline by the
/// (external) document extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub page_number: Option<u32>,
    pub text: String,
    pub char_count: usize,
}

impl ExtractedPage {
    pub fn new(page_number: Option<u32>, text: impl Into<String>) -> Self {
        let text = text.into();
        let char_count = text.chars().count();
        Self { page_number, text, char_count }
    }
}

/// Optional narrowing applied uniformly by all candidate generators.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SearchFilters {
    pub module: Option<String>,
    pub technical_level: Option<TechnicalLevel>,
    pub language: Option<Language>,
}

/// A fully-specified search call. Not persisted.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub caller_role: CallerRole,
    pub filters: SearchFilters,
    pub limit: usize,
    pub min_relevance: f32,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, caller_role: CallerRole) -> Self {
        Self {
            query: query.into(),
            caller_role,
            filters: SearchFilters::default(),
            limit: 10,
            min_relevance: 0.0,
        }
    }
}

/// Which strategy (or combination) produced a returned entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchReason {
    Vector,
    Keyword,
    DomainPattern,
    Combined,
}

/// One ranked passage in a search response, with the per-signal
/// sub-scores that went into the composite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchEntry {
    pub chunk_id: ChunkId,
    pub doc_id: String,
    pub content: String,
    pub vector_score: Option<f32>,
    pub lexical_score: Option<f32>,
    pub domain_match: bool,
    pub score: f32,
    pub reason: MatchReason,
}

/// Ordered search response. `partial` is set when at least one candidate
/// generator failed and the ranking was produced from the survivors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub entries: Vec<SearchEntry>,
    pub partial: bool,
}

impl SearchResult {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of the query analyzer. Always produced, never an error:
/// garbage input yields the low-confidence default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub language: Language,
    pub modules: Vec<String>,
    pub technical_level: TechnicalLevel,
    pub intent: Intent,
    pub keywords: Vec<String>,
    pub confidence: f32,
}

impl Default for QueryAnalysis {
    fn default() -> Self {
        Self {
            language: Language::Unknown,
            modules: Vec::new(),
            technical_level: TechnicalLevel::Intermediate,
            intent: Intent::General,
            keywords: Vec::new(),
            confidence: 0.0,
        }
    }
}

/// A chunk scored by a single candidate generator. `score` is
/// generator-specific but higher is always better.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Summary returned by the indexing pipeline for one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSummary {
    pub chunks_created: usize,
    pub chunks_reused: usize,
    pub chunks_deactivated: usize,
    pub pages_skipped: usize,
    pub pages_failed: usize,
}
