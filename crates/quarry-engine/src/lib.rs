//! Hybrid Retrieval & Ranking Engine.
//!
//! Fan-out over three independent candidate generators (vector, lexical,
//! domain-pattern), identity merge, composite scoring, deduplication and
//! a TTL result cache. Generators fail independently; the request
//! degrades instead of failing while at least one survives.

pub mod domain;
pub mod engine;
pub mod result_cache;
pub mod scoring;

pub use domain::DomainTokenizer;
pub use engine::{GeneratorOutcome, Phase, RetrievalEngine};
pub use result_cache::ResultCache;
pub use scoring::{Candidate, Scorer};
