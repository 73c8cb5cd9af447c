//! Configuration loader and typed settings sections.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*`
//! env vars. Every section has a complete `Default`, so the core runs
//! with no config file at all.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::env;

use crate::error::{RetrievalError, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract a section, falling back to its default when the key is
    /// absent from every merged source.
    pub fn section<T>(&self, key: &str) -> T
    where
        T: serde::de::DeserializeOwned + Default,
    {
        self.figment.extract_inner(key).unwrap_or_default()
    }

    pub fn chunking(&self) -> ChunkingConfig {
        self.section("chunking")
    }

    pub fn engine(&self) -> EngineConfig {
        self.section("engine")
    }

    pub fn embedding(&self) -> EmbeddingConfig {
        self.section("embedding")
    }
}

/// Settings of the chunking/indexing pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub target_size: usize,
    pub overlap: usize,
    pub min_chunk_len: usize,
    /// Pages shorter than this (after normalization) are skipped.
    pub min_page_len: usize,
    /// Bounded worker pool for pages of one document.
    pub max_concurrent_pages: usize,
    pub default_base_relevance: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: 1000,
            overlap: 200,
            min_chunk_len: 50,
            min_page_len: 30,
            max_concurrent_pages: 4,
            default_base_relevance: 0.5,
        }
    }
}

/// Weights and bonus caps of the composite relevance score.
///
/// The additive weights sum to 1.0 so the pre-bonus score stays in
/// [0,1]; bonuses are multiplicative and the final score is clamped.
/// Exact magnitudes are tuning choices, only bounds are contractual.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub vector_weight: f32,
    pub lexical_weight: f32,
    pub domain_weight: f32,
    pub base_weight: f32,
    pub module_boost: f32,
    pub level_boost: f32,
    pub popularity_boost_max: f32,
    /// Usage count at which the popularity bonus saturates.
    pub popularity_cap: u64,
    pub recency_boost_max: f32,
    /// Recency bonus decays linearly to zero at this age.
    pub recency_horizon_days: i64,
    pub intent_boost: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.5,
            lexical_weight: 0.25,
            domain_weight: 0.15,
            base_weight: 0.10,
            module_boost: 0.10,
            level_boost: 0.05,
            popularity_boost_max: 0.05,
            popularity_cap: 100,
            recency_boost_max: 0.05,
            recency_horizon_days: 180,
            intent_boost: 0.05,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        let sum = self.vector_weight + self.lexical_weight + self.domain_weight + self.base_weight;
        if !(0.999..=1.001).contains(&sum) {
            return Err(RetrievalError::InvalidConfig(format!(
                "additive score weights must sum to 1.0, got {sum}"
            )));
        }
        if self.popularity_cap == 0 || self.recency_horizon_days <= 0 {
            return Err(RetrievalError::InvalidConfig(
                "popularity_cap and recency_horizon_days must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings of the retrieval engine and its generators.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cosine similarity floor of the vector generator.
    pub similarity_floor: f32,
    /// Per-generator candidate limit = multiplier x requested limit.
    pub candidate_multiplier: usize,
    /// Independent time box per generator; a timeout counts as a
    /// generator failure, not a request failure.
    pub generator_timeout_ms: u64,
    pub result_cache_ttl_secs: u64,
    pub scoring: ScoringConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_floor: 0.25,
            candidate_multiplier: 2,
            generator_timeout_ms: 2000,
            result_cache_ttl_secs: 300,
            scoring: ScoringConfig::default(),
        }
    }
}

/// Settings of the embedding service and backfill worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub cache_ttl_secs: u64,
    pub backfill_batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { cache_ttl_secs: 7 * 24 * 3600, backfill_batch_size: 32 }
    }
}
