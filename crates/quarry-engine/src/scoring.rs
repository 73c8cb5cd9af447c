//! Composite relevance scoring.
//!
//! Additive part: vector similarity (largest weight), normalized lexical
//! rank, fixed domain-match weight, stored base relevance (smallest
//! weight). The weights sum to 1.0, so the additive score is already in
//! [0,1]. Multiplicative bonuses are applied in a fixed order and the
//! final value is clamped, so it never leaves [0,1].

use chrono::{DateTime, Utc};
use quarry_core::config::ScoringConfig;
use quarry_core::types::{CallerRole, Chunk, MatchReason, QueryAnalysis, TechnicalLevel};

/// One merged candidate: a chunk plus the sub-score of every generator
/// that proposed it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Chunk,
    pub vector_score: Option<f32>,
    /// Lexical rank normalized over the candidate set, in [0,1].
    pub lexical_score: Option<f32>,
    pub domain_match: bool,
}

impl Candidate {
    pub fn reason(&self) -> MatchReason {
        let signals = usize::from(self.vector_score.is_some())
            + usize::from(self.lexical_score.is_some())
            + usize::from(self.domain_match);
        if signals > 1 {
            return MatchReason::Combined;
        }
        if self.vector_score.is_some() {
            MatchReason::Vector
        } else if self.lexical_score.is_some() {
            MatchReason::Keyword
        } else {
            MatchReason::DomainPattern
        }
    }
}

pub struct Scorer {
    cfg: ScoringConfig,
}

impl Scorer {
    pub fn new(cfg: ScoringConfig) -> Self {
        Self { cfg }
    }

    /// Deterministic composite score in [0,1].
    ///
    /// `intent_triggers` are the trigger words of the query's intent;
    /// `now` is passed in so a whole request scores against one instant.
    pub fn score(
        &self,
        candidate: &Candidate,
        analysis: &QueryAnalysis,
        caller_role: CallerRole,
        intent_triggers: &[String],
        now: DateTime<Utc>,
    ) -> f32 {
        let cfg = &self.cfg;
        let chunk = &candidate.chunk;

        let vector = candidate.vector_score.unwrap_or(0.0).clamp(0.0, 1.0);
        let lexical = candidate.lexical_score.unwrap_or(0.0).clamp(0.0, 1.0);
        let domain = if candidate.domain_match { 1.0 } else { 0.0 };
        let base = chunk.base_relevance.clamp(0.0, 1.0);

        let mut score = cfg.vector_weight * vector
            + cfg.lexical_weight * lexical
            + cfg.domain_weight * domain
            + cfg.base_weight * base;

        // Bonus order is part of the contract; each factor is >= 1.
        if let Some(module) = &chunk.module {
            if analysis.modules.iter().any(|m| m == module) {
                score *= 1.0 + cfg.module_boost;
            }
        }
        if chunk.technical_level == analysis.technical_level {
            score *= 1.0 + cfg.level_boost;
        }
        score *= 1.0 + role_affinity(caller_role, chunk.technical_level);
        score *= 1.0 + self.popularity_bonus(chunk.usage_count);
        score *= 1.0 + self.recency_bonus(chunk.ingested_at, now);
        if !intent_triggers.is_empty() {
            let content = chunk.content.to_lowercase();
            if intent_triggers.iter().any(|t| content.contains(t.as_str())) {
                score *= 1.0 + cfg.intent_boost;
            }
        }

        score.clamp(0.0, 1.0)
    }

    /// Monotonic in usage, saturates at `popularity_cap`.
    fn popularity_bonus(&self, usage_count: u64) -> f32 {
        let cfg = &self.cfg;
        let capped = usage_count.min(cfg.popularity_cap) as f32;
        cfg.popularity_boost_max * (capped / cfg.popularity_cap as f32)
    }

    /// Linear decay to zero at the horizon; clamped for clock skew.
    fn recency_bonus(&self, ingested_at: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
        let cfg = &self.cfg;
        let age_days = (now - ingested_at).num_days();
        let horizon = cfg.recency_horizon_days;
        let freshness = 1.0 - (age_days.clamp(0, horizon) as f32 / horizon as f32);
        cfg.recency_boost_max * freshness
    }
}

/// Fixed caller-role x chunk-level preference table.
fn role_affinity(role: CallerRole, level: TechnicalLevel) -> f32 {
    use CallerRole::{Consultant, Developer, EndUser, KeyUser};
    use TechnicalLevel::{Beginner, Expert, Intermediate};
    match (role, level) {
        (EndUser, Beginner) | (Developer, Expert) => 0.10,
        (KeyUser, Intermediate) | (Consultant, Expert) => 0.08,
        (Consultant, Intermediate) => 0.05,
        (EndUser, Intermediate) | (KeyUser, Beginner) | (Developer, Intermediate) => 0.03,
        _ => 0.0,
    }
}
