//! Memoization of full ranked responses.
//!
//! Keyed by a digest of the normalized query, filters, caller role,
//! limit and relevance floor. Concurrent misses for the same query may
//! each pay the fan-out cost before the first writer lands; that is
//! duplicated work, not a correctness problem. A cache outage degrades
//! to no-cache mode and never fails the request.

use std::sync::Arc;
use std::time::Duration;

use quarry_core::text::normalize_text;
use quarry_core::traits::CacheStore;
use quarry_core::types::{SearchRequest, SearchResult};
use tracing::{debug, warn};

pub struct ResultCache {
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn key(request: &SearchRequest) -> String {
        let material = serde_json::json!({
            "query": normalize_text(&request.query).to_lowercase(),
            "filters": request.filters,
            "role": request.caller_role,
            "limit": request.limit,
            "min_relevance": request.min_relevance,
        });
        format!("res:{}", blake3::hash(material.to_string().as_bytes()).to_hex())
    }

    pub async fn get(&self, request: &SearchRequest) -> Option<SearchResult> {
        let key = Self::key(request);
        match self.cache.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(result) => {
                    debug!(key, "result cache hit");
                    Some(result)
                }
                Err(e) => {
                    warn!(key, error = %e, "discarding undecodable cached result");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "result cache unavailable, proceeding uncached");
                None
            }
        }
    }

    /// Drop a stale entry so the next identical request recomputes.
    pub async fn invalidate(&self, request: &SearchRequest) {
        if let Err(e) = self.cache.delete(&Self::key(request)).await {
            warn!(error = %e, "result cache invalidation failed");
        }
    }

    pub async fn put(&self, request: &SearchRequest, result: &SearchResult) {
        let Ok(bytes) = serde_json::to_vec(result) else {
            return;
        };
        if let Err(e) = self.cache.set(&Self::key(request), bytes, self.ttl).await {
            warn!(error = %e, "result cache write failed");
        }
    }
}
