//! Deterministic hashing embedding backend.
//!
//! Buckets tokens by xxHash into a fixed-dimension vector and
//! L2-normalizes. No model weights, fully offline, deterministic, which
//! makes it the default backend for tests and air-gapped deployments.
//! Real model-backed backends implement the same trait.

use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use quarry_core::traits::EmbeddingBackend;
use twox_hash::XxHash64;

pub struct HashingBackend {
    id: String,
    dim: usize,
    max_input_len: usize,
}

impl HashingBackend {
    pub fn new(dim: usize, max_input_len: usize) -> Self {
        Self { id: format!("hashing-v1-d{dim}"), dim, max_input_len }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Default for HashingBackend {
    fn default() -> Self {
        Self::new(256, 2048)
    }
}

#[async_trait]
impl EmbeddingBackend for HashingBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn max_input_len(&self) -> usize {
        self.max_input_len
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        if text.chars().count() > self.max_input_len {
            anyhow::bail!(
                "input of {} chars exceeds backend limit {}",
                text.chars().count(),
                self.max_input_len
            );
        }
        Ok(self.embed_sync(text))
    }
}
