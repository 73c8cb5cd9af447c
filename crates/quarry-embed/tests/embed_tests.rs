use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::config::EmbeddingConfig;
use quarry_core::memory::MemoryCacheStore;
use quarry_core::traits::EmbeddingBackend;
use quarry_embed::{EmbeddingService, HashingBackend};

/// Counts backend calls so tests can assert cache behavior.
struct CountingBackend {
    inner: HashingBackend,
    calls: AtomicUsize,
    /// Inputs containing this marker fail.
    poison: Option<&'static str>,
}

impl CountingBackend {
    fn new() -> Self {
        Self { inner: HashingBackend::new(32, 100), calls: AtomicUsize::new(0), poison: None }
    }

    fn with_poison(marker: &'static str) -> Self {
        Self { poison: Some(marker), ..Self::new() }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingBackend for CountingBackend {
    fn id(&self) -> &str {
        self.inner.id()
    }
    fn dim(&self) -> usize {
        self.inner.dim()
    }
    fn max_input_len(&self) -> usize {
        self.inner.max_input_len()
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = self.poison {
            if text.contains(marker) {
                anyhow::bail!("backend rejected input");
            }
        }
        self.inner.embed(text).await
    }
}

fn service(backend: Arc<CountingBackend>) -> EmbeddingService {
    EmbeddingService::new(backend, Arc::new(MemoryCacheStore::new()), &EmbeddingConfig::default())
}

#[tokio::test]
async fn second_embed_is_a_cache_hit() {
    let backend = Arc::new(CountingBackend::new());
    let svc = service(backend.clone());

    let first = svc.embed("goods receipt posting").await.expect("embed");
    assert_eq!(backend.calls(), 1);

    let second = svc.embed("goods receipt posting").await.expect("embed");
    assert_eq!(backend.calls(), 1, "cache hit must not call the backend");
    assert_eq!(first, second);

    // Whitespace-variant text normalizes to the same key.
    let third = svc.embed("goods  receipt\nposting").await.expect("embed");
    assert_eq!(backend.calls(), 1);
    assert_eq!(first, third);
}

#[tokio::test]
async fn failed_batch_item_does_not_abort_siblings() {
    let backend = Arc::new(CountingBackend::with_poison("POISON"));
    let svc = service(backend);

    let texts = vec![
        "healthy text one".to_string(),
        "POISON in the middle".to_string(),
        "healthy text two".to_string(),
    ];
    let out = svc.embed_batch(&texts).await.expect("batch");
    assert_eq!(out.len(), 3);
    assert!(!out[0].failed);
    assert!(out[1].failed, "poisoned item flagged");
    assert!(out[1].vector.iter().all(|x| *x == 0.0), "zero-vector placeholder");
    assert!(!out[2].failed);
}

#[tokio::test]
async fn failed_item_is_not_cached() {
    let backend = Arc::new(CountingBackend::with_poison("POISON"));
    let svc = service(backend.clone());

    let texts = vec!["POISON text".to_string()];
    let out = svc.embed_batch(&texts).await.expect("batch");
    assert!(out[0].failed);
    let calls_after_failure = backend.calls();

    // A later attempt must reach the backend again (no poisoned cache).
    let out = svc.embed_batch(&texts).await.expect("batch");
    assert!(out[0].failed);
    assert!(backend.calls() > calls_after_failure);
}

#[tokio::test]
async fn over_limit_text_is_split_and_averaged() {
    let backend = Arc::new(CountingBackend::new());
    let svc = service(backend.clone());

    // max_input_len is 100 chars; build several short paragraphs.
    let long_text = (0..12)
        .map(|i| format!("paragraph {i} about inventory management"))
        .collect::<Vec<_>>()
        .join("\n\n");
    assert!(long_text.chars().count() > 100);

    let vector = svc.embed(&long_text).await.expect("embed");
    assert_eq!(vector.len(), 32);
    assert!(backend.calls() > 1, "split input needs several backend calls");
    assert!(vector.iter().any(|x| *x != 0.0));

    // And the averaged result is cached under the full text's hash.
    let calls = backend.calls();
    let again = svc.embed(&long_text).await.expect("embed");
    assert_eq!(backend.calls(), calls);
    assert_eq!(vector, again);
}
