//! Embedding providers and the fallback chain.
//!
//! Defines the [`EmbeddingProvider`] trait and its implementations:
//! - **[`GeminiEmbedder`]** — calls the Gemini `embedContent` API with retry
//!   and backoff; truncates oversized input to the configured limit.
//! - **[`LocalEmbedder`]** — runs a sentence-transformer locally via
//!   fastembed; no network calls after the first model download.
//!
//! Providers are tried in order by [`EmbedderChain`]. A provider that
//! reports quota exhaustion is disabled for the rest of the process and
//! the chain moves on to the next slot. Successful vectors are cached in
//! an LRU keyed by the SHA-256 of the full input text, so repeated
//! questions never spend quota twice.
//!
//! Also provides the vector utilities shared by indexing and retrieval:
//! [`vec_to_blob`], [`blob_to_vec`], and [`cosine_similarity`].

mod gemini;
#[cfg(feature = "local-embeddings")]
mod local;

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use lru::LruCache;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::EmbeddingConfig;
use crate::error::{AssistantError, EmbedError};

pub use gemini::GeminiEmbedder;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;

/// A single embedding backend.
///
/// Implementations classify their failures: [`EmbedError::Quota`] tells
/// the chain to stop calling this provider, anything else is a one-off
/// failure worth falling through for.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short identifier used in logs (e.g. `"gemini"`).
    fn name(&self) -> &str;

    /// Embed one text into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// One provider plus its quota flag.
struct ChainSlot {
    provider: Arc<dyn EmbeddingProvider>,
    /// Set once the provider reports quota exhaustion. Never reset for
    /// the lifetime of the process.
    quota_exhausted: AtomicBool,
}

/// Ordered fallback chain over embedding providers with a shared cache.
pub struct EmbedderChain {
    slots: Vec<ChainSlot>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbedderChain {
    /// Build a chain that tries `providers` in the given order.
    pub fn new(providers: Vec<Arc<dyn EmbeddingProvider>>, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            slots: providers
                .into_iter()
                .map(|provider| ChainSlot {
                    provider,
                    quota_exhausted: AtomicBool::new(false),
                })
                .collect(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Embed one text, consulting the cache first and falling through
    /// disabled or failing providers.
    ///
    /// Only successful embeddings are cached; a failure never poisons
    /// the cache for a later retry. Returns
    /// [`AssistantError::EmbeddingUnavailable`] once every slot has been
    /// tried without producing a vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, AssistantError> {
        let key = cache_key(text);

        if let Some(hit) = {
            let mut guard = self.cache.lock().await;
            guard.get(&key).cloned()
        } {
            debug!("embedding cache hit");
            return Ok(hit);
        }

        for slot in &self.slots {
            if slot.quota_exhausted.load(Ordering::Relaxed) {
                continue;
            }

            match slot.provider.embed(text).await {
                Ok(vector) if !vector.is_empty() => {
                    let mut guard = self.cache.lock().await;
                    guard.put(key, vector.clone());
                    return Ok(vector);
                }
                Ok(_) => {
                    warn!(
                        provider = slot.provider.name(),
                        "provider returned an empty vector"
                    );
                }
                Err(EmbedError::Quota(msg)) => {
                    warn!(
                        provider = slot.provider.name(),
                        error = %msg,
                        "quota exhausted, disabling provider"
                    );
                    slot.quota_exhausted.store(true, Ordering::Relaxed);
                }
                Err(err) => {
                    warn!(
                        provider = slot.provider.name(),
                        error = %err,
                        "embedding attempt failed"
                    );
                }
            }
        }

        Err(AssistantError::EmbeddingUnavailable)
    }
}

/// Assemble the provider chain from configuration.
///
/// The Gemini provider is registered first when `GEMINI_API_KEY` is set;
/// the local fastembed provider follows when the `local-embeddings`
/// feature is compiled in. At least one provider must be available.
pub fn build_chain(config: &EmbeddingConfig) -> Result<EmbedderChain> {
    let mut providers: Vec<Arc<dyn EmbeddingProvider>> = Vec::new();

    match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => {
            providers.push(Arc::new(GeminiEmbedder::new(config, key)?));
        }
        _ => info!("GEMINI_API_KEY not set, skipping remote embeddings"),
    }

    #[cfg(feature = "local-embeddings")]
    providers.push(Arc::new(LocalEmbedder::new(&config.fallback_model)?));

    if providers.is_empty() {
        bail!(
            "No embedding provider available: set GEMINI_API_KEY or build with --features local-embeddings"
        );
    }

    Ok(EmbedderChain::new(providers, config.cache_size))
}

/// Cache key for an input text: hex SHA-256 of the full text, before any
/// provider-side truncation.
fn cache_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a
/// BLOB of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector. Reverses [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// vectors of different lengths, which keeps mixed-dimension documents
/// from different embedding models at the bottom of any ranking instead
/// of failing the query.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct StaticProvider {
        name: &'static str,
        vector: Vec<f32>,
        calls: AtomicUsize,
    }

    impl StaticProvider {
        fn new(name: &'static str, vector: Vec<f32>) -> Self {
            Self {
                name,
                vector,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StaticProvider {
        fn name(&self) -> &str {
            self.name
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.vector.clone())
        }
    }

    struct QuotaProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for QuotaProvider {
        fn name(&self) -> &str {
            "quota"
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EmbedError::Quota("429 RESOURCE_EXHAUSTED".into()))
        }
    }

    struct FlakyProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(EmbedError::Provider("transient".into()))
            } else {
                Ok(vec![0.5, 0.5])
            }
        }
    }

    #[tokio::test]
    async fn first_healthy_provider_wins() {
        let first = Arc::new(StaticProvider::new("a", vec![1.0, 0.0]));
        let second = Arc::new(StaticProvider::new("b", vec![0.0, 1.0]));
        let chain = EmbedderChain::new(vec![first.clone(), second.clone()], 16);

        let v = chain.embed("hello").await.unwrap();
        assert_eq!(v, vec![1.0, 0.0]);
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn quota_disables_provider_for_later_calls() {
        let quota = Arc::new(QuotaProvider {
            calls: AtomicUsize::new(0),
        });
        let backup = Arc::new(StaticProvider::new("backup", vec![0.25]));
        let chain = EmbedderChain::new(vec![quota.clone(), backup.clone()], 16);

        chain.embed("first").await.unwrap();
        chain.embed("second").await.unwrap();

        // The quota provider was tried once, then never again.
        assert_eq!(quota.calls.load(Ordering::SeqCst), 1);
        assert_eq!(backup.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn repeated_text_is_served_from_cache() {
        let provider = Arc::new(StaticProvider::new("a", vec![1.0]));
        let chain = EmbedderChain::new(vec![provider.clone()], 16);

        chain.embed("same question").await.unwrap();
        chain.embed("same question").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        chain.embed("different question").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let flaky = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
        });
        let chain = EmbedderChain::new(vec![flaky.clone()], 16);

        let err = chain.embed("question").await.unwrap_err();
        assert!(matches!(err, AssistantError::EmbeddingUnavailable));

        // Retry reaches the provider again and succeeds.
        let v = chain.embed("question").await.unwrap();
        assert_eq!(v, vec![0.5, 0.5]);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_unavailable() {
        let quota = Arc::new(QuotaProvider {
            calls: AtomicUsize::new(0),
        });
        let chain = EmbedderChain::new(vec![quota], 16);

        let err = chain.embed("question").await.unwrap_err();
        assert!(matches!(err, AssistantError::EmbeddingUnavailable));
    }

    #[tokio::test]
    async fn empty_vector_falls_through_to_next_slot() {
        let empty = Arc::new(StaticProvider::new("empty", vec![]));
        let backup = Arc::new(StaticProvider::new("backup", vec![0.75]));
        let chain = EmbedderChain::new(vec![empty, backup], 16);

        let v = chain.embed("question").await.unwrap();
        assert_eq!(v, vec![0.75]);
    }

    #[test]
    fn cache_key_is_stable_and_distinct() {
        assert_eq!(cache_key("abc"), cache_key("abc"));
        assert_ne!(cache_key("abc"), cache_key("abd"));
        assert_eq!(cache_key("abc").len(), 64);
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        let restored = blob_to_vec(&blob);
        assert_eq!(vec, restored);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
