//! Cache-first embedding generation.
//!
//! Every distinct `(model, text)` pair is sent to the provider at most once
//! per cache store. When several tasks ask for the same key concurrently,
//! one of them fills the entry and the rest wait and read it back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use domsim_cache::{CacheKey, KeyValueStore};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::Embedding;
use crate::codec;
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest};

/// Which text the cache key is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// Hash the text after [`normalize_text`], the same text the provider
    /// receives. Inputs differing only in line breaks share one entry.
    #[default]
    Normalized,
    /// Hash the text exactly as given. Needed to read caches written by
    /// tools that keyed on the raw text.
    Raw,
}

impl KeyPolicy {
    /// Cache key for `text` embedded with `model`.
    pub fn key_for(self, model: &str, text: &str) -> CacheKey {
        match self {
            Self::Normalized => CacheKey::derive(model, [normalize_text(text)]),
            Self::Raw => CacheKey::derive(model, [text]),
        }
    }
}

/// Replace line breaks with spaces. Providers embed text with raw
/// newlines noticeably worse.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Counters describing how embeddings were served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingStats {
    /// Requests sent to the provider.
    pub provider_calls: u64,

    /// Embeddings served from the cache.
    pub cache_hits: u64,
}

/// Embedding generation backed by a content-addressed store.
pub struct CachedEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn KeyValueStore>,
    policy: KeyPolicy,
    in_flight: InFlight,
    provider_calls: AtomicU64,
    cache_hits: AtomicU64,
}

impl CachedEmbedder {
    /// Create a new cached embedder using the normalized key policy.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            provider,
            store,
            policy: KeyPolicy::default(),
            in_flight: InFlight::default(),
            provider_calls: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    /// Choose which text the cache key is derived from.
    pub fn with_key_policy(mut self, policy: KeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Cache key for `text` under `model` and the configured policy.
    pub fn key_for(&self, model: &str, text: &str) -> CacheKey {
        self.policy.key_for(model, text)
    }

    /// Embed `text` with `model`, serving from the cache when possible.
    pub async fn embed(&self, model: &str, text: &str) -> Result<Embedding> {
        let key = self.key_for(model, text);

        if let Some(embedding) = self.lookup(&key).await? {
            return Ok(embedding);
        }

        let slot = self.in_flight.claim(&key);
        let _guard = slot.lock().await;
        // Another task may have filled the entry while we waited.
        match self.lookup(&key).await? {
            Some(embedding) => Ok(embedding),
            None => self.fill(&key, model, text).await,
        }
    }

    /// Snapshot of the hit/miss counters.
    pub fn stats(&self) -> EmbeddingStats {
        EmbeddingStats {
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }

    /// Name of the underlying provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    async fn lookup(&self, key: &CacheKey) -> Result<Option<Embedding>> {
        let Some(bytes) = self.store.get(key).await? else {
            return Ok(None);
        };
        let embedding = codec::decode(key, &bytes)?;
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        debug!(%key, "cache hit, returning cached embedding");
        Ok(Some(embedding))
    }

    async fn fill(&self, key: &CacheKey, model: &str, text: &str) -> Result<Embedding> {
        info!(%key, provider = self.provider.name(), "cache miss, requesting provider");
        self.provider_calls.fetch_add(1, Ordering::Relaxed);

        let request = EmbeddingRequest::new(model, normalize_text(text));
        let response =
            self.provider
                .embed(request)
                .await
                .map_err(|e| EmbeddingError::Provider {
                    key: key.clone(),
                    source: Box::new(e),
                })?;

        if response.embedding.is_empty() {
            return Err(EmbeddingError::Provider {
                key: key.clone(),
                source: Box::new(EmbeddingError::InvalidResponse(
                    "empty embedding".to_string(),
                )),
            });
        }

        let payload = codec::encode(&response.embedding)?;
        self.store.put(key, &payload).await?;
        Ok(response.embedding)
    }
}

/// Per-key locks for embeddings currently being filled.
///
/// The map lock is never held across an await, so it can be released
/// synchronously when a claim is dropped.
#[derive(Default)]
struct InFlight {
    slots: StdMutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl InFlight {
    fn claim(&self, key: &CacheKey) -> Slot<'_> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(slots.entry(key.clone()).or_default());
        Slot {
            owner: self,
            key: key.clone(),
            lock,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A claim on one key's lock. Dropping it, including when the embedding
/// future is cancelled, removes the map entry once nobody else waits on it.
struct Slot<'a> {
    owner: &'a InFlight,
    key: CacheKey,
    lock: Arc<Mutex<()>>,
}

impl Slot<'_> {
    async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        let mut slots = self
            .owner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference lives in the map, one is ours; anything more is a waiter.
        if Arc::strong_count(&self.lock) <= 2 {
            slots.remove(&self.key);
        }
    }
}
