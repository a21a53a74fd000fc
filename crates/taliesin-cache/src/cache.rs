//! The bounded update cache.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::ttl::TtlTracker;

/// Hook invoked when an entry leaves the cache involuntarily (LRU pressure or
/// TTL expiry). Explicit [`UpdateCache::remove`] does not fire the hook; the
/// caller already holds the value in that case.
pub trait EvictionHandler<V>: Send + Sync {
    fn on_evict(&self, key: &str, value: &V);
}

/// Default handler: evicted values are simply dropped.
#[derive(Debug, Clone, Default)]
pub struct DropEvicted;

impl<V> EvictionHandler<V> for DropEvicted {
    fn on_evict(&self, _key: &str, _value: &V) {}
}

struct CacheInner<V> {
    lru: LruCache<String, V>,
    ttl: TtlTracker,
}

/// Bounded key→value cache for live scheduled tasks.
///
/// Values are held by `Arc` internally; `get` hands out clones, so `V` is
/// typically itself an `Arc`-backed handle. Access via `get` or
/// `get_or_insert_with` refreshes both LRU position and TTL age.
pub struct UpdateCache<V> {
    inner: Arc<Mutex<CacheInner<V>>>,
    eviction: Arc<dyn EvictionHandler<V>>,
    config: CacheConfig,
}

impl<V: Clone + Send + 'static> UpdateCache<V> {
    /// Create a cache that drops evicted values.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_eviction_handler(config, DropEvicted)
    }

    /// Create a cache with an eviction hook.
    pub fn with_eviction_handler<H>(config: CacheConfig, handler: H) -> Self
    where
        H: EvictionHandler<V> + 'static,
    {
        let cap =
            NonZeroUsize::new(config.max_entries).unwrap_or_else(|| NonZeroUsize::new(1).unwrap());
        let inner = CacheInner {
            lru: LruCache::new(cap),
            ttl: TtlTracker::new(config.ttl),
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            eviction: Arc::new(handler),
            config,
        }
    }

    /// The cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current resident entry count.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.lru.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.lru.is_empty()
    }

    /// Get a value, refreshing its LRU position and TTL age.
    ///
    /// An expired entry is evicted (firing the hook) and reported as absent.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().await;
        if inner.ttl.is_expired(key) {
            self.evict(&mut inner, key);
            return None;
        }
        let value = inner.lru.get(key).cloned();
        if value.is_some() {
            inner.ttl.touch(key);
            trace!(key = %key, "cache hit");
        }
        value
    }

    /// Get the value for `key`, inserting one built by `make` if absent or
    /// expired. Makes room first so the insert itself cannot evict the new
    /// entry.
    pub async fn get_or_insert_with<F>(&self, key: &str, make: F) -> V
    where
        F: FnOnce() -> V,
    {
        let mut inner = self.inner.lock().await;
        if inner.ttl.is_expired(key) {
            self.evict(&mut inner, key);
        }
        if let Some(value) = inner.lru.get(key) {
            let value = value.clone();
            inner.ttl.touch(key);
            return value;
        }

        if inner.lru.len() >= self.config.max_entries
            && let Some((lru_key, _)) = inner.lru.peek_lru()
        {
            let lru_key = lru_key.clone();
            self.evict(&mut inner, &lru_key);
        }

        let value = make();
        inner.lru.put(key.to_string(), value.clone());
        inner.ttl.touch(key);
        debug!(key = %key, size = inner.lru.len(), "cache entry created");
        value
    }

    /// Insert or replace a value.
    pub async fn insert(&self, key: &str, value: V) {
        let mut inner = self.inner.lock().await;
        if inner.lru.len() >= self.config.max_entries
            && !inner.lru.contains(key)
            && let Some((lru_key, _)) = inner.lru.peek_lru()
        {
            let lru_key = lru_key.clone();
            self.evict(&mut inner, &lru_key);
        }
        inner.lru.put(key.to_string(), value);
        inner.ttl.touch(key);
    }

    /// Remove an entry, returning its value. Does not fire the eviction hook.
    pub async fn remove(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().await;
        inner.ttl.remove(key);
        inner.lru.pop(key)
    }

    /// Whether a live (non-expired) entry exists for `key`.
    pub async fn contains(&self, key: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.lru.contains(key) && !inner.ttl.is_expired(key)
    }

    /// Evict every expired entry, firing the hook for each. Returns how many
    /// were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let expired = inner.ttl.drain_expired();
        let count = expired.len();
        for key in expired {
            if let Some(value) = inner.lru.pop(&key) {
                debug!(key = %key, "evicting expired entry");
                self.eviction.on_evict(&key, &value);
            }
        }
        count
    }

    /// Remove every entry, firing the hook for each.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.ttl.clear();
        while let Some((key, value)) = inner.lru.pop_lru() {
            self.eviction.on_evict(&key, &value);
        }
    }

    /// Cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            size: inner.lru.len(),
            capacity: self.config.max_entries,
        }
    }

    fn evict(&self, inner: &mut CacheInner<V>, key: &str) {
        inner.ttl.remove(key);
        if let Some(value) = inner.lru.pop(key) {
            debug!(key = %key, "evicting entry");
            self.eviction.on_evict(key, &value);
        }
    }
}

impl<V> Clone for UpdateCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            eviction: Arc::clone(&self.eviction),
            config: self.config.clone(),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Current resident entry count.
    pub size: usize,
    /// Maximum capacity.
    pub capacity: usize,
}
