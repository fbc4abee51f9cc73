//! Bounded LRU caches for lookup results.
//!
//! Each cache owns its own lock so the header cache and the device cache
//! never block each other.

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default device-id cache capacity once caching is enabled
pub const DEVICE_DEFAULT_CACHE_SIZE: usize = 20_000;

/// Fixed-capacity LRU store, disabled until sized.
pub struct BoundedCache<V> {
    name: &'static str,
    inner: Mutex<Option<LruCache<String, Arc<V>>>>,
}

impl<V> BoundedCache<V> {
    /// Create a disabled cache
    pub fn disabled(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(None),
        }
    }

    /// Replace the cache with an empty one of the given capacity.
    /// A capacity of zero disables caching.
    pub fn resize(&self, capacity: usize) {
        let cache = NonZeroUsize::new(capacity).map(LruCache::new);
        tracing::debug!("{} cache capacity set to {}", self.name, capacity);
        *self.inner.lock() = cache;
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.inner.lock().as_mut()?.get(key).cloned()
    }

    pub fn put(&self, key: String, value: Arc<V>) {
        if let Some(cache) = self.inner.lock().as_mut() {
            cache.put(key, value);
        }
    }

    pub fn clear(&self) {
        if let Some(cache) = self.inner.lock().as_mut() {
            cache.clear();
        }
    }

    pub fn size(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, LruCache::len)
    }

    pub fn capacity(&self) -> usize {
        self.inner
            .lock()
            .as_ref()
            .map_or(0, |cache| cache.cap().get())
    }
}

/// Derive the header-cache key for a lookup.
///
/// Values of the important headers present in `headers` are concatenated in
/// `important_headers` order, hashed, and the first 128 bits rendered as
/// lowercase hex. Header names match case-insensitively.
pub fn header_cache_key(important_headers: &[String], headers: &HashMap<String, String>) -> String {
    let lowered: HashMap<String, &str> = headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.as_str()))
        .collect();

    let mut hasher = Sha256::new();
    for name in important_headers {
        if let Some(value) = lowered.get(&name.to_ascii_lowercase()) {
            hasher.update(value.as_bytes());
        }
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}
