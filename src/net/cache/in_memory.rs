use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::errors::NetError;
use crate::net::cache::ResponseCache;
use crate::net::Response;

/// In-memory response cache, optionally bounded with least-recently-used
/// eviction.
pub struct InMemoryCache {
    entries: Mutex<LruCache<String, Response>>,
}

impl InMemoryCache {
    /// Cache without a size limit.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Cache holding at most `capacity` entries.
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn remove(&self, key: &str) -> Option<Response> {
        self.lock().pop(key)
    }

    pub fn remove_all(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Response>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache for InMemoryCache {
    fn get(&self, key: &str) -> Result<Option<Response>, NetError> {
        Ok(self.lock().get(key).cloned())
    }

    fn put(&self, key: &str, response: Response) {
        self.lock().put(key.to_string(), response);
    }
}
