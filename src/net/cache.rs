//! Response cache collaborator.
//!
//! The dispatcher reads and writes cached responses by resolved URL. A cache
//! handle may be shared by several dispatchers; implementations do their own
//! synchronization.
//!
//! Cached entries are stored as received from the transport, before any
//! response interceptor ran, and every hit is handed out as a copy.
mod in_memory;

use std::sync::Arc;

use crate::errors::NetError;
use crate::net::Response;

pub use in_memory::InMemoryCache;

/// A cache of responses keyed by URL.
pub trait ResponseCache: Send + Sync {
    /// Returns the stored response for `key`.
    ///
    /// Implementations that cannot produce a well-formed entry return
    /// [`NetError::CacheFailure`]; the dispatcher propagates it to the caller.
    fn get(&self, key: &str) -> Result<Option<Response>, NetError>;

    /// Stores `response` under `key`, replacing any previous entry.
    fn put(&self, key: &str, response: Response);
}

/// Shared handle to a response cache.
pub type CacheHandle = Arc<dyn ResponseCache>;
