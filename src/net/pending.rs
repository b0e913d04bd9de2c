//! In-flight request table.
//!
//! While a cacheable request is on the wire its resolved URL maps to a
//! shared handle of the eventual reply. Later calls for the same URL join
//! that handle instead of reaching the transport again. The entry exists
//! from registration until the request first settles, or until every caller
//! has dropped its handle.
//!
//! The table only keeps weak references: callers own the request. When the
//! last handle goes away the request future is dropped, its guard removes
//! the entry and the next caller for that URL starts a fresh request.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};

use crate::net::transport::{Reply, TransportError};

type ReplyFuture = BoxFuture<'static, Result<Reply, TransportError>>;

/// Eventual outcome of an in-flight request, observable by many callers.
pub type PendingReply = Shared<ReplyFuture>;

#[derive(Default)]
struct Entries {
    next_id: u64,
    by_url: HashMap<String, (u64, WeakShared<ReplyFuture>)>,
}

/// URLs with a request on the wire.
#[derive(Clone, Default)]
pub struct PendingRequestTable {
    entries: Arc<Mutex<Entries>>,
}

fn lock_entries(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(|e| e.into_inner())
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        lock_entries(&self.entries)
    }

    /// Returns the handle registered for `url`, if its request is still alive.
    pub fn get(&self, url: &str) -> Option<PendingReply> {
        let entries = self.lock();
        entries.by_url.get(url).and_then(|(_, weak)| weak.upgrade())
    }

    /// Joins the request registered for `url`, or registers the one produced
    /// by `start`.
    ///
    /// Lookup and insert happen under one lock, so two callers can never
    /// both register the same URL. `start` receives a guard that removes the
    /// entry again; move it into the returned future so it drops once the
    /// request settles or is abandoned. Dropping it inside `start` deadlocks.
    /// The boolean is `true` when an existing request was joined.
    pub fn join_or_register<F>(&self, url: &str, start: F) -> (PendingReply, bool)
    where
        F: FnOnce(PendingGuard) -> ReplyFuture,
    {
        let mut entries = self.lock();
        if let Some(existing) = entries.by_url.get(url).and_then(|(_, weak)| weak.upgrade()) {
            return (existing, true);
        }

        entries.next_id += 1;
        let id = entries.next_id;
        let guard = PendingGuard {
            table: Arc::downgrade(&self.entries),
            id,
            url: url.to_string(),
        };
        let shared = start(guard).shared();
        // a future that already completed has nothing left to join
        if let Some(weak) = shared.downgrade() {
            entries.by_url.insert(url.to_string(), (id, weak));
        }
        (shared, false)
    }

    pub fn remove(&self, url: &str) {
        self.lock().by_url.remove(url);
    }

    pub fn contains(&self, url: &str) -> bool {
        // the upgraded handle must outlive the lock: dropping the last one
        // runs the guard, which locks the table again
        let live = self.get(url);
        live.is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the URLs currently in flight.
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.lock().by_url.keys().cloned().collect();
        urls.sort();
        urls
    }
}

/// Removes its URL from the table when dropped, unless a newer request has
/// taken the slot in the meantime.
pub struct PendingGuard {
    table: Weak<Mutex<Entries>>,
    id: u64,
    url: String,
}

impl PendingGuard {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let Some(entries) = self.table.upgrade() else {
            return;
        };
        let mut entries = lock_entries(&entries);
        if entries.by_url.get(&self.url).is_some_and(|(id, _)| *id == self.id) {
            entries.by_url.remove(&self.url);
        }
    }
}
