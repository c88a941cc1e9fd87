//! Pre-mutation snapshot cache
//!
//! Holds field values captured just before an update applies, keyed by the
//! canonical serialization of the operation's filter. A key is written only
//! by the pre-write step and consumed (read + deleted) by the matching
//! post-write step; entries that are never consumed expire after a short TTL
//! and are purged opportunistically on the next insert.
//!
//! The cache is shared process-wide across all instrumented collections.
//! Two concurrent updates through the same filter can clobber each other's
//! entry between pre-write and post-write; the cache is advisory, never a
//! source of truth.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::store::Document;

/// How long an unconsumed snapshot stays retrievable.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Entry {
    fields: Document,
    stored_at: Instant,
}

/// Short-lived cache of pre-mutation field values.
#[derive(Debug)]
pub struct SnapshotCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_TTL)
    }
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store a snapshot, replacing any stale entry under the same key and
    /// purging expired entries while the lock is held.
    pub fn put(&self, key: String, fields: Document) {
        let mut entries = self.lock();
        let now = Instant::now();
        entries.retain(|_, entry| now.duration_since(entry.stored_at) < self.ttl);
        entries.insert(
            key,
            Entry {
                fields,
                stored_at: now,
            },
        );
    }

    /// Consume the snapshot under `key`: every read evicts. Expired entries
    /// are treated as absent.
    pub fn take(&self, key: &str) -> Option<Document> {
        let entry = self.lock().remove(key)?;
        (entry.stored_at.elapsed() < self.ttl).then_some(entry.fields)
    }

    /// Drop the entry under `key`, if any.
    pub fn remove(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Number of live entries (expired ones included until purged).
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
