//! Retention ledger: the TTL map over retained source files.
//!
//! Pure in-memory bookkeeping. The ledger never touches the filesystem —
//! callers write the file *before* registering so a registered entry always
//! refers to an existing file, and the sweeper removes the file before
//! unregistering. All lookups signal absence with `Option`/`bool` rather than
//! errors.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

use crate::models::Resource;

/// Mapping from resource id to acquisition time, guarded by a single lock.
/// Critical sections are map operations only, never I/O.
pub struct RetentionLedger {
    ttl: Duration,
    entries: RwLock<HashMap<String, Resource>>,
}

impl RetentionLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The TTL applied to every registered resource.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert or replace the entry for `id` with a fresh `acquired_at`.
    ///
    /// Re-registering an existing id is a wholesale replacement, not a
    /// refresh: the new record gets its own timestamp and size.
    pub fn register(&self, id: &str, size: u64) -> Resource {
        self.register_at(id, size, Utc::now())
    }

    /// [`register`](Self::register) with an explicit acquisition time.
    /// Exists so expiry behavior can be exercised deterministically.
    pub fn register_at(&self, id: &str, size: u64, acquired_at: DateTime<Utc>) -> Resource {
        let resource = Resource {
            id: id.to_string(),
            acquired_at,
            ttl: self.ttl,
            size,
        };
        let mut entries = self.entries.write().unwrap();
        entries.insert(id.to_string(), resource.clone());
        resource
    }

    /// Remove the entry if present. Idempotent; returns whether removal
    /// occurred.
    pub fn unregister(&self, id: &str) -> bool {
        self.entries.write().unwrap().remove(id).is_some()
    }

    /// Snapshot of the entry for `id`, if live.
    pub fn get(&self, id: &str) -> Option<Resource> {
        self.entries.read().unwrap().get(id).cloned()
    }

    /// Pure expiry check. An absent id is not expired (it is absent).
    pub fn is_expired(&self, id: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .read()
            .unwrap()
            .get(id)
            .map(|r| r.is_expired(now))
            .unwrap_or(false)
    }

    /// Time left before `id` expires; `None` if absent or already expired.
    pub fn time_remaining(&self, id: &str, now: DateTime<Utc>) -> Option<Duration> {
        self.entries
            .read()
            .unwrap()
            .get(id)
            .and_then(|r| r.time_remaining(now))
    }

    /// Snapshot of all live entries, in no particular order.
    pub fn list(&self) -> Vec<Resource> {
        self.entries.read().unwrap().values().cloned().collect()
    }

    /// Ids of all entries expired as of `now`. Used by the sweeper.
    pub fn expired_ids(&self, now: DateTime<Utc>) -> Vec<String> {
        self.entries
            .read()
            .unwrap()
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}
