//! Timed store module
//!
//! The keyed-store-with-expiry pattern shared by loot drops and queued
//! messages: entries get a monotonically increasing id and a stamped
//! lifetime, and a periodic sweep removes everything past its expiry.
//!
//! The store is deliberately time-explicit: `sweep_expired` takes `now` as
//! a parameter so sweeps can be driven deterministically in tests while the
//! background sweeper feeds it the wall clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

/// An entry with a stamped lifetime
#[derive(Debug, Clone)]
pub struct TimedEntry<T> {
    /// Unique id within the store's namespace
    pub id: u64,
    /// The stored payload
    pub payload: T,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
    /// When the entry becomes eligible for removal
    pub expires_at: DateTime<Utc>,
}

impl<T> TimedEntry<T> {
    /// Check if this entry has expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Keyed store with per-entry expiry
pub struct TimedStore<T> {
    entries: RwLock<HashMap<u64, TimedEntry<T>>>,
    next_id: AtomicU64,
    ttl: Duration,
}

impl<T: Clone> TimedStore<T> {
    /// Create a new store whose entries live for `ttl_secs` seconds
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Insert a payload, stamping creation and expiry at `now`; returns the
    /// assigned id
    pub fn insert_at(&self, payload: T, now: DateTime<Utc>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let entry = TimedEntry {
            id,
            payload,
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.entries.write().insert(id, entry);
        id
    }

    /// Insert a payload stamped with the current wall clock
    pub fn insert(&self, payload: T) -> u64 {
        self.insert_at(payload, Utc::now())
    }

    /// Get a snapshot of an entry by id
    pub fn get(&self, id: u64) -> Option<TimedEntry<T>> {
        self.entries.read().get(&id).cloned()
    }

    /// Remove an entry by id. Idempotent: removing a missing id returns
    /// `None` rather than erroring.
    pub fn remove(&self, id: u64) -> Option<TimedEntry<T>> {
        self.entries.write().remove(&id)
    }

    /// Number of live entries
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    /// Snapshot of all live entries
    pub fn list(&self) -> Vec<TimedEntry<T>> {
        self.entries.read().values().cloned().collect()
    }

    /// Snapshot of live entries matching a predicate
    pub fn list_where(&self, mut predicate: impl FnMut(&TimedEntry<T>) -> bool) -> Vec<TimedEntry<T>> {
        self.entries
            .read()
            .values()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    /// Remove and return every entry whose expiry is at or before `now`
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<TimedEntry<T>> {
        // Identify first, then remove, so the write lock is not held while
        // callers react to the returned entries
        let expired_ids: Vec<u64> = {
            let entries = self.entries.read();
            entries
                .values()
                .filter(|e| e.is_expired(now))
                .map(|e| e.id)
                .collect()
        };

        if expired_ids.is_empty() {
            return Vec::new();
        }

        let mut entries = self.entries.write();
        expired_ids
            .iter()
            .filter_map(|id| entries.remove(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let store: TimedStore<&str> = TimedStore::new(60);
        let a = store.insert("a");
        let b = store.insert("b");
        let c = store.insert("c");

        assert!(a < b && b < c);
        assert_eq!(store.count(), 3);
    }

    #[test]
    fn test_entry_stamping() {
        let store: TimedStore<u32> = TimedStore::new(60);
        let now = Utc::now();
        let id = store.insert_at(7, now);

        let entry = store.get(id).unwrap();
        assert_eq!(entry.payload, 7);
        assert_eq!(entry.created_at, now);
        assert_eq!(entry.expires_at, now + Duration::seconds(60));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store: TimedStore<u32> = TimedStore::new(60);
        let id = store.insert(1);

        assert!(store.remove(id).is_some());
        assert!(store.remove(id).is_none());
        assert!(store.remove(9999).is_none());
    }

    #[test]
    fn test_retrievable_until_expiry_boundary() {
        let store: TimedStore<u32> = TimedStore::new(60);
        let created = Utc::now();
        let id = store.insert_at(1, created);

        // Just before the boundary nothing is swept
        let removed = store.sweep_expired(created + Duration::seconds(59));
        assert!(removed.is_empty());
        assert!(store.get(id).is_some());

        // At the boundary the entry goes
        let removed = store.sweep_expired(created + Duration::seconds(60));
        assert_eq!(removed.len(), 1);
        assert!(store.get(id).is_none());
    }

    #[test]
    fn test_sweep_only_removes_expired() {
        let store: TimedStore<u32> = TimedStore::new(60);
        let now = Utc::now();
        let old = store.insert_at(1, now - Duration::seconds(120));
        let fresh = store.insert_at(2, now);

        let removed = store.sweep_expired(now);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, old);
        assert!(store.get(fresh).is_some());
    }

    #[test]
    fn test_list_where() {
        let store: TimedStore<u32> = TimedStore::new(60);
        store.insert(1);
        store.insert(2);
        store.insert(3);

        let even = store.list_where(|e| e.payload % 2 == 0);
        assert_eq!(even.len(), 1);
        assert_eq!(even[0].payload, 2);
    }
}
