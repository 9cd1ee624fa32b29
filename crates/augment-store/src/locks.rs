//! Per-identifier write serialization.
//!
//! Writes to one file's shards take that identifier's mutex; writes to
//! different files never contend. Entries are created on first use and kept
//! for the life of the store.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// State guarded by one identifier's lock.
#[derive(Debug, Default)]
pub(crate) struct ShardState {
    last_timestamp: Option<DateTime<Utc>>,
}

impl ShardState {
    /// Next creation timestamp for this shard.
    ///
    /// Strictly after the previous one handed out, even if the wall clock
    /// stalls or steps back.
    pub(crate) fn next_timestamp(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::nanoseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }
}

#[derive(Debug, Default)]
pub(crate) struct LockTable {
    shards: DashMap<String, Arc<Mutex<ShardState>>>,
}

impl LockTable {
    /// Handle for `identifier`, created on demand.
    pub(crate) fn handle(&self, identifier: &str) -> Arc<Mutex<ShardState>> {
        // Clone out of the map so the DashMap shard lock is released before
        // the caller blocks on the mutex.
        self.shards
            .entry(identifier.to_string())
            .or_default()
            .clone()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.shards.len()
    }
}

/// Lock a shard mutex, recovering from a writer that panicked mid-write.
pub(crate) fn lock_shard(handle: &Mutex<ShardState>) -> MutexGuard<'_, ShardState> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_identifier_same_handle() {
        let table = LockTable::default();
        let a = table.handle("abc");
        let b = table.handle("abc");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_distinct_identifiers_distinct_handles() {
        let table = LockTable::default();
        let a = table.handle("abc");
        let b = table.handle("def");
        assert!(!Arc::ptr_eq(&a, &b));

        // Holding one does not block the other.
        let _ga = lock_shard(&a);
        let _gb = lock_shard(&b);
    }

    #[test]
    fn test_next_timestamp_strictly_increases() {
        let mut state = ShardState::default();
        let now = Utc::now();
        let t1 = state.next_timestamp(now);
        let t2 = state.next_timestamp(now);
        let t3 = state.next_timestamp(now - Duration::seconds(5));
        assert_eq!(t1, now);
        assert!(t2 > t1);
        assert!(t3 > t2);
    }
}
