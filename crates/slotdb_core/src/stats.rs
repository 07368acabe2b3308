//! Store statistics.
//!
//! Counters are bumped by the engine as it works and can be read at any
//! time through [`crate::Store::stats`].
//!
//! ```rust,ignore
//! let store = Store::open_in_memory(Config::default()).await?;
//! store.add(json!({ "name": "ada" })).await?;
//!
//! let stats = store.stats();
//! println!("adds: {}", stats.adds);
//! println!("bytes written: {}", stats.bytes_written);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live store counters.
///
/// All counters are atomic and monotonically increasing.
#[derive(Debug, Default)]
pub struct StoreStats {
    adds: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    scans: AtomicU64,
    index_lookups: AtomicU64,
    pages_loaded: AtomicU64,
    pages_evicted: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl StoreStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_add(&self) {
        self.adds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_index_lookup(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_page_loaded(&self) {
        self.pages_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_page_evicted(&self) {
        self.pages_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            adds: self.adds.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            index_lookups: self.index_lookups.load(Ordering::Relaxed),
            pages_loaded: self.pages_loaded.load(Ordering::Relaxed),
            pages_evicted: self.pages_evicted.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of store statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Records added.
    pub adds: u64,
    /// Records rewritten by `update`.
    pub updates: u64,
    /// Records removed by `delete`.
    pub deletes: u64,
    /// Full scans started.
    pub scans: u64,
    /// Index lookups started.
    pub index_lookups: u64,
    /// Pages read into the page cache.
    pub pages_loaded: u64,
    /// Pages dropped from the page cache.
    pub pages_evicted: u64,
    /// Bytes read from the backend.
    pub bytes_read: u64,
    /// Bytes written to the backend.
    pub bytes_written: u64,
}
