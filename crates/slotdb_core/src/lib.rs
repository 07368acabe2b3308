//! # slotdb core
//!
//! Storage engine for slotdb, an embedded single-file store for JSON
//! records.
//!
//! This crate provides:
//! - Binary codecs for every entry kind in the file ([`entry`])
//! - A page allocator with a persistent free list
//! - A bounded page cache ranked by last use
//! - Named sequences (counters, timestamps, UUIDs) applied on insert
//! - Persistent hash indexes with chained collision buckets
//! - FIFO queues that order conflicting mutations
//! - Full scans and index lookups with skip, limit and sort
//!
//! ## Example
//!
//! ```rust,ignore
//! use slotdb_core::{Config, FilterOptions, SequenceOptions, Store};
//! use serde_json::json;
//!
//! let store = Store::open_in_memory(Config::default()).await?;
//! store.create_sequence("id", SequenceOptions::new()).await?;
//! store.add(json!({ "name": "ada" })).await?;
//! store.create_index(0, &["name"]).await?;
//!
//! let found = store
//!     .filter_by_index(&json!({ "name": "ada" }), |_| true, FilterOptions::new())
//!     .await?;
//! assert_eq!(found[0]["id"], 1);
//! store.close().await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod alloc;
mod cache;
mod config;
pub mod entry;
mod error;
mod index;
mod inspect;
mod mutation;
mod query;
mod queue;
mod sequence;
mod state;
mod stats;
mod store;

pub use config::{Config, DEFAULT_INDEX_CAPACITY, DEFAULT_IN_MEMORY_PAGES, DEFAULT_PAGE_SIZE};
pub use entry::{Header, Page, SequenceKind, FORMAT_VERSION};
pub use error::{CoreError, CoreResult};
pub use index::{
    bucket_index, hash_properties, hash_str, hash_value, prime_capacity, IndexInfo, PRIMES,
};
pub use inspect::{IntegrityReport, StoreInfo};
pub use query::{compare_values, FilterOptions, SortSpec};
pub use sequence::{Sequence, SequenceOptions};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{Lifecycle, Store};

/// Crate version, as recorded by Cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
