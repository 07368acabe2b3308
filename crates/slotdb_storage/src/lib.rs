//! # slotdb storage
//!
//! Random-access storage backends for slotdb.
//!
//! A slotdb database is a single file whose layout is owned entirely by
//! `slotdb_core`. Backends here are **opaque byte stores**: they read and
//! write bytes at absolute offsets and know nothing about headers, pages
//! or entries.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral stores
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use slotdb_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.write_at(0, b"hello world").unwrap();
//! backend.write_at(6, b"slots").unwrap();
//! assert_eq!(backend.read_at(0, 11).unwrap(), b"hello slots");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
