//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod verify;

use slotdb_core::{Config, CoreResult, Store};
use std::path::Path;

/// Opens an existing file. Never creates one.
pub async fn open_existing(path: &Path) -> CoreResult<Store> {
    Store::open(path, Config::default().create_if_missing(false)).await
}
