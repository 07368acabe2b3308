//! Error types for slotdb core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in slotdb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] slotdb_storage::StorageError),

    /// Record payload could not be encoded or decoded as JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The file was written by an incompatible format version or is truncated.
    #[error("incompatible file format: {message}")]
    FormatIncompatible {
        /// Description of the incompatibility.
        message: String,
    },

    /// A structural pointer landed somewhere it should not.
    #[error("file corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// A sequence or index with the same name already exists.
    #[error("{kind} '{name}' already exists")]
    DuplicateDefinition {
        /// What kind of definition collided (`sequence`, `index`).
        kind: &'static str,
        /// The colliding name.
        name: String,
    },

    /// The named sequence or index does not exist.
    #[error("{kind} '{name}' does not exist")]
    NotFound {
        /// What kind of definition was looked up.
        kind: &'static str,
        /// The missing name.
        name: String,
    },

    /// The store has been closed.
    #[error("file is closed")]
    Closed,

    /// An argument was rejected before any I/O took place.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a format incompatibility error.
    pub fn format_incompatible(message: impl Into<String>) -> Self {
        Self::FormatIncompatible {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a duplicate definition error.
    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::DuplicateDefinition {
            kind,
            name: name.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }
}
