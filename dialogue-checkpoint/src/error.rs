//! Error types for checkpoint store operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur while loading or saving dialogue state.
///
/// Per the core's error taxonomy, a failure to `load` is recoverable (the
/// caller falls back to a fresh state and logs); a failure to `save` is not
/// — the turn that produced the state to be saved is lost.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No checkpoint exists for the given user key.
    ///
    /// This is not normally surfaced as an error — `CheckpointStore::load`
    /// returns `Ok(None)` for an absent key — but is available for backends
    /// that need to distinguish "never written" from "deleted".
    #[error("no checkpoint found for user key: {0}")]
    NotFound(String),

    /// The persisted state's `schema_version` is newer than this build
    /// understands. Per spec, this is a hard error: do not guess.
    #[error("checkpoint schema version {found} is newer than the highest supported version {supported}")]
    UnsupportedSchemaVersion { found: u32, supported: u32 },

    /// A registered migrator from an older schema version failed, or no
    /// migrator is registered for the stored version.
    #[error("failed to migrate checkpoint from schema version {from}: {reason}")]
    Migration { from: u32, reason: String },

    /// JSON (de)serialization of the persisted state failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying storage backend reported a failure (I/O, connection,
    /// disk full, etc). Opaque because the core has no business interpreting
    /// backend-specific errors.
    #[error("storage error: {0}")]
    Storage(String),

    /// The stored bytes did not form a valid checkpoint.
    #[error("invalid checkpoint: {0}")]
    Invalid(String),

    /// Filesystem or network I/O error from a backend that wraps one.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Escape hatch for backend-defined failures that don't fit above.
    #[error("{0}")]
    Custom(String),
}
