//! The [`CheckpointStore`] trait — the only abstraction the core needs from
//! a persistence backend.
//!
//! The contract is deliberately narrow: `load` and `save`, both atomic at
//! user-key granularity. This is narrower than a full `CheckpointSaver`
//! (no superstep-level `put_writes`, no history `list`, no channel
//! versioning) because the dialogue core only ever checkpoints
//! at turn boundaries — there is no intra-turn state worth persisting, and
//! no time-travel requirement in this spec. A backend that wants history
//! anyway (e.g. to support an ops dashboard) is free to layer it on top by
//! keeping old rows around; the core never asks for them back.
//!
//! # Implementing a custom backend
//!
//! ```rust,ignore
//! use dialogue_checkpoint::{CheckpointStore, PersistedState, Result};
//! use async_trait::async_trait;
//!
//! struct PostgresCheckpointStore {
//!     pool: sqlx::PgPool,
//! }
//!
//! #[async_trait]
//! impl CheckpointStore for PostgresCheckpointStore {
//!     async fn load(&self, user_key: &str) -> Result<Option<PersistedState>> {
//!         // SELECT payload, schema_version FROM checkpoints WHERE user_key = $1
//!         todo!()
//!     }
//!
//!     async fn save(&self, user_key: &str, state: PersistedState) -> Result<()> {
//!         // INSERT ... ON CONFLICT (user_key) DO UPDATE SET payload = $2, schema_version = $3
//!         todo!()
//!     }
//! }
//! ```

use crate::error::Result;
use crate::schema::PersistedState;
use async_trait::async_trait;

/// Storage backend for per-conversation dialogue state.
///
/// Implementations must be `Send + Sync`: the core may hold one behind an
/// `Arc` and call it concurrently for distinct user keys. Atomicity is
/// required only *within* a user key — the core relies on no other
/// guarantee (see `spec.md` §5, "Shared resources").
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the most recently saved state for `user_key`.
    ///
    /// Returns `Ok(None)` if no checkpoint has ever been saved for this key
    /// — this is the normal "new conversation" case, not an error. A
    /// backend-level failure (connection down, corrupt row) should be
    /// surfaced as `Err`; the core logs it and falls back to a fresh state
    /// rather than failing the turn (`spec.md` §7: checkpoint load errors
    /// are recoverable).
    async fn load(&self, user_key: &str) -> Result<Option<PersistedState>>;

    /// Atomically replace the saved state for `user_key`.
    ///
    /// Called exactly once per turn, at the turn's boundary (suspend or
    /// completion) — never mid-turn. A failure here is not recoverable by
    /// the core: the turn that produced `state` is lost (`spec.md` §7).
    async fn save(&self, user_key: &str, state: PersistedState) -> Result<()>;

    /// Remove all persisted state for `user_key`.
    ///
    /// Optional: most backends can implement this trivially, and the core
    /// never calls it during normal turn processing. It exists for
    /// embedders that want to offer "forget this conversation" as an
    /// operator action. Default is a no-op, matching a `delete_thread`
    /// default.
    async fn delete(&self, user_key: &str) -> Result<()> {
        let _ = user_key;
        Ok(())
    }
}
