//! # dialogue-checkpoint — state persistence for the dialogue orchestration core
//!
//! This crate owns exactly one concern: atomically loading and saving a
//! per-conversation state blob, keyed by a stable **user key**. It knows
//! nothing about flows, slots, or commands — those types live in
//! `dialogue-core`, which serializes its `DialogueState` down to a
//! [`PersistedState`] before handing it here.
//!
//! ## Why so narrow
//!
//! The dialogue core checkpoints only at turn boundaries (suspend or
//! completion), never mid-turn (`spec.md` §4.7, §5). There is no superstep
//! history to replay, no time-travel debugging requirement, and no need to
//! version individual state fields independently — the whole state is
//! swapped atomically, once per turn. That lets this crate be much smaller
//! than a general graph-checkpointing system: one trait
//! ([`CheckpointStore`]), one reference implementation
//! ([`InMemoryCheckpointStore`]), and a small schema-version migration
//! registry ([`MigrationRegistry`]) for the rare case where `DialogueState`'s
//! on-disk shape changes between releases.
//!
//! ## Quick start
//!
//! ```rust
//! use dialogue_checkpoint::{CheckpointStore, InMemoryCheckpointStore, PersistedState};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryCheckpointStore::new();
//!
//! let state = PersistedState::current(serde_json::json!({"turn_counter": 0}));
//! store.save("user-42", state).await?;
//!
//! if let Some(loaded) = store.load("user-42").await? {
//!     println!("schema_version = {}", loaded.schema_version);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Writing a custom backend
//!
//! See the [`store`] module docs for a worked example against a SQL
//! backend. A null (in-memory) store satisfies the contract for
//! single-process deployments; anything that needs to survive a process
//! restart needs a real implementation of [`CheckpointStore`].

pub mod error;
pub mod memory;
pub mod schema;
pub mod store;

pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointStore;
pub use schema::{MigrationRegistry, MigratorFn, PersistedState, CURRENT_SCHEMA_VERSION};
pub use store::CheckpointStore;
