//! Persisted state envelope and schema version migration.
//!
//! `dialogue-checkpoint` does not know the shape of `DialogueState` — that
//! type lives in `dialogue-core`, one layer up. What this crate stores is a
//! [`PersistedState`]: a version-tagged JSON payload. `dialogue-core` is
//! responsible for serializing `DialogueState` into the payload before
//! `save`, and for deserializing it back out after `load` (migrating first
//! if the stored version is older than current).
//!
//! Per the core's contract: an unknown *newer* version is a hard error
//! (never guess); an older version is migrated by a registered
//! [`SchemaMigrator`], one step at a time, until it reaches
//! [`CURRENT_SCHEMA_VERSION`].

use crate::error::{CheckpointError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// The schema version this build of the core writes and expects to read.
///
/// Bump this whenever `DialogueState`'s on-disk shape changes, and register
/// a migrator from the previous version in [`MigrationRegistry`].
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// A versioned, opaque payload as stored by a [`crate::CheckpointStore`].
///
/// `payload` is whatever `serde_json::to_value` produced for the caller's
/// state type at write time. The checkpoint store treats it as inert data;
/// only the migration registry (driven by `dialogue-core`) interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub schema_version: u32,
    pub payload: serde_json::Value,
}

impl PersistedState {
    /// Wrap a payload at the current schema version.
    pub fn current(payload: serde_json::Value) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// A single version-to-version upgrade step: rewrites a JSON payload from
/// schema version `from` to `from + 1`.
pub type MigratorFn = Arc<dyn Fn(serde_json::Value) -> Result<serde_json::Value> + Send + Sync>;

/// Registry of migrators, keyed by the version they migrate *from*.
///
/// Shaped like other named-callback registries in this codebase (tool
/// registry, action registry): register once at process startup, look up by
/// key at runtime.
#[derive(Clone, Default)]
pub struct MigrationRegistry {
    migrators: HashMap<u32, MigratorFn>,
}

impl MigrationRegistry {
    /// Create an empty registry. With no migrators registered, any stored
    /// version older than current fails to load with a `Migration` error —
    /// which is correct until the first schema change actually ships.
    pub fn new() -> Self {
        Self {
            migrators: HashMap::new(),
        }
    }

    /// Register a migrator that upgrades payloads from `from_version` to
    /// `from_version + 1`.
    pub fn register<F>(&mut self, from_version: u32, migrator: F)
    where
        F: Fn(serde_json::Value) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.migrators.insert(from_version, Arc::new(migrator));
    }

    /// Migrate a stored payload forward to [`CURRENT_SCHEMA_VERSION`],
    /// applying one registered step at a time.
    ///
    /// Returns [`CheckpointError::UnsupportedSchemaVersion`] if the stored
    /// version is newer than current (never guess at a newer layout), and
    /// [`CheckpointError::Migration`] if an older version has no migrator
    /// registered for it.
    pub fn migrate(&self, stored: PersistedState) -> Result<serde_json::Value> {
        if stored.schema_version > CURRENT_SCHEMA_VERSION {
            return Err(CheckpointError::UnsupportedSchemaVersion {
                found: stored.schema_version,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }

        let mut version = stored.schema_version;
        let mut payload = stored.payload;
        while version < CURRENT_SCHEMA_VERSION {
            let migrator = self.migrators.get(&version).ok_or_else(|| {
                CheckpointError::Migration {
                    from: version,
                    reason: format!("no migrator registered for schema version {version}"),
                }
            })?;
            payload = migrator(payload)?;
            version += 1;
        }
        Ok(payload)
    }
}
