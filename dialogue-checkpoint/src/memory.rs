//! In-memory reference implementation of [`CheckpointStore`].
//!
//! Suitable for single-process development and testing, and for any
//! deployment that doesn't need survivability across process restarts — the
//! spec explicitly allows this ("a null store... satisfies the contract").
//! For cross-process durability, implement `CheckpointStore` against a real
//! backend (see the module docs on [`crate::store`]).

use crate::error::Result;
use crate::schema::PersistedState;
use crate::store::CheckpointStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory checkpoint storage, one entry per user key.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    storage: Arc<RwLock<HashMap<String, PersistedState>>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of user keys with a saved checkpoint. Test/introspection only.
    pub async fn key_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Drop all checkpoints. Test-only convenience.
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, user_key: &str) -> Result<Option<PersistedState>> {
        Ok(self.storage.read().await.get(user_key).cloned())
    }

    async fn save(&self, user_key: &str, state: PersistedState) -> Result<()> {
        self.storage
            .write()
            .await
            .insert(user_key.to_string(), state);
        Ok(())
    }

    async fn delete(&self, user_key: &str) -> Result<()> {
        self.storage.write().await.remove(user_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn load_on_empty_store_returns_none() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = InMemoryCheckpointStore::new();
        let state = PersistedState::current(json!({"turn_counter": 2}));
        store.save("u1", state.clone()).await.unwrap();

        let loaded = store.load("u1").await.unwrap().unwrap();
        assert_eq!(loaded.schema_version, state.schema_version);
        assert_eq!(loaded.payload, state.payload);
    }

    #[tokio::test]
    async fn distinct_user_keys_do_not_interfere() {
        let store = InMemoryCheckpointStore::new();
        store
            .save("u1", PersistedState::current(json!({"v": 1})))
            .await
            .unwrap();
        store
            .save("u2", PersistedState::current(json!({"v": 2})))
            .await
            .unwrap();

        assert_eq!(
            store.load("u1").await.unwrap().unwrap().payload,
            json!({"v": 1})
        );
        assert_eq!(
            store.load("u2").await.unwrap().unwrap().payload,
            json!({"v": 2})
        );
    }

    #[tokio::test]
    async fn delete_removes_checkpoint() {
        let store = InMemoryCheckpointStore::new();
        store
            .save("u1", PersistedState::current(json!({})))
            .await
            .unwrap();
        store.delete("u1").await.unwrap();
        assert!(store.load("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_previous_checkpoint() {
        let store = InMemoryCheckpointStore::new();
        store
            .save("u1", PersistedState::current(json!({"turn_counter": 1})))
            .await
            .unwrap();
        store
            .save("u1", PersistedState::current(json!({"turn_counter": 2})))
            .await
            .unwrap();

        let loaded = store.load("u1").await.unwrap().unwrap();
        assert_eq!(loaded.payload, json!({"turn_counter": 2}));
    }
}
