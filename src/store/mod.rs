//! Pluggable key-value storage for client-side credentials
//!
//! Everything the client must remember between requests (encrypted OAuth
//! tokens, issued client ids, PKCE verifiers waiting for a redirect) goes
//! through the [`CredentialStore`] trait. The core never assumes a medium.
//!
//! # Module Layout
//!
//! - [`MemoryCredentialStore`] -- process-local map, used by tests and
//!   short-lived CLI runs
//! - [`sled_store::SledCredentialStore`] -- durable embedded database
//! - [`keyring_store::KeyringCredentialStore`] -- OS credential manager

pub mod keyring_store;
pub mod sled_store;

use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub use keyring_store::KeyringCredentialStore;
pub use sled_store::SledCredentialStore;

/// Byte-oriented credential storage.
///
/// Implementations must be safe to share across tasks. Deleting a missing key
/// is not an error.
#[async_trait]
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    /// Fetch the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove `key`
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Fetch and deserialize a JSON value from `store`
///
/// # Errors
///
/// Returns the store's error, or `McpGateError::Serialization` when the stored
/// bytes are not valid JSON for `T`.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn CredentialStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => Ok(Some(
            serde_json::from_slice(&bytes).map_err(crate::error::McpGateError::Serialization)?,
        )),
        None => Ok(None),
    }
}

/// Serialize `value` as JSON and store it under `key`
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn CredentialStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(value).map_err(crate::error::McpGateError::Serialization)?;
    store.set(key, &bytes).await
}

/// In-memory store; contents vanish with the process.
///
/// # Examples
///
/// ```
/// use mcpgate::store::{CredentialStore, MemoryCredentialStore};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = MemoryCredentialStore::new();
/// store.set("k", b"v").await.unwrap();
/// assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
/// # });
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryCredentialStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryCredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_set_get_delete() {
        let store = MemoryCredentialStore::new();
        assert!(store.get("missing").await.unwrap().is_none());

        store.set("a", b"1").await.unwrap();
        store.set("a", b"2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(store.len().await, 1);

        store.delete("a").await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = MemoryCredentialStore::new();
        set_json(&store, "obj", &serde_json::json!({"client_id": "abc"}))
            .await
            .unwrap();
        let value: Option<serde_json::Value> = get_json(&store, "obj").await.unwrap();
        assert_eq!(value.unwrap()["client_id"], "abc");
    }

    #[tokio::test]
    async fn test_json_helper_rejects_garbage() {
        let store = MemoryCredentialStore::new();
        store.set("bad", b"{not json").await.unwrap();
        let result: Result<Option<serde_json::Value>> = get_json(&store, "bad").await;
        assert!(result.is_err());
    }
}
