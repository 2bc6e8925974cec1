//! Durable credential store on an embedded sled database

use crate::error::{McpGateError, Result};
use crate::store::CredentialStore;
use async_trait::async_trait;
use sled::Db;
use std::path::Path;

/// Credential store persisted to a sled database directory.
///
/// Every write is flushed before returning so a crash right after an OAuth
/// redirect does not lose the PKCE verifier.
#[derive(Debug, Clone)]
pub struct SledCredentialStore {
    db: Db,
}

impl SledCredentialStore {
    /// Open (or create) the store at `path`
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Storage` if the database cannot be opened.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| McpGateError::Storage(format!("Failed to open database: {}", e)))?;
        Ok(Self { db })
    }

    /// Default location under the platform data directory
    pub fn default_path() -> Option<std::path::PathBuf> {
        directories::ProjectDirs::from("", "", "mcpgate")
            .map(|dirs| dirs.data_dir().join("credentials"))
    }
}

#[async_trait]
impl CredentialStore for SledCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .db
            .get(key.as_bytes())
            .map_err(|e| McpGateError::Storage(format!("Get failed: {}", e)))?;
        Ok(value.map(|v| v.to_vec()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| McpGateError::Storage(format!("Insert failed: {}", e)))?;
        self.db
            .flush_async()
            .await
            .map_err(|e| McpGateError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.db
            .remove(key.as_bytes())
            .map_err(|e| McpGateError::Storage(format!("Remove failed: {}", e)))?;
        self.db
            .flush_async()
            .await
            .map_err(|e| McpGateError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}
