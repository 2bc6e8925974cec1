//! Credential store backed by the OS keyring
//!
//! Uses Keychain on macOS, Secret Service on Linux and Credential Manager on
//! Windows. The keyring holds strings, so values are base64-encoded.

use crate::error::{McpGateError, Result};
use crate::store::CredentialStore;
use async_trait::async_trait;
use base64::Engine as _;

/// Keyring-backed [`CredentialStore`].
///
/// Each key becomes its own keyring entry under the `mcpgate` service
/// namespace. Keyring calls block, so they run on the blocking pool.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new("mcpgate")
    }
}

impl KeyringCredentialStore {
    /// Create a store namespaced under `service`
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(service: &str, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(service, key).map_err(|e| McpGateError::Keyring(e).into())
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(String) -> Result<T> + Send + 'static,
    {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || f(service))
            .await
            .map_err(|e| McpGateError::Storage(format!("Keyring task failed: {}", e)))?
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.blocking(move |service| {
            let entry = Self::entry(&service, &key)?;
            match entry.get_password() {
                Ok(encoded) => base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map(Some)
                    .map_err(|e| {
                        McpGateError::Storage(format!("Corrupt keyring value for {}: {}", key, e))
                            .into()
                    }),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(McpGateError::Keyring(e).into()),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let key = key.to_string();
        let encoded = base64::engine::general_purpose::STANDARD.encode(value);
        self.blocking(move |service| {
            Self::entry(&service, &key)?
                .set_password(&encoded)
                .map_err(|e| McpGateError::Keyring(e).into())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |service| {
            let entry = Self::entry(&service, &key)?;
            match entry.delete_password() {
                Ok(()) => Ok(()),
                Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(McpGateError::Keyring(e).into()),
            }
        })
        .await
    }
}
