//! Encrypted OAuth token storage
//!
//! [`CredentialVault`] pairs a [`TokenVault`] with a [`CredentialStore`]: tokens
//! are sealed before `set` and opened after `get`. A payload that fails to open
//! is reported as `McpGateError::Decryption`; it is never treated as "no token".

use std::sync::Arc;

use crate::error::{McpGateError, Result};
use crate::mcp::auth::token::OAuthToken;
use crate::store::{get_json, set_json, CredentialStore};
use crate::vault::{EncryptedPayload, TokenVault};

/// Sealed token storage keyed by server identifier.
#[derive(Debug, Clone)]
pub struct CredentialVault {
    vault: TokenVault,
    store: Arc<dyn CredentialStore>,
    identity: Option<String>,
}

impl CredentialVault {
    /// Create a vault writing to `store`, deriving keys for `identity`
    pub fn new(vault: TokenVault, store: Arc<dyn CredentialStore>, identity: Option<String>) -> Self {
        Self {
            vault,
            store,
            identity,
        }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    fn key(uti: &str) -> String {
        format!("token:{}", uti)
    }

    /// Seal and persist `token` for `uti`
    pub async fn save_token(&self, uti: &str, token: &OAuthToken) -> Result<()> {
        let json = serde_json::to_string(token).map_err(McpGateError::Serialization)?;
        let sealed = self.vault.seal(&json, self.identity.as_deref())?;
        set_json(self.store.as_ref(), &Self::key(uti), &sealed).await?;
        tracing::debug!("Stored sealed token for {}", uti);
        Ok(())
    }

    /// Load and open the token for `uti`
    ///
    /// # Returns
    ///
    /// `Ok(None)` when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Decryption` if the stored payload does not open
    /// under the current key, and `McpGateError::Serialization` if the opened
    /// plaintext is not a token.
    pub async fn load_token(&self, uti: &str) -> Result<Option<OAuthToken>> {
        let sealed: Option<EncryptedPayload> = get_json(self.store.as_ref(), &Self::key(uti)).await?;
        let Some(sealed) = sealed else {
            return Ok(None);
        };
        let json = self.vault.open(&sealed, self.identity.as_deref())?;
        let token = serde_json::from_str(&json).map_err(McpGateError::Serialization)?;
        Ok(Some(token))
    }

    /// Remove any stored token for `uti`
    pub async fn delete_token(&self, uti: &str) -> Result<()> {
        self.store.delete(&Self::key(uti)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCredentialStore;

    fn vault_with(store: Arc<MemoryCredentialStore>, secret: &str) -> CredentialVault {
        CredentialVault::new(
            TokenVault::with_secret(secret).unwrap(),
            store,
            Some("ada".to_string()),
        )
    }

    #[tokio::test]
    async fn test_token_is_sealed_at_rest() {
        let store = Arc::new(MemoryCredentialStore::new());
        let vault = vault_with(store.clone(), "s3cret");
        vault
            .save_token("github", &OAuthToken::bearer("plain-access-token"))
            .await
            .unwrap();

        let raw = store.get("token:github").await.unwrap().unwrap();
        let raw = String::from_utf8(raw).unwrap();
        assert!(!raw.contains("plain-access-token"));
        assert!(raw.contains("encryptedData"));

        let loaded = vault.load_token("github").await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "plain-access-token");
    }

    #[tokio::test]
    async fn test_missing_token_is_none() {
        let vault = vault_with(Arc::new(MemoryCredentialStore::new()), "s3cret");
        assert!(vault.load_token("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_key_is_decryption_error_not_none() {
        let store = Arc::new(MemoryCredentialStore::new());
        vault_with(store.clone(), "first")
            .save_token("github", &OAuthToken::bearer("t"))
            .await
            .unwrap();

        let err = vault_with(store, "second")
            .load_token("github")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<McpGateError>(),
            Some(McpGateError::Decryption(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_token() {
        let store = Arc::new(MemoryCredentialStore::new());
        let vault = vault_with(store, "s3cret");
        vault.save_token("x", &OAuthToken::bearer("t")).await.unwrap();
        vault.delete_token("x").await.unwrap();
        assert!(vault.load_token("x").await.unwrap().is_none());
    }
}
