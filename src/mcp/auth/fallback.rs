//! Static OAuth endpoint table for well-known providers
//!
//! Many hosted MCP servers sit behind a provider whose OAuth endpoints are
//! stable but who do not publish RFC 8414 metadata next to the MCP endpoint.
//! When discovery comes up empty, [`ProviderFallbacks`] supplies those
//! endpoints by provider name. Entries are additive: configuration can add or
//! override providers without touching discovery.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::mcp::auth::metadata::AuthorizationServerMetadata;

/// Known endpoints for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    /// Authorization endpoint
    pub authorization_endpoint: String,
    /// Token endpoint
    pub token_endpoint: String,
    /// Revocation endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    /// Pre-registered public client id, for providers without dynamic registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl ProviderEndpoints {
    fn new(authorization_endpoint: &str, token_endpoint: &str) -> Self {
        Self {
            authorization_endpoint: authorization_endpoint.to_string(),
            token_endpoint: token_endpoint.to_string(),
            revocation_endpoint: None,
            client_id: None,
        }
    }

    fn with_revocation(mut self, endpoint: &str) -> Self {
        self.revocation_endpoint = Some(endpoint.to_string());
        self
    }

    /// Express these endpoints as (partial) authorization server metadata
    pub fn to_metadata(&self) -> AuthorizationServerMetadata {
        AuthorizationServerMetadata {
            authorization_endpoint: Some(self.authorization_endpoint.clone()),
            token_endpoint: Some(self.token_endpoint.clone()),
            revocation_endpoint: self.revocation_endpoint.clone(),
            ..AuthorizationServerMetadata::default()
        }
    }
}

/// Provider name to endpoint mapping. Lookups are case-insensitive.
///
/// # Examples
///
/// ```
/// use mcpgate::mcp::auth::fallback::{ProviderEndpoints, ProviderFallbacks};
///
/// let mut table = ProviderFallbacks::builtin();
/// assert!(table.get("GitHub").is_some());
///
/// table.insert("acme", ProviderEndpoints {
///     authorization_endpoint: "https://id.acme.test/authorize".to_string(),
///     token_endpoint: "https://id.acme.test/token".to_string(),
///     revocation_endpoint: None,
///     client_id: None,
/// });
/// assert!(table.get("acme").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProviderFallbacks {
    providers: HashMap<String, ProviderEndpoints>,
}

impl ProviderFallbacks {
    /// An empty table
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in table
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        table.insert(
            "github",
            ProviderEndpoints::new(
                "https://github.com/login/oauth/authorize",
                "https://github.com/login/oauth/access_token",
            ),
        );
        table.insert(
            "google",
            ProviderEndpoints::new(
                "https://accounts.google.com/o/oauth2/v2/auth",
                "https://oauth2.googleapis.com/token",
            )
            .with_revocation("https://oauth2.googleapis.com/revoke"),
        );
        table.insert(
            "slack",
            ProviderEndpoints::new(
                "https://slack.com/oauth/v2/authorize",
                "https://slack.com/api/oauth.v2.access",
            )
            .with_revocation("https://slack.com/api/auth.revoke"),
        );
        table.insert(
            "notion",
            ProviderEndpoints::new(
                "https://api.notion.com/v1/oauth/authorize",
                "https://api.notion.com/v1/oauth/token",
            ),
        );
        table.insert(
            "linear",
            ProviderEndpoints::new(
                "https://linear.app/oauth/authorize",
                "https://api.linear.app/oauth/token",
            )
            .with_revocation("https://api.linear.app/oauth/revoke"),
        );
        table
    }

    /// Add or replace a provider
    pub fn insert(&mut self, name: &str, endpoints: ProviderEndpoints) {
        self.providers.insert(name.to_ascii_lowercase(), endpoints);
    }

    /// Merge `extra` over this table
    pub fn extend(&mut self, extra: &HashMap<String, ProviderEndpoints>) {
        for (name, endpoints) in extra {
            self.insert(name, endpoints.clone());
        }
    }

    /// Look up a provider by name
    pub fn get(&self, name: &str) -> Option<&ProviderEndpoints> {
        self.providers.get(&name.to_ascii_lowercase())
    }

    /// Number of providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
