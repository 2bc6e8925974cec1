//! Typed OAuth discovery documents
//!
//! Discovery responses are arbitrary JSON from servers that often implement
//! the RFCs only partially, so every field here is optional. Consumers check
//! presence where they need a value (see
//! [`AuthorizationServerMetadata::has_required_endpoints`]).
//!
//! # References
//!
//! - RFC 9728 <https://www.rfc-editor.org/rfc/rfc9728>
//! - RFC 8414 <https://www.rfc-editor.org/rfc/rfc8414>

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Protected Resource Metadata (RFC 9728)
// ---------------------------------------------------------------------------

/// Metadata document describing a protected resource.
///
/// # Examples
///
/// ```
/// use mcpgate::mcp::auth::metadata::ProtectedResourceMetadata;
///
/// let meta: ProtectedResourceMetadata =
///     serde_json::from_str(r#"{"authorization_servers": ["https://auth.example.com"]}"#)
///         .unwrap();
/// assert!(meta.resource.is_none());
/// assert_eq!(meta.authorization_servers.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The URI of the protected resource itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Authorization server issuer URIs that protect this resource.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorization_servers: Vec<String>,

    /// OAuth scopes supported by this resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// Supported methods for presenting bearer tokens (e.g. `"header"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_methods_supported: Option<Vec<String>>,

    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Authorization Server Metadata (RFC 8414 / OIDC Discovery)
// ---------------------------------------------------------------------------

/// Metadata document describing an authorization server.
///
/// # Examples
///
/// ```
/// use mcpgate::mcp::auth::metadata::AuthorizationServerMetadata;
///
/// let meta: AuthorizationServerMetadata = serde_json::from_str(r#"{
///     "authorization_endpoint": "https://auth.example.com/authorize",
///     "token_endpoint": "https://auth.example.com/token"
/// }"#).unwrap();
/// assert!(meta.has_required_endpoints());
/// assert!(meta.registration_endpoint.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// Issuer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Authorization endpoint (RFC 6749 section 3.1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// Token endpoint (RFC 6749 section 3.2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// Dynamic Client Registration endpoint (RFC 7591).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    /// Token revocation endpoint (RFC 7009).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,

    /// Scopes the server supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// `response_type` values the server supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_types_supported: Option<Vec<String>>,

    /// `grant_type` values the server supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,

    /// Client authentication methods accepted at the token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,

    /// PKCE challenge methods the server supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl AuthorizationServerMetadata {
    /// True when both the authorization and token endpoints are known.
    pub fn has_required_endpoints(&self) -> bool {
        self.authorization_endpoint.is_some() && self.token_endpoint.is_some()
    }

    /// Fill endpoints this document lacks from `other`.
    ///
    /// Values already present are kept.
    pub fn fill_missing_from(&mut self, other: &AuthorizationServerMetadata) {
        fn fill(slot: &mut Option<String>, from: &Option<String>) {
            if slot.is_none() {
                slot.clone_from(from);
            }
        }
        fill(&mut self.issuer, &other.issuer);
        fill(&mut self.authorization_endpoint, &other.authorization_endpoint);
        fill(&mut self.token_endpoint, &other.token_endpoint);
        fill(&mut self.registration_endpoint, &other.registration_endpoint);
        fill(&mut self.revocation_endpoint, &other.revocation_endpoint);
    }

    /// Whether `value` appears in an optional advertised list.
    pub fn advertises(list: &Option<Vec<String>>, value: &str) -> bool {
        list.as_deref()
            .map(|items| items.iter().any(|item| item == value))
            .unwrap_or(false)
    }
}

/// Caller-supplied authorization endpoints that skip network discovery.
///
/// A server described this way is authorized by redirecting straight to
/// `authorization_url`; no client registration is attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMetadataHint {
    /// Authorization endpoint, or a complete pre-built authorization URL.
    pub authorization_url: String,
    /// Token endpoint.
    pub token_url: String,
    /// Revocation endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_url: Option<String>,
    /// Redirect URI registered with the provider; used when the
    /// authorization URL does not carry one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl From<&AuthMetadataHint> for AuthorizationServerMetadata {
    fn from(hint: &AuthMetadataHint) -> Self {
        Self {
            authorization_endpoint: Some(hint.authorization_url.clone()),
            token_endpoint: Some(hint.token_url.clone()),
            revocation_endpoint: hint.revocation_url.clone(),
            ..Self::default()
        }
    }
}
