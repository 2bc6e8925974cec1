//! OAuth discovery after a `401 Unauthorized`
//!
//! [`AuthDiscovery`] turns a rejected connection attempt into a
//! [`ConnectionStatus`] describing how to authenticate. Discovery degrades
//! rather than aborts: each document is fetched independently, a missing or
//! failing document falls back to the next source, and only when no source
//! yields both an authorization and a token endpoint does the result become
//! `error`.
//!
//! # Discovery sequence
//!
//! 1. A descriptor carrying an authorization hint short-circuits to
//!    `authenticate` with no network traffic.
//! 2. The `resource_metadata="…"` attribute of `WWW-Authenticate`, when
//!    present, names the RFC 9728 resource metadata document.
//! 3. The RFC 8414 document is looked up next to the MCP endpoint: a trailing
//!    `/mcp` or `/sse` segment is stripped and
//!    `/.well-known/oauth-authorization-server` appended.
//! 4. Both documents are fetched concurrently. If the server-relative RFC 8414
//!    document is missing but resource metadata names an authorization server,
//!    that issuer's well-known locations are tried. Remaining gaps are filled
//!    from the provider fallback table.
//!
//! # References
//!
//! - RFC 9728 <https://www.rfc-editor.org/rfc/rfc9728>
//! - RFC 8414 <https://www.rfc-editor.org/rfc/rfc8414>

use std::sync::{Arc, OnceLock};

use regex::Regex;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{McpGateError, Result};
use crate::manager::status::{ConnectionState, ConnectionStatus, ServerDescriptor};
use crate::mcp::auth::fallback::ProviderFallbacks;
use crate::mcp::auth::metadata::{AuthorizationServerMetadata, ProtectedResourceMetadata};
use crate::network::gate::{GateRequest, NetworkGate};

/// Path segment appended to locate RFC 8414 metadata.
pub const AUTH_SERVER_WELL_KNOWN: &str = "/.well-known/oauth-authorization-server";

fn resource_metadata_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"resource_metadata\s*=\s*(?:"([^"]+)"|([^\s,]+))"#).ok())
        .as_ref()
}

/// Extract the `resource_metadata` URL from a `WWW-Authenticate` value.
///
/// Accepts quoted and unquoted attribute values.
///
/// # Examples
///
/// ```
/// use mcpgate::mcp::auth::discovery::parse_resource_metadata_url;
///
/// let header = r#"Bearer realm="mcp", resource_metadata="https://ex.com/meta""#;
/// assert_eq!(parse_resource_metadata_url(header).as_deref(), Some("https://ex.com/meta"));
/// assert!(parse_resource_metadata_url("Bearer realm=\"mcp\"").is_none());
/// ```
pub fn parse_resource_metadata_url(www_authenticate: &str) -> Option<String> {
    let caps = resource_metadata_regex()?.captures(www_authenticate)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Build the server-relative RFC 8414 metadata URL for an MCP endpoint.
///
/// # Examples
///
/// ```
/// use mcpgate::mcp::auth::discovery::authorization_server_well_known;
///
/// assert_eq!(
///     authorization_server_well_known("http://localhost:8081/mcp").unwrap(),
///     "http://localhost:8081/.well-known/oauth-authorization-server"
/// );
/// assert_eq!(
///     authorization_server_well_known("https://api.example.com/v1/sse?x=1").unwrap(),
///     "https://api.example.com/v1/.well-known/oauth-authorization-server"
/// );
/// ```
pub fn authorization_server_well_known(server_url: &str) -> Result<String> {
    let mut url = Url::parse(server_url)
        .map_err(|e| McpGateError::DiscoveryDegraded(format!("invalid server URL: {e}")))?;

    let path = url.path().trim_end_matches('/');
    let base = path
        .strip_suffix("/mcp")
        .or_else(|| path.strip_suffix("/sse"))
        .unwrap_or(path)
        .to_string();

    url.set_path(&format!("{}{}", base, AUTH_SERVER_WELL_KNOWN));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

/// RFC 8414 / OpenID Connect candidate metadata URLs for an issuer.
///
/// Ordered: path-inserted OAuth, path-inserted OIDC, path-appended OIDC, then
/// root OAuth and root OIDC. Duplicates are dropped for path-less issuers.
pub fn issuer_candidate_urls(issuer: &str) -> Vec<String> {
    let Ok(issuer) = Url::parse(issuer) else {
        return Vec::new();
    };
    let path = issuer.path().trim_end_matches('/').to_string();

    let with_path = |p: String| {
        let mut u = issuer.clone();
        u.set_path(&p);
        u.set_query(None);
        u.set_fragment(None);
        u.to_string()
    };

    let mut candidates = vec![
        with_path(format!("{}{}", AUTH_SERVER_WELL_KNOWN, path)),
        with_path(format!("/.well-known/openid-configuration{}", path)),
        with_path(format!("{}/.well-known/openid-configuration", path)),
        with_path(AUTH_SERVER_WELL_KNOWN.to_string()),
        with_path("/.well-known/openid-configuration".to_string()),
    ];
    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.clone()));
    candidates
}

/// Resolves authentication requirements for a server that answered 401.
#[derive(Debug, Clone)]
pub struct AuthDiscovery {
    gate: NetworkGate,
    fallbacks: Arc<ProviderFallbacks>,
}

impl AuthDiscovery {
    /// Create a discovery engine
    pub fn new(gate: NetworkGate, fallbacks: Arc<ProviderFallbacks>) -> Self {
        Self { gate, fallbacks }
    }

    /// Describe how to authenticate against `descriptor`
    ///
    /// # Arguments
    ///
    /// * `descriptor` - Server that rejected the connection
    /// * `www_authenticate` - `WWW-Authenticate` value from the 401, if any
    ///
    /// # Returns
    ///
    /// `authenticate` when authorization and token endpoints are known,
    /// otherwise `error`. Captured metadata is attached either way.
    pub async fn discover(
        &self,
        descriptor: &ServerDescriptor,
        www_authenticate: Option<&str>,
    ) -> ConnectionStatus {
        if let Some(hint) = &descriptor.auth_metadata_hint {
            tracing::debug!("{}: using caller-supplied authorization hint", descriptor.uti);
            let mut status = ConnectionStatus::new(ConnectionState::Authenticate);
            status.remote_auth_server_metadata = Some(AuthorizationServerMetadata::from(hint));
            return status;
        }

        let resource_metadata_url = www_authenticate.and_then(parse_resource_metadata_url);
        let well_known = match authorization_server_well_known(&descriptor.uri) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!("{}: {}", descriptor.uti, e);
                None
            }
        };

        let resource_fut = async {
            match &resource_metadata_url {
                Some(url) => {
                    self.fetch_document::<ProtectedResourceMetadata>(&descriptor.uti, url)
                        .await
                }
                None => {
                    tracing::debug!(
                        "{}: no resource_metadata in WWW-Authenticate; relying on fallbacks",
                        descriptor.uti
                    );
                    None
                }
            }
        };
        let server_fut = async {
            match &well_known {
                Some(url) => {
                    self.fetch_document::<AuthorizationServerMetadata>(&descriptor.uti, url)
                        .await
                }
                None => None,
            }
        };
        let (resource_metadata, mut server_metadata) = tokio::join!(resource_fut, server_fut);

        if server_metadata.is_none() {
            if let Some(issuer) = resource_metadata
                .as_ref()
                .and_then(|m| m.authorization_servers.first())
            {
                server_metadata = self.fetch_from_issuer(&descriptor.uti, issuer).await;
            }
        }

        let mut merged = server_metadata.unwrap_or_default();
        if !merged.has_required_endpoints() {
            match self.fallbacks.get(&descriptor.auth_provider) {
                Some(endpoints) => {
                    tracing::info!(
                        "{}: filling authorization endpoints from '{}' fallback",
                        descriptor.uti,
                        descriptor.auth_provider
                    );
                    merged.fill_missing_from(&endpoints.to_metadata());
                }
                None => tracing::debug!(
                    "{}: no fallback entry for provider '{}'",
                    descriptor.uti,
                    descriptor.auth_provider
                ),
            }
        }

        let has_endpoints = merged.has_required_endpoints();
        let mut status = if has_endpoints {
            ConnectionStatus::new(ConnectionState::Authenticate)
        } else {
            ConnectionStatus::error(
                McpGateError::DiscoveryDegraded(format!(
                    "no authorization and token endpoints found for {}",
                    descriptor.uri
                ))
                .to_string(),
            )
        };
        status.remote_metadata = resource_metadata;
        status.remote_auth_server_metadata =
            (merged != AuthorizationServerMetadata::default()).then_some(merged);

        tracing::info!("{}: discovery finished with {}", descriptor.uti, status.state);
        status
    }

    async fn fetch_from_issuer(
        &self,
        uti: &str,
        issuer: &str,
    ) -> Option<AuthorizationServerMetadata> {
        for candidate in issuer_candidate_urls(issuer) {
            if let Some(meta) = self
                .fetch_document::<AuthorizationServerMetadata>(uti, &candidate)
                .await
            {
                return Some(meta);
            }
        }
        None
    }

    /// GET a JSON discovery document. Every failure degrades to `None`.
    async fn fetch_document<T: DeserializeOwned>(&self, uti: &str, url: &str) -> Option<T> {
        let request = GateRequest::get().with_accept("application/json");
        let resp = match self.gate.fetch(url, request).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("{}: discovery fetch of {} failed: {}", uti, url, e);
                return None;
            }
        };

        match resp.status() {
            status if status.is_success() => match resp.json::<T>().await {
                Ok(doc) => Some(doc),
                Err(e) => {
                    tracing::warn!("{}: {} returned unparseable metadata: {}", uti, url, e);
                    None
                }
            },
            StatusCode::NOT_FOUND => {
                tracing::debug!("{}: {} not found; using fallback", uti, url);
                None
            }
            status => {
                tracing::warn!("{}: {} returned HTTP {}", uti, url, status.as_u16());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resource_metadata_unquoted() {
        assert_eq!(
            parse_resource_metadata_url("Bearer resource_metadata=https://ex.com/meta, scope=x")
                .as_deref(),
            Some("https://ex.com/meta")
        );
    }

    #[test]
    fn test_parse_resource_metadata_among_other_params() {
        let header = r#"Bearer error="invalid_token", resource_metadata="https://ex.com/.well-known/oauth-protected-resource/mcp", scope="read""#;
        assert_eq!(
            parse_resource_metadata_url(header).as_deref(),
            Some("https://ex.com/.well-known/oauth-protected-resource/mcp")
        );
    }

    #[test]
    fn test_well_known_without_suffix_keeps_path() {
        assert_eq!(
            authorization_server_well_known("https://ex.com/api/").unwrap(),
            "https://ex.com/api/.well-known/oauth-authorization-server"
        );
        assert_eq!(
            authorization_server_well_known("https://ex.com").unwrap(),
            "https://ex.com/.well-known/oauth-authorization-server"
        );
    }

    #[test]
    fn test_well_known_only_strips_whole_segment() {
        assert_eq!(
            authorization_server_well_known("https://ex.com/nomcp").unwrap(),
            "https://ex.com/nomcp/.well-known/oauth-authorization-server"
        );
    }

    #[test]
    fn test_issuer_candidates_with_path() {
        let candidates = issuer_candidate_urls("https://auth.example.com/tenant1");
        assert_eq!(
            candidates,
            vec![
                "https://auth.example.com/.well-known/oauth-authorization-server/tenant1",
                "https://auth.example.com/.well-known/openid-configuration/tenant1",
                "https://auth.example.com/tenant1/.well-known/openid-configuration",
                "https://auth.example.com/.well-known/oauth-authorization-server",
                "https://auth.example.com/.well-known/openid-configuration",
            ]
        );
    }

    #[test]
    fn test_issuer_candidates_without_path_are_deduplicated() {
        let candidates = issuer_candidate_urls("https://auth.example.com");
        assert_eq!(
            candidates,
            vec![
                "https://auth.example.com/.well-known/oauth-authorization-server",
                "https://auth.example.com/.well-known/openid-configuration",
            ]
        );
    }
}
