//! Dynamic client registration and authorization URL construction
//!
//! [`OAuthNegotiator`] takes the authorization server metadata produced by
//! discovery and turns it into something a user can click:
//!
//! 1. [`OAuthNegotiator::create`] builds a registration payload adapted to
//!    what the server advertises (grant types, response types, client
//!    authentication method, PKCE).
//! 2. [`OAuthNegotiator::register`] posts it to the registration endpoint
//!    (RFC 7591). A `422` is retried exactly once with a minimal payload.
//! 3. [`OAuthNegotiator::build_authorization_url`] produces the URL the user
//!    visits. `state` carries the server identifier so the redirect can be
//!    routed back to the right session.
//!
//! Servers described by a caller-supplied [`AuthMetadataHint`] skip all of
//! the above: [`OAuthNegotiator::direct_authorization`] redirects straight
//! to the hint's URL.
//!
//! The issued client and the PKCE verifier are persisted in the credential
//! store so [`OAuthNegotiator::exchange_code`] can finish the flow when the
//! redirect arrives, possibly in another request.
//!
//! # References
//!
//! - RFC 7591 <https://www.rfc-editor.org/rfc/rfc7591>
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use std::sync::Arc;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{McpGateError, Result};
use crate::mcp::auth::metadata::{AuthMetadataHint, AuthorizationServerMetadata};
use crate::mcp::auth::pkce::{self, PkceChallenge};
use crate::mcp::auth::token::{self, ClientCredentials, OAuthToken};
use crate::network::gate::{GateRequest, NetworkGate};
use crate::store::{self, CredentialStore};

const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
const GRANT_REFRESH_TOKEN: &str = "refresh_token";
const AUTH_METHOD_NONE: &str = "none";
const AUTH_METHOD_SECRET_POST: &str = "client_secret_post";
const AUTH_METHOD_SECRET_BASIC: &str = "client_secret_basic";

/// Store key for the issued client record of `uti`
pub fn client_key(uti: &str) -> String {
    format!("oauth:client:{uti}")
}

/// Store key for the in-flight authorization of `uti`
pub fn pending_key(uti: &str) -> String {
    format!("oauth:pending:{uti}")
}

// ---------------------------------------------------------------------------
// Registration payload
// ---------------------------------------------------------------------------

/// Client registration request body.
///
/// `id` is the server identifier and is not sent. The PKCE fields ride along
/// with the body; servers that reject unknown fields answer `422`, which
/// triggers the minimal retry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OAuthClientRegistration {
    /// Server identifier; becomes the `state` parameter
    #[serde(skip)]
    pub id: String,
    /// Human-readable client name
    pub client_name: String,
    /// Redirect URIs
    pub redirect_uris: Vec<String>,
    /// Requested grant types
    pub grant_types: Vec<String>,
    /// Requested response types
    pub response_types: Vec<String>,
    /// Requested scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Token endpoint client authentication method
    pub token_endpoint_auth_method: String,
    /// `web` or `native`
    pub application_type: String,
    /// PKCE challenge, when PKCE is in use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    /// PKCE challenge method, when PKCE is in use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,
}

impl OAuthClientRegistration {
    /// Whether PKCE parameters will be sent
    pub fn uses_pkce(&self) -> bool {
        self.code_challenge.is_some()
    }

    /// The body used for the single retry after a `422`
    fn minimal_body(&self) -> serde_json::Value {
        serde_json::json!({
            "client_name": self.client_name,
            "redirect_uris": self.redirect_uris,
        })
    }
}

/// Client record issued by the registration endpoint (or pre-registered).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClient {
    /// Issued client id
    pub client_id: String,
    /// Issued client secret, for confidential clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Token endpoint this client talks to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
}

impl RegisteredClient {
    /// Borrow as token request credentials
    pub fn credentials(&self) -> ClientCredentials<'_> {
        ClientCredentials {
            client_id: &self.client_id,
            client_secret: self.client_secret.as_deref(),
        }
    }
}

/// State kept between building the authorization URL and the redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    /// Client the authorization was requested for
    pub client_id: String,
    /// Client secret, if one was issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// PKCE verifier, when PKCE was used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,
    /// Token endpoint for the code exchange
    pub token_endpoint: String,
    /// Redirect URI sent on the authorization request
    pub redirect_uri: String,
}

// ---------------------------------------------------------------------------
// Negotiator
// ---------------------------------------------------------------------------

/// Client-side settings that go into every registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatorSettings {
    /// `client_name` sent on registration
    pub client_name: String,
    /// Redirect URI for the authorization code
    pub redirect_uri: String,
    /// Requested scope
    pub scope: Option<String>,
}

/// Drives registration and the authorization code flow for one runtime.
#[derive(Debug, Clone)]
pub struct OAuthNegotiator {
    gate: NetworkGate,
    store: Arc<dyn CredentialStore>,
    settings: NegotiatorSettings,
}

impl OAuthNegotiator {
    /// Create a negotiator
    pub fn new(
        gate: NetworkGate,
        store: Arc<dyn CredentialStore>,
        settings: NegotiatorSettings,
    ) -> Self {
        Self {
            gate,
            store,
            settings,
        }
    }

    /// Settings in use
    pub fn settings(&self) -> &NegotiatorSettings {
        &self.settings
    }

    /// A fresh PKCE pair
    pub fn generate_pkce() -> PkceChallenge {
        pkce::generate()
    }

    /// Build a registration payload adapted to `metadata`.
    ///
    /// Starting from `authorization_code` + `refresh_token`, response type
    /// `code` and `client_secret_post`:
    ///
    /// - grant and response types are intersected with the advertised lists;
    ///   an empty intersection keeps the requested list
    /// - `none` is preferred as the auth method when advertised, then
    ///   `client_secret_post`, then `client_secret_basic`
    /// - PKCE is attached only when `none` is advertised and the server
    ///   supports the `authorization_code` grant (RFC 8414 defaults apply when
    ///   the grant list is absent)
    ///
    /// # Examples
    ///
    /// ```
    /// use mcpgate::mcp::auth::metadata::AuthorizationServerMetadata;
    /// use mcpgate::mcp::auth::registration::OAuthNegotiator;
    /// use mcpgate::mcp::auth::registration::NegotiatorSettings;
    ///
    /// let settings = NegotiatorSettings {
    ///     client_name: "mcpgate".to_string(),
    ///     redirect_uri: "http://localhost:3001/callback/mcp/oauth".to_string(),
    ///     scope: None,
    /// };
    /// let metadata = AuthorizationServerMetadata {
    ///     token_endpoint_auth_methods_supported: Some(vec!["none".to_string()]),
    ///     ..Default::default()
    /// };
    /// let pkce = OAuthNegotiator::generate_pkce();
    /// let reg = OAuthNegotiator::adapt(&settings, "srv", &metadata, &pkce);
    /// assert_eq!(reg.token_endpoint_auth_method, "none");
    /// assert!(reg.uses_pkce());
    /// ```
    pub fn adapt(
        settings: &NegotiatorSettings,
        uti: &str,
        metadata: &AuthorizationServerMetadata,
        pkce: &PkceChallenge,
    ) -> OAuthClientRegistration {
        let grant_types = intersect_or_keep(
            "grant_types",
            vec![
                GRANT_AUTHORIZATION_CODE.to_string(),
                GRANT_REFRESH_TOKEN.to_string(),
            ],
            &metadata.grant_types_supported,
        );
        let response_types = intersect_or_keep(
            "response_types",
            vec!["code".to_string()],
            &metadata.response_types_supported,
        );

        let methods = &metadata.token_endpoint_auth_methods_supported;
        let auth_method = [AUTH_METHOD_NONE, AUTH_METHOD_SECRET_POST, AUTH_METHOD_SECRET_BASIC]
            .into_iter()
            .find(|m| AuthorizationServerMetadata::advertises(methods, m))
            .unwrap_or(AUTH_METHOD_SECRET_POST);

        let server_allows_code = metadata
            .grant_types_supported
            .as_ref()
            .map(|g| g.iter().any(|v| v == GRANT_AUTHORIZATION_CODE))
            .unwrap_or(true);
        let use_pkce = auth_method == AUTH_METHOD_NONE && server_allows_code;

        OAuthClientRegistration {
            id: uti.to_string(),
            client_name: settings.client_name.clone(),
            redirect_uris: vec![settings.redirect_uri.clone()],
            grant_types,
            response_types,
            scope: settings.scope.clone(),
            token_endpoint_auth_method: auth_method.to_string(),
            application_type: "web".to_string(),
            code_challenge: use_pkce.then(|| pkce.challenge.clone()),
            code_challenge_method: use_pkce.then(|| pkce.method.clone()),
        }
    }

    /// [`adapt`](Self::adapt) with this negotiator's settings
    pub fn create(
        &self,
        uti: &str,
        metadata: &AuthorizationServerMetadata,
        pkce: &PkceChallenge,
    ) -> OAuthClientRegistration {
        Self::adapt(&self.settings, uti, metadata, pkce)
    }

    /// POST `registration` to `registration_endpoint`.
    ///
    /// # Errors
    ///
    /// - `McpGateError::Registration` carrying status and body when the
    ///   server rejects the request (after the single retry for `422`)
    /// - gate errors when the endpoint is not reachable or not allowed
    pub async fn register(
        &self,
        registration: &OAuthClientRegistration,
        registration_endpoint: &str,
    ) -> Result<RegisteredClient> {
        let request = GateRequest::post_json(registration)?.with_accept("application/json");
        let resp = self.gate.fetch(registration_endpoint, request).await?;

        let resp = if resp.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(
                "Registration for '{}' rejected with 422 ({}); retrying with minimal payload",
                registration.id,
                body
            );
            let retry = GateRequest::post_json(&registration.minimal_body())?
                .with_accept("application/json");
            self.gate.fetch(registration_endpoint, retry).await?
        } else {
            resp
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(McpGateError::Registration {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let body = resp.text().await.map_err(McpGateError::Http)?;
        let client: RegisteredClient =
            serde_json::from_str(&body).map_err(|e| McpGateError::Registration {
                status: status.as_u16(),
                body: format!("unparseable registration response ({e}): {body}"),
            })?;
        tracing::info!(
            "Registered OAuth client '{}' for '{}'",
            client.client_id,
            registration.id
        );
        Ok(client)
    }

    /// Build the URL the user visits to authorize `client_id`.
    ///
    /// Query parameters are appended in this order: `client_id`,
    /// `response_type=code`, `redirect_uri`, `scope` (empty when none),
    /// `state` (the server id), then `code_challenge` and
    /// `code_challenge_method` when PKCE is in use.
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Auth` when `authorization_endpoint` is not a URL.
    pub fn build_authorization_url(
        registration: &OAuthClientRegistration,
        client_id: &str,
        authorization_endpoint: &str,
    ) -> Result<String> {
        let mut url = Url::parse(authorization_endpoint).map_err(|e| {
            McpGateError::Auth(format!(
                "invalid authorization endpoint '{authorization_endpoint}': {e}"
            ))
        })?;
        let redirect_uri = registration
            .redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or_default();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("scope", registration.scope.as_deref().unwrap_or_default())
                .append_pair("state", &registration.id);
            if let (Some(challenge), Some(method)) = (
                registration.code_challenge.as_deref(),
                registration.code_challenge_method.as_deref(),
            ) {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", method);
            }
        }
        Ok(url.into())
    }

    /// Register (if needed), persist state and return the authorization URL.
    ///
    /// `client` is used as-is when the client was registered out of band;
    /// otherwise `metadata.registration_endpoint` must be present.
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Auth` when the metadata lacks the authorization
    /// or token endpoint, or when no client can be obtained.
    pub async fn register_client(
        &self,
        registration: &OAuthClientRegistration,
        pkce: &PkceChallenge,
        metadata: &AuthorizationServerMetadata,
        client: Option<RegisteredClient>,
    ) -> Result<String> {
        let (Some(authorization_endpoint), Some(token_endpoint)) = (
            metadata.authorization_endpoint.as_deref(),
            metadata.token_endpoint.as_deref(),
        ) else {
            return Err(McpGateError::Auth(format!(
                "authorization server metadata for '{}' lacks required endpoints",
                registration.id
            ))
            .into());
        };

        let mut client = match (client, metadata.registration_endpoint.as_deref()) {
            (Some(client), _) => client,
            (None, Some(endpoint)) => self.register(registration, endpoint).await?,
            (None, None) => {
                return Err(McpGateError::Auth(format!(
                    "'{}' has no registration endpoint and no client id",
                    registration.id
                ))
                .into())
            }
        };
        client.token_endpoint = Some(token_endpoint.to_string());

        let uti = registration.id.as_str();
        store::set_json(self.store.as_ref(), &client_key(uti), &client).await?;

        let redirect_uri = registration
            .redirect_uris
            .first()
            .cloned()
            .unwrap_or_else(|| self.settings.redirect_uri.clone());
        let pending = PendingAuthorization {
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            code_verifier: registration.uses_pkce().then(|| pkce.verifier.clone()),
            token_endpoint: token_endpoint.to_string(),
            redirect_uri,
        };
        store::set_json(self.store.as_ref(), &pending_key(uti), &pending).await?;

        Self::build_authorization_url(registration, &client.client_id, authorization_endpoint)
    }

    /// Full negotiation for `uti`: PKCE, adapted registration, URL.
    pub async fn negotiate(
        &self,
        uti: &str,
        metadata: &AuthorizationServerMetadata,
        client: Option<RegisteredClient>,
    ) -> Result<String> {
        let pkce = Self::generate_pkce();
        let registration = self.create(uti, metadata, &pkce);
        tracing::debug!(
            "Negotiating OAuth for '{}' (auth method {}, pkce {})",
            uti,
            registration.token_endpoint_auth_method,
            registration.uses_pkce()
        );
        self.register_client(&registration, &pkce, metadata, client)
            .await
    }

    /// Authorization URL for a server described by `hint`, without
    /// registration.
    ///
    /// The hint's URL is kept as given; `state` is set to `uti`, and
    /// `client_id`, `response_type=code` and `redirect_uri` are appended
    /// only when the URL does not already carry them. The redirect URI is
    /// taken from the URL, then the hint, then the configured default. The
    /// client id comes from the URL or from `client`.
    ///
    /// A pending record pointing at the hint's token URL is persisted so
    /// [`exchange_code`](Self::exchange_code) can finish the flow.
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Auth` when the hint's URL does not parse, and
    /// store errors unchanged.
    pub async fn direct_authorization(
        &self,
        uti: &str,
        hint: &AuthMetadataHint,
        client: Option<RegisteredClient>,
    ) -> Result<String> {
        let mut url = Url::parse(&hint.authorization_url).map_err(|e| {
            McpGateError::Auth(format!(
                "invalid authorization URL '{}' for '{uti}': {e}",
                hint.authorization_url
            ))
        })?;

        let existing: Vec<(String, String)> = url
            .query_pairs()
            .into_owned()
            .filter(|(key, _)| key != "state")
            .collect();
        let lookup = |name: &str| {
            existing
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };
        let url_client_id = lookup("client_id");
        let url_redirect = lookup("redirect_uri");
        let has_response_type = lookup("response_type").is_some();

        let client_id = url_client_id
            .clone()
            .or_else(|| client.as_ref().map(|c| c.client_id.clone()))
            .unwrap_or_default();
        let redirect_uri = url_redirect
            .clone()
            .or_else(|| hint.redirect_url.clone())
            .unwrap_or_else(|| self.settings.redirect_uri.clone());

        {
            let mut query = url.query_pairs_mut();
            query.clear();
            for (key, value) in &existing {
                query.append_pair(key, value);
            }
            if url_client_id.is_none() && !client_id.is_empty() {
                query.append_pair("client_id", &client_id);
            }
            if !has_response_type {
                query.append_pair("response_type", "code");
            }
            if url_redirect.is_none() {
                query.append_pair("redirect_uri", &redirect_uri);
            }
            query.append_pair("state", uti);
        }

        let client_secret = client.and_then(|c| c.client_secret);
        if !client_id.is_empty() {
            let record = RegisteredClient {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                token_endpoint: Some(hint.token_url.clone()),
            };
            store::set_json(self.store.as_ref(), &client_key(uti), &record).await?;
        }
        let pending = PendingAuthorization {
            client_id,
            client_secret,
            code_verifier: None,
            token_endpoint: hint.token_url.clone(),
            redirect_uri,
        };
        store::set_json(self.store.as_ref(), &pending_key(uti), &pending).await?;

        tracing::debug!("Direct authorization redirect for '{}'", uti);
        Ok(url.into())
    }

    /// Exchange the authorization `code` delivered for `uti`.
    ///
    /// The pending record is removed on success.
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Auth` when no authorization is pending for
    /// `uti` or the token endpoint rejects the code.
    pub async fn exchange_code(&self, uti: &str, code: &str) -> Result<OAuthToken> {
        let pending: PendingAuthorization =
            store::get_json(self.store.as_ref(), &pending_key(uti))
                .await?
                .ok_or_else(|| {
                    McpGateError::Auth(format!("no pending authorization for '{uti}'"))
                })?;

        let token = token::exchange_code(
            &self.gate,
            &pending.token_endpoint,
            ClientCredentials {
                client_id: &pending.client_id,
                client_secret: pending.client_secret.as_deref(),
            },
            code,
            &pending.redirect_uri,
            pending.code_verifier.as_deref(),
        )
        .await?;

        self.store.delete(&pending_key(uti)).await?;
        Ok(token)
    }

    /// The persisted client record for `uti`
    pub async fn registered_client(&self, uti: &str) -> Result<Option<RegisteredClient>> {
        store::get_json(self.store.as_ref(), &client_key(uti)).await
    }

    /// Refresh `refresh_token` using the persisted client for `uti`.
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Auth` when no client with a token endpoint is
    /// recorded for `uti`, or the refresh is rejected.
    pub async fn refresh(&self, uti: &str, refresh_token: &str) -> Result<OAuthToken> {
        let client = self
            .registered_client(uti)
            .await?
            .ok_or_else(|| McpGateError::Auth(format!("no registered client for '{uti}'")))?;
        let token_endpoint = client.token_endpoint.as_deref().ok_or_else(|| {
            McpGateError::Auth(format!("no token endpoint recorded for '{uti}'"))
        })?;
        token::refresh_token(&self.gate, token_endpoint, client.credentials(), refresh_token)
            .await
    }
}

fn intersect_or_keep(
    field: &str,
    requested: Vec<String>,
    supported: &Option<Vec<String>>,
) -> Vec<String> {
    let Some(supported) = supported else {
        return requested;
    };
    let kept: Vec<String> = requested
        .iter()
        .filter(|value| supported.contains(value))
        .cloned()
        .collect();
    if kept.is_empty() {
        tracing::warn!(
            "Server supports none of the requested {} {:?}; requesting them anyway",
            field,
            requested
        );
        requested
    } else {
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> NegotiatorSettings {
        NegotiatorSettings {
            client_name: "mcpgate".to_string(),
            redirect_uri: "http://localhost:3001/callback/mcp/oauth".to_string(),
            scope: Some("read write".to_string()),
        }
    }

    fn strings(items: &[&str]) -> Option<Vec<String>> {
        Some(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_adapt_defaults_without_advertised_lists() {
        let pkce = pkce::generate();
        let reg = OAuthNegotiator::adapt(
            &settings(),
            "srv",
            &AuthorizationServerMetadata::default(),
            &pkce,
        );
        assert_eq!(reg.grant_types, vec!["authorization_code", "refresh_token"]);
        assert_eq!(reg.response_types, vec!["code"]);
        assert_eq!(reg.token_endpoint_auth_method, "client_secret_post");
        assert_eq!(reg.application_type, "web");
        assert!(!reg.uses_pkce());
    }

    #[test]
    fn test_adapt_prefers_none_and_enables_pkce() {
        let pkce = pkce::generate();
        let meta = AuthorizationServerMetadata {
            grant_types_supported: strings(&["authorization_code"]),
            token_endpoint_auth_methods_supported: strings(&["client_secret_basic", "none"]),
            ..Default::default()
        };
        let reg = OAuthNegotiator::adapt(&settings(), "srv", &meta, &pkce);
        assert_eq!(reg.grant_types, vec!["authorization_code"]);
        assert_eq!(reg.token_endpoint_auth_method, "none");
        assert_eq!(reg.code_challenge.as_deref(), Some(pkce.challenge.as_str()));
        assert_eq!(reg.code_challenge_method.as_deref(), Some("S256"));
    }

    #[test]
    fn test_adapt_no_pkce_without_authorization_code_grant() {
        let pkce = pkce::generate();
        let meta = AuthorizationServerMetadata {
            grant_types_supported: strings(&["client_credentials"]),
            token_endpoint_auth_methods_supported: strings(&["none"]),
            ..Default::default()
        };
        let reg = OAuthNegotiator::adapt(&settings(), "srv", &meta, &pkce);
        assert!(!reg.uses_pkce());
        // Empty intersection keeps the requested list.
        assert_eq!(reg.grant_types, vec!["authorization_code", "refresh_token"]);
    }

    #[test]
    fn test_adapt_falls_back_to_basic() {
        let pkce = pkce::generate();
        let meta = AuthorizationServerMetadata {
            token_endpoint_auth_methods_supported: strings(&["client_secret_basic"]),
            ..Default::default()
        };
        let reg = OAuthNegotiator::adapt(&settings(), "srv", &meta, &pkce);
        assert_eq!(reg.token_endpoint_auth_method, "client_secret_basic");
    }

    #[test]
    fn test_registration_body_omits_id() {
        let pkce = pkce::generate();
        let reg = OAuthNegotiator::adapt(
            &settings(),
            "srv",
            &AuthorizationServerMetadata::default(),
            &pkce,
        );
        let json = serde_json::to_value(&reg).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("code_challenge").is_none());
        assert_eq!(json["client_name"], "mcpgate");
        assert_eq!(reg.minimal_body().as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_build_authorization_url_parameter_order() {
        let pkce = pkce::generate();
        let meta = AuthorizationServerMetadata {
            token_endpoint_auth_methods_supported: strings(&["none"]),
            ..Default::default()
        };
        let reg = OAuthNegotiator::adapt(&settings(), "my-server", &meta, &pkce);
        let url = OAuthNegotiator::build_authorization_url(
            &reg,
            "client-123",
            "https://auth.example.com/authorize",
        )
        .unwrap();

        let parsed = Url::parse(&url).unwrap();
        let keys: Vec<String> = parsed.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert_eq!(
            keys,
            vec![
                "client_id",
                "response_type",
                "redirect_uri",
                "scope",
                "state",
                "code_challenge",
                "code_challenge_method"
            ]
        );
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["state"], "my-server");
        assert_eq!(pairs["scope"], "read write");
        assert_eq!(pairs["code_challenge"], pkce.challenge);
    }

    fn negotiator() -> (OAuthNegotiator, Arc<dyn CredentialStore>) {
        let store: Arc<dyn CredentialStore> = Arc::new(crate::store::MemoryCredentialStore::new());
        let gate = NetworkGate::new(crate::network::policy::NetworkPolicy::default()).unwrap();
        (
            OAuthNegotiator::new(gate, Arc::clone(&store), settings()),
            store,
        )
    }

    fn hint(authorization_url: &str, redirect_url: Option<&str>) -> AuthMetadataHint {
        AuthMetadataHint {
            authorization_url: authorization_url.to_string(),
            token_url: "https://p.test/token".to_string(),
            revocation_url: None,
            redirect_url: redirect_url.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_direct_authorization_keeps_prebuilt_url() {
        let (negotiator, store) = negotiator();
        let url = negotiator
            .direct_authorization(
                "gh",
                &hint(
                    "https://p.test/authorize?client_id=pre&response_type=code&state=old",
                    Some("https://app.test/cb"),
                ),
                None,
            )
            .await
            .unwrap();

        let parsed = Url::parse(&url).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("client_id".to_string(), "pre".to_string()),
                ("response_type".to_string(), "code".to_string()),
                ("redirect_uri".to_string(), "https://app.test/cb".to_string()),
                ("state".to_string(), "gh".to_string()),
            ]
        );

        let pending: PendingAuthorization = store::get_json(store.as_ref(), &pending_key("gh"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.client_id, "pre");
        assert_eq!(pending.token_endpoint, "https://p.test/token");
        assert_eq!(pending.redirect_uri, "https://app.test/cb");
        assert!(pending.code_verifier.is_none());
        let client = negotiator.registered_client("gh").await.unwrap().unwrap();
        assert_eq!(client.token_endpoint.as_deref(), Some("https://p.test/token"));
    }

    #[tokio::test]
    async fn test_direct_authorization_fills_missing_parameters() {
        let (negotiator, store) = negotiator();
        let client = RegisteredClient {
            client_id: "from-table".to_string(),
            client_secret: None,
            token_endpoint: None,
        };
        let url = negotiator
            .direct_authorization("srv", &hint("https://p.test/authorize", None), Some(client))
            .await
            .unwrap();

        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "from-table");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], settings().redirect_uri);
        assert_eq!(pairs["state"], "srv");
        assert!(store.get(&pending_key("srv")).await.unwrap().is_some());

        assert!(negotiator
            .direct_authorization("srv", &hint("not a url", None), None)
            .await
            .is_err());
    }

    #[test]
    fn test_build_authorization_url_without_pkce() {
        let pkce = pkce::generate();
        let reg = OAuthNegotiator::adapt(
            &settings(),
            "s",
            &AuthorizationServerMetadata::default(),
            &pkce,
        );
        let url =
            OAuthNegotiator::build_authorization_url(&reg, "c", "https://a.test/authorize").unwrap();
        assert!(!url.contains("code_challenge"));
        assert!(OAuthNegotiator::build_authorization_url(&reg, "c", "not a url").is_err());
    }
}
