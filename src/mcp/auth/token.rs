//! OAuth tokens and token endpoint requests
//!
//! [`OAuthToken`] is the canonical token shape stored (encrypted) per server.
//! The token endpoint helpers post form-encoded grants through the
//! [`NetworkGate`] so the authorization server is subject to the same
//! allow-lists as the MCP server itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{McpGateError, Result};
use crate::network::gate::{GateRequest, NetworkGate};

// ---------------------------------------------------------------------------
// OAuthToken
// ---------------------------------------------------------------------------

/// A complete OAuth 2.1 token.
///
/// `expires_at` is an absolute UTC timestamp computed from the `expires_in`
/// seconds returned by the server, so expiry can be judged without a round-trip.
///
/// # Examples
///
/// ```
/// use mcpgate::mcp::auth::token::OAuthToken;
///
/// let token = OAuthToken {
///     access_token: "my_access_token".to_string(),
///     token_type: "Bearer".to_string(),
///     expires_at: None,
///     refresh_token: None,
///     scope: None,
/// };
///
/// // A token with no expiry is never considered expired.
/// assert!(!token.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// The access token string issued by the authorization server.
    pub access_token: String,

    /// The token type, typically `"Bearer"`.
    pub token_type: String,

    /// UTC timestamp at which the access token expires.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,

    /// Refresh token for obtaining a new access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Space-separated scopes granted by the authorization server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl OAuthToken {
    /// Wrap a bare bearer token with no expiry
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_at: None,
            refresh_token: None,
            scope: None,
        }
    }

    /// Returns `true` when the access token is expired or about to expire.
    ///
    /// A 60-second buffer is applied. Tokens with no `expires_at` never expire.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcpgate::mcp::auth::token::OAuthToken;
    /// use chrono::{Duration, Utc};
    ///
    /// let mut token = OAuthToken::bearer("tok");
    /// token.expires_at = Some(Utc::now() + Duration::seconds(30));
    /// assert!(token.is_expired());
    ///
    /// token.expires_at = Some(Utc::now() + Duration::hours(1));
    /// assert!(!token.is_expired());
    /// ```
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => {
                let buffer = chrono::Duration::seconds(60);
                Utc::now() >= expires_at - buffer
            }
        }
    }
}

/// Raw JSON response from an OAuth token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    fn into_oauth_token(self) -> OAuthToken {
        let expires_at = self.expires_in.map(|secs| {
            Utc::now() + chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
        });

        OAuthToken {
            access_token: self.access_token,
            token_type: self.token_type,
            expires_at,
            refresh_token: self.refresh_token,
            scope: self.scope,
        }
    }
}

/// Client credentials sent with a token request.
#[derive(Debug, Clone, Copy)]
pub struct ClientCredentials<'a> {
    /// Issued client id
    pub client_id: &'a str,
    /// Client secret for confidential clients
    pub client_secret: Option<&'a str>,
}

/// Exchange an authorization code for a token
///
/// # Arguments
///
/// * `gate` - Outbound gate
/// * `token_endpoint` - Authorization server token endpoint
/// * `client` - Issued client credentials
/// * `code` - Authorization code from the redirect
/// * `redirect_uri` - Redirect URI used in the authorization request
/// * `code_verifier` - PKCE verifier, when PKCE was used
///
/// # Errors
///
/// Returns `McpGateError::Auth` when the endpoint rejects the grant or
/// answers with an unparseable body.
pub async fn exchange_code(
    gate: &NetworkGate,
    token_endpoint: &str,
    client: ClientCredentials<'_>,
    code: &str,
    redirect_uri: &str,
    code_verifier: Option<&str>,
) -> Result<OAuthToken> {
    let mut params = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
    ];
    // Pre-built authorization URLs may not name a client.
    if !client.client_id.is_empty() {
        params.push(("client_id", client.client_id));
    }
    if let Some(verifier) = code_verifier {
        params.push(("code_verifier", verifier));
    }
    if let Some(secret) = client.client_secret {
        params.push(("client_secret", secret));
    }

    request_token(gate, token_endpoint, &params, "token exchange").await
}

/// Use a refresh token to obtain a new access token
///
/// # Errors
///
/// Returns `McpGateError::Auth` when the endpoint rejects the grant.
pub async fn refresh_token(
    gate: &NetworkGate,
    token_endpoint: &str,
    client: ClientCredentials<'_>,
    refresh_token: &str,
) -> Result<OAuthToken> {
    let mut params = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", client.client_id),
    ];
    if let Some(secret) = client.client_secret {
        params.push(("client_secret", secret));
    }

    let mut token = request_token(gate, token_endpoint, &params, "token refresh").await?;
    // Servers may omit the refresh token when it is not rotated.
    if token.refresh_token.is_none() {
        token.refresh_token = Some(refresh_token.to_string());
    }
    Ok(token)
}

async fn request_token(
    gate: &NetworkGate,
    token_endpoint: &str,
    params: &[(&str, &str)],
    what: &str,
) -> Result<OAuthToken> {
    let request = GateRequest::post_form(params).with_accept("application/json");
    let resp = gate
        .fetch(token_endpoint, request)
        .await
        .map_err(|e| McpGateError::Auth(format!("{what} request failed: {e}")))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(
            McpGateError::Auth(format!("token endpoint returned {status}: {body}")).into(),
        );
    }

    let raw: TokenResponse = resp
        .json()
        .await
        .map_err(|e| McpGateError::Auth(format!("failed to parse {what} response: {e}")))?;

    tracing::debug!("{} succeeded at {}", what, token_endpoint);
    Ok(raw.into_oauth_token())
}
