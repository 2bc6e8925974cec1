//! HTTP application: proxy routes, a connect route and the OAuth redirect
//! callback
//!
//! [`AppState::from_config`] assembles the gate, credential store, vault and
//! connection manager from configuration; [`router`] wires the HTTP surface;
//! [`serve`] runs it until Ctrl-C and then closes every MCP session.
//!
//! The callback completes flows started by the same manager, either through
//! `POST /mcp/connect` on a running server or through [`await_callback`],
//! which `mcpgate connect` uses to listen on the redirect URI itself.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::config::{Config, StorageBackend};
use crate::error::{McpGateError, Result};
use crate::manager::{ConnectionManager, ConnectionState, ConnectionStatus, ServerDescriptor};
use crate::mcp::auth::fallback::ProviderFallbacks;
use crate::mcp::auth::registration::{NegotiatorSettings, OAuthNegotiator};
use crate::network::gate::NetworkGate;
use crate::network::policy::NetworkPolicy;
use crate::network::proxy;
use crate::store::{
    CredentialStore, KeyringCredentialStore, MemoryCredentialStore, SledCredentialStore,
};
use crate::vault::credentials::CredentialVault;
use crate::vault::TokenVault;

/// Path the authorization server redirects back to
pub const CALLBACK_PATH: &str = "/callback/mcp/oauth";

/// Path of the connect route
pub const CONNECT_PATH: &str = "/mcp/connect";

/// Shared application components
#[derive(Debug, Clone)]
pub struct AppState {
    /// Outbound gate
    pub gate: NetworkGate,
    /// Session registry
    pub manager: ConnectionManager,
}

impl AppState {
    /// Build every component from `config`.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `vault` - Token vault; `serve` passes a server-keyed vault
    /// * `identity` - Identity tokens are sealed for
    ///
    /// # Errors
    ///
    /// Returns configuration errors for the network policy and storage
    /// errors when the credential store cannot be opened.
    pub fn from_config(config: &Config, vault: TokenVault, identity: Option<String>) -> Result<Self> {
        let gate = NetworkGate::new(NetworkPolicy::from_config(&config.network)?)?;
        let store = open_store(config)?;

        let mut fallbacks = ProviderFallbacks::builtin();
        fallbacks.extend(&config.oauth.providers);
        let fallbacks = Arc::new(fallbacks);

        let negotiator = OAuthNegotiator::new(
            gate.clone(),
            Arc::clone(&store),
            NegotiatorSettings {
                client_name: config.oauth.client_name.clone(),
                redirect_uri: config.oauth.redirect_uri.clone(),
                scope: config.oauth.scope.clone(),
            },
        );
        let vault = CredentialVault::new(vault, store, identity);
        let manager = ConnectionManager::new(gate.clone(), vault, negotiator, fallbacks);

        Ok(Self { gate, manager })
    }
}

/// Open the configured credential store
///
/// # Errors
///
/// Returns `McpGateError::Config` when sled is selected without a usable
/// path, or the store's own error when it cannot be opened.
pub fn open_store(config: &Config) -> Result<Arc<dyn CredentialStore>> {
    let store: Arc<dyn CredentialStore> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryCredentialStore::new()),
        StorageBackend::Keyring => Arc::new(KeyringCredentialStore::default()),
        StorageBackend::Sled => {
            let path = config
                .storage
                .path
                .clone()
                .or_else(SledCredentialStore::default_path)
                .ok_or_else(|| {
                    McpGateError::Config("no storage.path and no data directory".to_string())
                })?;
            tracing::info!("Opening credential store at {}", path.display());
            Arc::new(SledCredentialStore::new(path)?)
        }
    };
    Ok(store)
}

/// Proxy routes, the connect route, the OAuth callback and request tracing
pub fn router(state: AppState) -> Router {
    let connect = Router::new()
        .route(CONNECT_PATH, post(connect_server))
        .with_state(state.manager.clone());

    proxy::router(state.gate)
        .merge(connect)
        .merge(callback_router(CALLBACK_PATH, state.manager, None))
        .layer(TraceLayer::new_for_http())
}

#[derive(Clone)]
struct CallbackState {
    manager: ConnectionManager,
    completed: Option<mpsc::UnboundedSender<(String, ConnectionStatus)>>,
}

fn callback_router(
    path: &str,
    manager: ConnectionManager,
    completed: Option<mpsc::UnboundedSender<(String, ConnectionStatus)>>,
) -> Router {
    Router::new()
        .route(path, get(oauth_callback))
        .with_state(CallbackState { manager, completed })
}

/// Response of the connect route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    /// Server identifier
    pub uti: String,
    /// Outcome of the attempt
    pub status: ConnectionStatus,
    /// Where to send the user when the server wants authorization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
}

async fn connect_server(
    State(manager): State<ConnectionManager>,
    Json(descriptor): Json<ServerDescriptor>,
) -> Response {
    let uti = descriptor.uti.clone();
    let status = manager.connect(descriptor).await;

    let mut authorization_url = None;
    if status.state == ConnectionState::Authenticate {
        match manager.authorization_url(&uti).await {
            Ok(url) => authorization_url = Some(url),
            Err(e) => tracing::warn!("{}: could not build authorization URL: {}", uti, e),
        }
    }

    Json(ConnectResponse {
        uti,
        status,
        authorization_url,
    })
    .into_response()
}

/// Query parameters of the authorization redirect
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code
    pub code: Option<String>,
    /// Server identifier the flow was started for
    pub state: Option<String>,
    /// Error code from the authorization server
    pub error: Option<String>,
    /// Human-readable error detail
    pub error_description: Option<String>,
}

async fn oauth_callback(
    State(state): State<CallbackState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        let detail = query.error_description.unwrap_or_default();
        tracing::warn!("authorization denied: {} {}", error, detail);
        return (
            StatusCode::BAD_REQUEST,
            format!("Authorization failed: {} {}", error, detail).trim_end().to_string(),
        )
            .into_response();
    }

    let (Some(code), Some(uti)) = (query.code, query.state) else {
        return (
            StatusCode::BAD_REQUEST,
            "Authorization failed: missing code or state".to_string(),
        )
            .into_response();
    };

    match state.manager.complete_authorization(&uti, &code).await {
        Ok(status) => {
            if let Some(completed) = &state.completed {
                let _ = completed.send((uti.clone(), status.clone()));
            }
            let mut body = HashMap::new();
            body.insert("uti", serde_json::Value::String(uti));
            body.insert("status", serde_json::to_value(&status).unwrap_or_default());
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            tracing::error!("authorization for {} failed: {:#}", uti, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Authorization failed: {}", e),
            )
                .into_response()
        }
    }
}

/// Run the HTTP server until Ctrl-C
///
/// # Errors
///
/// Returns an error if the bind address is invalid or cannot be bound.
pub async fn serve(config: &Config, state: AppState) -> Result<()> {
    let addr: SocketAddr = config.server.bind_address.parse().map_err(|e| {
        McpGateError::Config(format!(
            "Invalid bind address {}: {}",
            config.server.bind_address, e
        ))
    })?;

    let manager = state.manager.clone();
    let app = router(state);

    tracing::info!("Starting mcpgate proxy on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    tracing::info!("Shutting down, closing MCP sessions");
    manager.close_all().await
}

/// Bind a listener for the host and port of `redirect_uri`.
///
/// Returns the listener and the callback path to mount.
///
/// # Errors
///
/// Returns `McpGateError::Config` when `redirect_uri` is not an absolute
/// URL, and I/O errors when the address cannot be bound.
pub async fn bind_callback(redirect_uri: &str) -> Result<(TcpListener, String)> {
    let url = Url::parse(redirect_uri)
        .map_err(|e| McpGateError::Config(format!("Invalid redirect URI {redirect_uri}: {e}")))?;
    let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else {
        return Err(
            McpGateError::Config(format!("Redirect URI {redirect_uri} has no host")).into(),
        );
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let listener = TcpListener::bind((host, port)).await?;
    Ok((listener, url.path().to_string()))
}

/// Serve the OAuth callback on `listener` until the redirect for `uti`
/// completes, then stop.
///
/// # Errors
///
/// Returns `McpGateError::Auth` when no callback for `uti` completes within
/// `wait`, and server errors unchanged.
pub async fn await_callback(
    listener: TcpListener,
    path: &str,
    manager: ConnectionManager,
    uti: &str,
    wait: Duration,
) -> Result<ConnectionStatus> {
    let (completed_tx, mut completed_rx) = mpsc::unbounded_channel();
    let app = callback_router(path, manager, Some(completed_tx));
    let shutdown = CancellationToken::new();
    let server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        })
    };

    let outcome = tokio::time::timeout(wait, async {
        while let Some((completed_uti, status)) = completed_rx.recv().await {
            if completed_uti == uti {
                return Some(status);
            }
            tracing::debug!("ignoring callback for {}", completed_uti);
        }
        None
    })
    .await;

    shutdown.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("callback listener failed: {}", e),
        Err(e) => tracing::warn!("callback listener task failed: {}", e),
    }

    match outcome {
        Ok(Some(status)) => Ok(status),
        Ok(None) | Err(_) => Err(McpGateError::Auth(format!(
            "no authorization callback for '{}' within {}s",
            uti,
            wait.as_secs()
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState::from_config(
            &Config::default(),
            TokenVault::with_secret("test").unwrap(),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_callback_error_param_is_bad_request() {
        let response = router(state())
            .oneshot(
                Request::get("/callback/mcp/oauth?error=access_denied&state=gh")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_callback_unknown_state_fails() {
        let response = router(state())
            .oneshot(
                Request::get("/callback/mcp/oauth?code=abc&state=nobody")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_connect_route_reports_refused_target() {
        let response = router(state())
            .oneshot(
                Request::post(CONNECT_PATH)
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"uti":"internal","transport":"streamable_http","uri":"http://10.0.0.5/mcp"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ConnectResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.uti, "internal");
        assert_eq!(body.status.state, ConnectionState::Error);
        assert!(body.authorization_url.is_none());
    }

    #[tokio::test]
    async fn test_bind_callback_uses_redirect_path() {
        let (listener, path) = bind_callback("http://127.0.0.1:0/callback/mcp/oauth")
            .await
            .unwrap();
        assert_eq!(path, CALLBACK_PATH);
        assert!(listener.local_addr().unwrap().port() > 0);
        assert!(bind_callback("/relative").await.is_err());
    }

    #[tokio::test]
    async fn test_await_callback_times_out() {
        let (listener, path) = bind_callback("http://127.0.0.1:0/cb").await.unwrap();
        let err = await_callback(
            listener,
            &path,
            state().manager,
            "nobody",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("no authorization callback"));
    }

    #[tokio::test]
    async fn test_proxy_routes_are_mounted() {
        let response = router(state())
            .oneshot(
                Request::options("/proxy/mcp/sse")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
