use std::convert::Infallible;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

use mcpgate::manager::ConnectionManager;
use mcpgate::mcp::auth::fallback::ProviderFallbacks;
use mcpgate::mcp::auth::registration::{NegotiatorSettings, OAuthNegotiator};
use mcpgate::network::gate::NetworkGate;
use mcpgate::network::policy::NetworkPolicy;
use mcpgate::store::{CredentialStore, MemoryCredentialStore};
use mcpgate::vault::credentials::CredentialVault;
use mcpgate::vault::TokenVault;

#[allow(dead_code)]
pub const REDIRECT_URI: &str = "http://localhost:3001/callback/mcp/oauth";

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Start a mock server on `preferred` if it is free, otherwise on any port.
#[allow(dead_code)]
pub async fn mock_server_on(preferred: u16) -> MockServer {
    match std::net::TcpListener::bind(("127.0.0.1", preferred)) {
        Ok(listener) => MockServer::builder().listener(listener).start().await,
        Err(_) => MockServer::start().await,
    }
}

/// Port of a running mock server
#[allow(dead_code)]
pub fn port_of(server: &MockServer) -> u16 {
    server.address().port()
}

/// Gate with the default policy plus `port`
#[allow(dead_code)]
pub fn gate_for(port: u16) -> NetworkGate {
    NetworkGate::new(NetworkPolicy::default().with_allowed_port(port)).expect("gate")
}

/// Negotiator writing to `store`
#[allow(dead_code)]
pub fn negotiator(gate: &NetworkGate, store: Arc<dyn CredentialStore>) -> OAuthNegotiator {
    OAuthNegotiator::new(
        gate.clone(),
        store,
        NegotiatorSettings {
            client_name: "mcpgate-test".to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
            scope: Some("read".to_string()),
        },
    )
}

/// Manager over an in-memory store, plus the store itself
#[allow(dead_code)]
pub fn manager_for(gate: &NetworkGate) -> (ConnectionManager, Arc<dyn CredentialStore>) {
    let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
    let vault = CredentialVault::new(
        TokenVault::with_secret("integration-secret").expect("vault"),
        Arc::clone(&store),
        Some("tester".to_string()),
    );
    let manager = ConnectionManager::new(
        gate.clone(),
        vault,
        negotiator(gate, Arc::clone(&store)),
        Arc::new(ProviderFallbacks::empty()),
    );
    (manager, store)
}

/// Minimal MCP server behind a wiremock mock: answers `initialize`,
/// `tools/list` and `ping`, acknowledges notifications with 202.
#[allow(dead_code)]
#[derive(Clone)]
pub struct McpResponder {
    pub tools: Value,
    pub session_id: Option<String>,
    pub delay: Option<Duration>,
}

#[allow(dead_code)]
impl McpResponder {
    pub fn new(tools: Value) -> Self {
        Self {
            tools,
            session_id: None,
            delay: None,
        }
    }

    pub fn with_session(mut self, id: &str) -> Self {
        self.session_id = Some(id.to_string());
        self
    }

    /// Hold every response back by `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// JSON-RPC result for `method`
    pub fn result_for(&self, method: &str) -> Value {
        match method {
            "initialize" => json!({
                "protocolVersion": "2025-11-25",
                "capabilities": {"tools": {"listChanged": true}},
                "serverInfo": {"name": "mock-mcp", "version": "0.9.0"},
                "instructions": "Mock server"
            }),
            "tools/list" => json!({"tools": self.tools}),
            _ => json!({}),
        }
    }
}

impl Respond for McpResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(v) => v,
            Err(_) => return ResponseTemplate::new(400),
        };
        let mut template = match body.get("id").cloned() {
            Some(id) => {
                let result = self.result_for(body["method"].as_str().unwrap_or_default());
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
            }
            None => ResponseTemplate::new(202),
        };
        if let Some(sid) = &self.session_id {
            template = template.insert_header("mcp-session-id", sid.as_str());
        }
        if let Some(delay) = self.delay {
            template = template.set_delay(delay);
        }
        template
    }
}

/// Legacy HTTP+SSE MCP server on a real socket.
///
/// `GET /sse` announces `/messages?sessionId=stub` and then streams replies
/// to whatever is POSTed there. The `Authorization` headers of the
/// handshake and of the last POST are recorded.
#[allow(dead_code)]
#[derive(Clone)]
pub struct SseStub {
    responder: McpResponder,
    replies_tx: mpsc::UnboundedSender<String>,
    replies_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<String>>>>,
    pub handshake_auth: Arc<Mutex<Option<String>>>,
    pub post_auth: Arc<Mutex<Option<String>>>,
}

#[allow(dead_code)]
impl SseStub {
    /// Serve on an ephemeral loopback port; returns the stub and its port
    pub async fn start(responder: McpResponder) -> (Self, u16) {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        let stub = Self {
            responder,
            replies_tx,
            replies_rx: Arc::new(Mutex::new(Some(replies_rx))),
            handshake_auth: Arc::new(Mutex::new(None)),
            post_auth: Arc::new(Mutex::new(None)),
        };
        let app = Router::new()
            .route("/sse", get(sse_stream))
            .route("/messages", post(sse_message))
            .with_state(stub.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind sse stub");
        let port = listener.local_addr().expect("stub address").port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("sse stub");
        });
        (stub, port)
    }
}

#[allow(dead_code)]
fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[allow(dead_code)]
async fn sse_stream(State(stub): State<SseStub>, headers: HeaderMap) -> Response {
    *stub.handshake_auth.lock().unwrap() = authorization(&headers);
    let Some(replies) = stub.replies_rx.lock().unwrap().take() else {
        return StatusCode::CONFLICT.into_response();
    };
    let endpoint = futures::stream::once(async {
        Ok::<_, Infallible>(
            Event::default()
                .event("endpoint")
                .data("/messages?sessionId=stub"),
        )
    });
    let messages = futures::stream::unfold(replies, |mut replies| async move {
        let reply = replies.recv().await?;
        Some((
            Ok::<_, Infallible>(Event::default().event("message").data(reply)),
            replies,
        ))
    });
    Sse::new(endpoint.chain(messages)).into_response()
}

#[allow(dead_code)]
async fn sse_message(
    State(stub): State<SseStub>,
    Query(query): Query<std::collections::HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    if query.get("sessionId").map(String::as_str) != Some("stub") {
        return StatusCode::NOT_FOUND;
    }
    *stub.post_auth.lock().unwrap() = authorization(&headers);
    let Ok(message) = serde_json::from_str::<Value>(&body) else {
        return StatusCode::BAD_REQUEST;
    };
    if let Some(id) = message.get("id").cloned() {
        let result = stub
            .responder
            .result_for(message["method"].as_str().unwrap_or_default());
        let reply = json!({"jsonrpc": "2.0", "id": id, "result": result});
        let _ = stub.replies_tx.send(reply.to_string());
    }
    StatusCode::ACCEPTED
}
