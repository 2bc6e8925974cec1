//! Transport-agnostic async JSON-RPC 2.0 client
//!
//! [`JsonRpcClient`] writes serialized messages to an outbound channel and
//! resolves responses that a read loop ([`start_read_loop`]) feeds back from
//! an inbound channel. The transport sits between the two channels and never
//! sees the client directly.
//!
//! # Design
//!
//! - In-flight requests live in a `pending` map keyed by numeric id. Each
//!   entry is a `oneshot::Sender` that receives the matching reply.
//! - A reply is either the JSON-RPC `result`, the JSON-RPC `error`, or a
//!   transport failure recorded with [`JsonRpcClient::fail_request`] when the
//!   message could not be delivered. Transport failures keep their original
//!   error type so callers can `downcast_ref` (a `401` surfaces as
//!   `McpGateError::Unauthorized`).
//! - Server-initiated requests are answered with `-32601 Method not found`;
//!   this client advertises no client-side capabilities.
//! - A [`CancellationToken`] stops the read loop and drops all pending
//!   senders so awaiting callers get an error instead of hanging.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{McpGateError, Result};
use crate::mcp::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Timeout applied to a request when the caller does not pass one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a pending request did not get a `result`.
#[derive(Debug)]
enum Failure {
    Rpc(JsonRpcError),
    Transport(anyhow::Error),
}

type Reply = std::result::Result<serde_json::Value, Failure>;

type PendingMap = HashMap<u64, oneshot::Sender<Reply>>;

type NotificationHandler = Box<dyn Fn(serde_json::Value) + Send + Sync + 'static>;

/// Channel-backed JSON-RPC 2.0 client.
///
/// Clones share the same pending map and id counter, so a read loop started
/// with one clone resolves requests issued through any other.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
/// use mcpgate::mcp::client::{start_read_loop, JsonRpcClient};
///
/// # #[tokio::main]
/// # async fn main() {
/// let (out_tx, _out_rx) = mpsc::unbounded_channel::<String>();
/// let (_in_tx, in_rx) = mpsc::unbounded_channel::<String>();
/// let client = JsonRpcClient::new(out_tx);
/// let handle = start_read_loop(in_rx, CancellationToken::new(), client.clone());
/// # drop(handle);
/// # }
/// ```
#[derive(Clone)]
pub struct JsonRpcClient {
    next_id: Arc<AtomicU64>,
    pending: Arc<Mutex<PendingMap>>,
    outbound_tx: mpsc::UnboundedSender<String>,
    notification_handlers: Arc<Mutex<HashMap<String, NotificationHandler>>>,
}

impl std::fmt::Debug for JsonRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcClient")
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl JsonRpcClient {
    /// Create a client that writes to `outbound_tx`
    pub fn new(outbound_tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            outbound_tx,
            notification_handlers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Send a request and await the typed result.
    ///
    /// # Arguments
    ///
    /// * `method` - JSON-RPC method name
    /// * `params` - Serialized into `params`
    /// * `timeout` - Defaults to [`DEFAULT_REQUEST_TIMEOUT`]
    ///
    /// # Errors
    ///
    /// - `McpGateError::McpTransport` if the outbound channel is closed or the
    ///   read loop exits first
    /// - `McpGateError::McpTimeout` if no reply arrives in time
    /// - `McpGateError::Mcp` for a JSON-RPC error reply
    /// - whatever the transport reported via [`fail_request`](Self::fail_request)
    pub async fn request<P, R>(
        &self,
        method: &str,
        params: P,
        timeout: Option<Duration>,
    ) -> Result<R>
    where
        P: serde::Serialize + Send,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        // Register before sending so a fast reply cannot be lost.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let message = serde_json::to_string(&JsonRpcRequest::new(
            id,
            method,
            Some(serde_json::to_value(params)?),
        ))?;

        if self.outbound_tx.send(message).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(McpGateError::McpTransport("outbound channel closed".to_string()).into());
        }

        let deadline = timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let outcome = match tokio::time::timeout(deadline, rx).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(McpGateError::McpTimeout {
                    method: method.to_string(),
                }
                .into());
            }
        };

        let reply = outcome.map_err(|_| {
            McpGateError::McpTransport("read loop exited before response arrived".to_string())
        })?;

        match reply {
            Ok(value) => serde_json::from_value(value).map_err(|e| McpGateError::Serialization(e).into()),
            Err(Failure::Rpc(e)) => Err(McpGateError::Mcp(e.to_string()).into()),
            Err(Failure::Transport(e)) => Err(e),
        }
    }

    /// Send a notification; no reply is expected.
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::McpTransport` if the outbound channel is closed.
    pub fn notify<P: serde::Serialize + Send>(&self, method: &str, params: P) -> Result<()> {
        let message = serde_json::to_string(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": serde_json::to_value(params)?
        }))?;

        self.outbound_tx
            .send(message)
            .map_err(|_| McpGateError::McpTransport("outbound channel closed".to_string()))?;
        Ok(())
    }

    /// Resolve request `id` with a transport failure.
    ///
    /// Returns `false` when nothing was waiting on `id`.
    pub async fn fail_request(&self, id: u64, error: anyhow::Error) -> bool {
        match self.pending.lock().await.remove(&id) {
            Some(tx) => {
                // The caller may have timed out already.
                let _ = tx.send(Err(Failure::Transport(error)));
                true
            }
            None => false,
        }
    }

    /// Number of requests awaiting a reply
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Register a handler for a server notification, replacing any previous
    /// handler for `method`.
    pub async fn on_notification(
        &self,
        method: impl Into<String>,
        f: impl Fn(serde_json::Value) + Send + Sync + 'static,
    ) {
        self.notification_handlers
            .lock()
            .await
            .insert(method.into(), Box::new(f));
    }
}

/// Extract the numeric request id from a serialized outbound message.
///
/// Returns `None` for notifications and responses.
pub fn request_id(message: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(message).ok()?;
    value.get("method")?;
    let id = value.get("id")?;
    id.as_u64().or_else(|| id.as_str()?.parse().ok())
}

/// Start the read loop as a background task.
///
/// Each inbound string is classified as a response (resolves the pending
/// sender), a server request (answered with `-32601`), or a notification
/// (dispatched to a registered handler, otherwise ignored). The loop ends on
/// cancellation or when the inbound channel closes; either way all pending
/// senders are dropped.
pub fn start_read_loop(
    mut inbound_rx: mpsc::UnboundedReceiver<String>,
    cancellation: CancellationToken,
    client: JsonRpcClient,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                _ = cancellation.cancelled() => break,

                maybe_msg = inbound_rx.recv() => {
                    let Some(raw) = maybe_msg else { break };
                    dispatch_message(&raw, &client).await;
                }
            }
        }
        client.pending.lock().await.clear();
    })
}

async fn dispatch_message(raw: &str, client: &JsonRpcClient) {
    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("MCP read loop: failed to parse inbound JSON: {e}");
            return;
        }
    };

    // A batch (array) is dispatched element by element.
    if let serde_json::Value::Array(items) = value {
        for item in items {
            dispatch_value(item, client).await;
        }
        return;
    }
    dispatch_value(value, client).await;
}

async fn dispatch_value(value: serde_json::Value, client: &JsonRpcClient) {
    let has_id = value.get("id").is_some_and(|id| !id.is_null());
    let has_method = value.get("method").is_some();
    let has_outcome = value.get("result").is_some() || value.get("error").is_some();

    if has_id && has_outcome && !has_method {
        handle_response(value, client).await;
    } else if has_id && has_method {
        reject_server_request(value, client);
    } else if has_method {
        handle_notification(value, client).await;
    } else {
        tracing::debug!("MCP read loop: unclassifiable message ignored");
    }
}

async fn handle_response(value: serde_json::Value, client: &JsonRpcClient) {
    let id_val = &value["id"];
    let Some(id) = id_val
        .as_u64()
        .or_else(|| id_val.as_str().and_then(|s| s.parse().ok()))
    else {
        tracing::warn!("MCP read loop: response has non-integer id: {id_val}");
        return;
    };

    let Some(tx) = client.pending.lock().await.remove(&id) else {
        tracing::debug!("MCP read loop: response for unknown id {id} ignored");
        return;
    };

    let reply = match value.get("error") {
        Some(error_val) => Err(Failure::Rpc(
            serde_json::from_value::<JsonRpcError>(error_val.clone()).unwrap_or_else(|_| {
                JsonRpcError {
                    code: -32603,
                    message: format!("malformed error object: {error_val}"),
                    data: None,
                }
            }),
        )),
        None => Ok(value
            .get("result")
            .cloned()
            .unwrap_or(serde_json::Value::Null)),
    };

    let _ = tx.send(reply);
}

fn reject_server_request(value: serde_json::Value, client: &JsonRpcClient) {
    let method = value
        .get("method")
        .and_then(|m| m.as_str())
        .unwrap_or_default();
    tracing::debug!("MCP read loop: rejecting server request '{method}'");

    let response = JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id: value.get("id").cloned(),
        result: None,
        error: Some(JsonRpcError {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: None,
        }),
    };
    if let Ok(serialized) = serde_json::to_string(&response) {
        let _ = client.outbound_tx.send(serialized);
    }
}

async fn handle_notification(value: serde_json::Value, client: &JsonRpcClient) {
    let Some(method) = value.get("method").and_then(|m| m.as_str()) else {
        return;
    };
    let params = value
        .get("params")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    let handlers = client.notification_handlers.lock().await;
    match handlers.get(method) {
        Some(handler) => handler(params),
        None => tracing::debug!("MCP read loop: no handler for notification '{method}'"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
