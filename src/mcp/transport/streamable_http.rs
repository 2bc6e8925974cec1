//! Streamable HTTP transport
//!
//! Every outbound JSON-RPC message is one POST to the MCP endpoint. The
//! server replies with:
//!
//! - `application/json` -- the response body is one message (or a batch)
//! - `text/event-stream` -- a stream of `message` events, decoded in a
//!   background task
//! - `202 Accepted` -- acknowledgement of a notification, no body
//!
//! # Session management
//!
//! The first response carrying an `mcp-session-id` header fixes the session;
//! the id is attached to every later request. A `404` while a session is
//! active means the server dropped it: the id is cleared and
//! `McpGateError::Mcp("mcp session expired")` is returned. [`close`] sends a
//! `DELETE` with the session id so the server can free it.
//!
//! [`close`]: Transport::close

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::Stream;
use reqwest::StatusCode;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{McpGateError, Result};
use crate::mcp::transport::event_stream::pump_events;
use crate::mcp::transport::{unauthorized, Transport, PROTOCOL_VERSION_HEADER, SESSION_HEADER};
use crate::mcp::types::LATEST_PROTOCOL_VERSION;
use crate::network::gate::{GateRequest, NetworkGate};

const POST_ACCEPT: &str = "application/json, text/event-stream";

/// Streamable HTTP transport bound to one endpoint.
///
/// # Examples
///
/// ```
/// use mcpgate::mcp::transport::streamable_http::StreamableHttpTransport;
/// use mcpgate::network::gate::NetworkGate;
/// use mcpgate::network::policy::NetworkPolicy;
///
/// let gate = NetworkGate::new(NetworkPolicy::default()).unwrap();
/// let transport = StreamableHttpTransport::new(gate, "http://localhost:8081/mcp", None);
/// assert_eq!(transport.endpoint(), "http://localhost:8081/mcp");
/// ```
#[derive(Debug)]
pub struct StreamableHttpTransport {
    gate: NetworkGate,
    endpoint: String,
    bearer: Option<String>,
    session_id: Arc<RwLock<Option<String>>>,
    response_tx: mpsc::UnboundedSender<String>,
    response_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl StreamableHttpTransport {
    /// Create a transport. No I/O happens until the first `send`.
    ///
    /// # Arguments
    ///
    /// * `gate` - Outbound gate every request goes through
    /// * `endpoint` - MCP endpoint URL
    /// * `bearer` - Access token attached as `Authorization: Bearer`
    pub fn new(gate: NetworkGate, endpoint: impl Into<String>, bearer: Option<String>) -> Self {
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        Self {
            gate,
            endpoint: endpoint.into(),
            bearer,
            session_id: Arc::new(RwLock::new(None)),
            response_tx,
            response_rx: Arc::new(Mutex::new(response_rx)),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Session id assigned by the server, if any
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    async fn decorate(&self, mut request: GateRequest) -> GateRequest {
        request = request.with_header(PROTOCOL_VERSION_HEADER, LATEST_PROTOCOL_VERSION);
        if let Some(sid) = self.session_id.read().await.as_deref() {
            request = request.with_header(SESSION_HEADER, sid);
        }
        if let Some(token) = self.bearer.as_deref() {
            request = request.with_bearer(token);
        }
        request
    }
}

#[async_trait::async_trait]
impl Transport for StreamableHttpTransport {
    async fn send(&self, message: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpGateError::McpTransport("transport is closed".to_string()).into());
        }

        let request = self
            .decorate(GateRequest::post_bytes(message, "application/json").with_accept(POST_ACCEPT))
            .await;
        let response = self.gate.fetch(&self.endpoint, request).await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(unauthorized(&response).into());
        }

        if status == StatusCode::NOT_FOUND {
            let mut sid = self.session_id.write().await;
            if sid.take().is_some() {
                return Err(McpGateError::Mcp("mcp session expired".into()).into());
            }
            return Err(McpGateError::McpTransport("HTTP 404 Not Found".into()).into());
        }

        if status == StatusCode::ACCEPTED {
            return Ok(());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpGateError::McpTransport(format!(
                "HTTP POST returned status {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            ))
            .into());
        }

        if let Some(new_id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut sid = self.session_id.write().await;
            if sid.is_none() {
                tracing::debug!("MCP session established: {}", new_id);
                *sid = Some(new_id.to_string());
            }
        }

        let is_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));

        if is_stream {
            let tx = self.response_tx.clone();
            let cancel = self.cancel.child_token();
            tokio::spawn(pump_events(response.bytes_stream(), cancel, move |event| {
                if event.kind() != "message" {
                    return true;
                }
                tx.send(event.data).is_ok()
            }));
        } else {
            let body = response.text().await.map_err(|e| {
                McpGateError::McpTransport(format!("failed to read response body: {}", e))
            })?;
            if !body.trim().is_empty() {
                let _ = self.response_tx.send(body);
            }
        }

        Ok(())
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.response_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let item = rx.lock().await.recv().await?;
            Some((item, rx))
        }))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();

        let Some(sid) = self.session_id.write().await.take() else {
            return Ok(());
        };
        let mut request = GateRequest::delete().with_header(SESSION_HEADER, &sid);
        if let Some(token) = self.bearer.as_deref() {
            request = request.with_bearer(token);
        }
        match self.gate.fetch(&self.endpoint, request).await {
            Ok(resp) => tracing::debug!("MCP session {} deleted ({})", sid, resp.status()),
            Err(e) => tracing::debug!("MCP session {} delete failed: {}", sid, e),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::policy::NetworkPolicy;

    fn transport() -> StreamableHttpTransport {
        let gate = NetworkGate::new(NetworkPolicy::default()).unwrap();
        StreamableHttpTransport::new(gate, "http://localhost:9/mcp", Some("tok".to_string()))
    }

    #[tokio::test]
    async fn test_session_id_initially_none() {
        assert!(transport().session_id().await.is_none());
    }

    #[tokio::test]
    async fn test_decorate_adds_headers() {
        let t = transport();
        *t.session_id.write().await = Some("abc".to_string());
        let req = t.decorate(GateRequest::get()).await;
        assert_eq!(req.headers[SESSION_HEADER], "abc");
        assert_eq!(req.headers[PROTOCOL_VERSION_HEADER], LATEST_PROTOCOL_VERSION);
        assert_eq!(req.headers[reqwest::header::AUTHORIZATION], "Bearer tok");
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let t = transport();
        t.close().await.unwrap();
        t.close().await.unwrap();
        assert!(t.send("{}".to_string()).await.is_err());
    }
}
