//! Legacy HTTP+SSE transport
//!
//! The client opens a long-lived `GET` with `Accept: text/event-stream`. The
//! server's first `endpoint` event names the URL (often relative, with a
//! session query parameter) that client messages are POSTed to; replies come
//! back as `message` events on the stream.
//!
//! The bearer token, when present, is attached to the handshake and to every
//! POST. A `401` on the handshake surfaces from [`SseTransport::connect`]
//! before any message is sent.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::Stream;
use reqwest::StatusCode;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{McpGateError, Result};
use crate::mcp::transport::event_stream::pump_events;
use crate::mcp::transport::{unauthorized, Transport};
use crate::network::gate::{GateRequest, NetworkGate};

/// Legacy SSE transport.
#[derive(Debug)]
pub struct SseTransport {
    gate: NetworkGate,
    post_endpoint: String,
    bearer: Option<String>,
    response_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl SseTransport {
    /// Open the event stream and wait for the `endpoint` event.
    ///
    /// The handshake itself is bounded by the gate's stream handshake
    /// timeout; waiting for the `endpoint` event is bounded by the general
    /// request timeout.
    ///
    /// # Errors
    ///
    /// - `McpGateError::Unauthorized` when the handshake answers `401`
    /// - `McpGateError::McpTransport` for other non-success statuses, a
    ///   stream that ends before announcing its endpoint, or an endpoint
    ///   that does not resolve to a URL
    /// - gate errors when `uri` or the announced endpoint is refused
    pub async fn connect(gate: NetworkGate, uri: &str, bearer: Option<String>) -> Result<Self> {
        let base = Url::parse(uri).map_err(|e| {
            McpGateError::McpTransport(format!("invalid SSE url '{}': {}", uri, e))
        })?;

        let mut request = GateRequest::get().with_accept("text/event-stream");
        if let Some(token) = bearer.as_deref() {
            request = request.with_bearer(token);
        }
        let response = gate.fetch(uri, request).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(unauthorized(&response).into());
        }
        if !response.status().is_success() {
            return Err(McpGateError::McpTransport(format!(
                "SSE handshake returned HTTP {}",
                response.status()
            ))
            .into());
        }

        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<String>();
        let cancel = CancellationToken::new();

        let mut endpoint_tx = Some(endpoint_tx);
        tokio::spawn(pump_events(
            response.bytes_stream(),
            cancel.clone(),
            move |event| match event.kind() {
                "endpoint" => {
                    if let Some(tx) = endpoint_tx.take() {
                        let _ = tx.send(event.data);
                    }
                    true
                }
                "message" => response_tx.send(event.data).is_ok(),
                other => {
                    tracing::debug!("SSE transport ignoring '{}' event", other);
                    true
                }
            },
        ));

        let announced = match tokio::time::timeout(gate.policy().timeout(), endpoint_rx).await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(_)) => {
                cancel.cancel();
                return Err(McpGateError::McpTransport(
                    "SSE stream closed before announcing an endpoint".to_string(),
                )
                .into());
            }
            Err(_) => {
                cancel.cancel();
                return Err(McpGateError::McpTransport(
                    "timed out waiting for SSE endpoint event".to_string(),
                )
                .into());
            }
        };

        let post_endpoint = base
            .join(announced.trim())
            .map_err(|e| {
                cancel.cancel();
                McpGateError::McpTransport(format!("invalid SSE endpoint '{}': {}", announced, e))
            })?
            .to_string();
        tracing::debug!("SSE transport posting to {}", post_endpoint);

        Ok(Self {
            gate,
            post_endpoint,
            bearer,
            response_rx: Arc::new(Mutex::new(response_rx)),
            cancel,
            closed: AtomicBool::new(false),
        })
    }

    /// URL messages are POSTed to
    pub fn post_endpoint(&self) -> &str {
        &self.post_endpoint
    }
}

#[async_trait::async_trait]
impl Transport for SseTransport {
    async fn send(&self, message: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpGateError::McpTransport("transport is closed".to_string()).into());
        }

        let mut request = GateRequest::post_bytes(message, "application/json");
        if let Some(token) = self.bearer.as_deref() {
            request = request.with_bearer(token);
        }
        let response = self.gate.fetch(&self.post_endpoint, request).await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(unauthorized(&response).into());
        }
        if !status.is_success() {
            return Err(McpGateError::McpTransport(format!(
                "SSE POST returned status {}",
                status
            ))
            .into());
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
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.cancel.cancel();
        }
        Ok(())
    }
}
