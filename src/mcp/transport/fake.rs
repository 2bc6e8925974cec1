//! In-process fake transport for unit tests
//!
//! [`FakeTransport::new`] returns the transport plus a
//! [`FakeTransportHandle`]. From the client's point of view "outbound" is
//! what it sends (the test reads `handle.outbound_rx`) and "inbound" is what
//! it receives (the test writes `handle.inbound_tx`).
//!
//! ```text
//! client send() -----> outbound_tx -----> outbound_rx (handle reads)
//! handle inbound_tx -----------------> inbound_rx  (client receive())
//! ```

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, Mutex};

use crate::error::{McpGateError, Result};
use crate::mcp::transport::Transport;

/// Channel-backed transport.
#[derive(Debug)]
pub struct FakeTransport {
    outbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    fail_with: std::sync::Mutex<Option<McpGateError>>,
    close_calls: Arc<AtomicUsize>,
}

/// Test side of a [`FakeTransport`].
#[derive(Debug)]
pub struct FakeTransportHandle {
    /// Messages the client sent
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
    /// Messages the client will receive
    pub inbound_tx: mpsc::UnboundedSender<String>,
    /// How many times `close` was called
    pub close_calls: Arc<AtomicUsize>,
}

impl FakeTransport {
    /// A connected transport/handle pair
    pub fn new() -> (Self, FakeTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        let close_calls = Arc::new(AtomicUsize::new(0));

        let transport = Self {
            outbound_tx,
            inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            fail_with: std::sync::Mutex::new(None),
            close_calls: Arc::clone(&close_calls),
        };
        let handle = FakeTransportHandle {
            outbound_rx,
            inbound_tx,
            close_calls,
        };
        (transport, handle)
    }

    /// Make the next `send` fail with `error`
    pub fn fail_next_send(&self, error: McpGateError) {
        if let Ok(mut slot) = self.fail_with.lock() {
            *slot = Some(error);
        }
    }
}

impl FakeTransportHandle {
    /// Answer every request with `respond(method, params)` from a background
    /// task. Notifications are dropped.
    pub fn serve<F>(self, respond: F) -> Arc<AtomicUsize>
    where
        F: Fn(&str, &serde_json::Value) -> serde_json::Value + Send + 'static,
    {
        let FakeTransportHandle {
            mut outbound_rx,
            inbound_tx,
            close_calls,
        } = self;
        tokio::spawn(async move {
            while let Some(raw) = outbound_rx.recv().await {
                let req: serde_json::Value = match serde_json::from_str(&raw) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let Some(id) = req.get("id").filter(|id| !id.is_null()).cloned() else {
                    continue;
                };
                let method = req["method"].as_str().unwrap_or_default().to_string();
                let result = respond(&method, &req["params"]);
                let resp = serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result});
                if inbound_tx.send(resp.to_string()).is_err() {
                    break;
                }
            }
        });
        close_calls
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn send(&self, message: String) -> Result<()> {
        let scripted = self.fail_with.lock().ok().and_then(|mut slot| slot.take());
        if let Some(error) = scripted {
            return Err(error.into());
        }
        self.outbound_tx.send(message).map_err(|e| {
            McpGateError::McpTransport(format!("FakeTransport outbound channel closed: {}", e))
                .into()
        })
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.inbound_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let item = rx.lock().await.recv().await?;
            Some((item, rx))
        }))
    }

    async fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_send_reaches_handle() {
        let (transport, mut handle) = FakeTransport::new();
        transport.send("msg".to_string()).await.unwrap();
        assert_eq!(handle.outbound_rx.recv().await.unwrap(), "msg");
    }

    #[tokio::test]
    async fn test_receive_yields_injected_in_order() {
        let (transport, handle) = FakeTransport::new();
        for i in 0..3 {
            handle.inbound_tx.send(format!("resp-{i}")).unwrap();
        }
        let mut stream = transport.receive();
        for i in 0..3 {
            let msg = tokio::time::timeout(Duration::from_secs(2), stream.next())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(msg, format!("resp-{i}"));
        }
    }

    #[tokio::test]
    async fn test_scripted_failure_applies_once() {
        let (transport, _handle) = FakeTransport::new();
        transport.fail_next_send(McpGateError::Unauthorized {
            www_authenticate: None,
        });
        assert!(transport.send("a".to_string()).await.is_err());
        assert!(transport.send("b".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn test_close_is_counted() {
        let (transport, handle) = FakeTransport::new();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert_eq!(handle.close_calls.load(Ordering::SeqCst), 2);
    }
}
