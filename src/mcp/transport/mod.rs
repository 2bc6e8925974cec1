//! MCP transport abstraction and implementations
//!
//! A [`Transport`] moves serialized JSON-RPC strings between the client and
//! one remote MCP server:
//!
//! - [`streamable_http::StreamableHttpTransport`] -- one POST per message,
//!   replies as JSON or an event stream, `mcp-session-id` correlation
//! - [`sse::SseTransport`] -- legacy HTTP+SSE: a long-lived GET stream that
//!   announces a POST endpoint
//! - [`fake::FakeTransport`] -- in-process fake used in tests
//!
//! Both HTTP transports send every request through the
//! [`NetworkGate`](crate::network::gate::NetworkGate), so the allow-lists,
//! blocked ranges, redirect refusal and timeouts apply to MCP traffic exactly
//! as they do to the proxy endpoints.
//!
//! A `401` from the server is reported as `McpGateError::Unauthorized`
//! carrying the `WWW-Authenticate` header, which the connection manager turns
//! into authorization discovery.

use std::pin::Pin;

use futures::Stream;

use crate::error::Result;

pub mod event_stream;
pub mod sse;
pub mod streamable_http;

#[cfg(test)]
pub mod fake;

/// Name of the session correlation header.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Name of the protocol version header sent on every streamable HTTP request.
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Bidirectional message channel to one MCP server.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Deliver one complete JSON-RPC message.
    ///
    /// # Errors
    ///
    /// - `McpGateError::Unauthorized` when the server answers `401`
    /// - `McpGateError::McpTransport` for other delivery failures
    /// - gate errors (`Validation`, `Network`) when the target is refused
    async fn send(&self, message: String) -> Result<()>;

    /// Stream of inbound JSON-RPC message strings. Ends when the transport
    /// closes.
    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>>;

    /// Tear the transport down. Calling it more than once is harmless.
    async fn close(&self) -> Result<()>;
}

/// Build an `Unauthorized` error from a `401` response.
pub(crate) fn unauthorized(resp: &reqwest::Response) -> crate::error::McpGateError {
    crate::error::McpGateError::Unauthorized {
        www_authenticate: resp
            .headers()
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}
