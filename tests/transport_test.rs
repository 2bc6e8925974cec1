//! MCP transport integration tests
//!
//! Exercises the streamable HTTP and legacy SSE transports against
//! `wiremock`. Every request goes through a `NetworkGate` allowing only the
//! mock server's port.
//!
//! Use `set_body_raw(bytes, "text/event-stream")` for SSE bodies so the
//! content type is exact.

mod common;

use std::time::Duration;

use futures::StreamExt;
use mcpgate::error::McpGateError;
use mcpgate::mcp::transport::sse::SseTransport;
use mcpgate::mcp::transport::streamable_http::StreamableHttpTransport;
use mcpgate::mcp::transport::Transport;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PING: &str = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;

async fn next_message(transport: &dyn Transport) -> Option<String> {
    let mut stream = transport.receive();
    tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .ok()
        .flatten()
}

// ---------------------------------------------------------------------------
// Streamable HTTP
// ---------------------------------------------------------------------------

/// A JSON response body is delivered to `receive()` and the session id
/// from the first response is echoed on later requests and on close.
#[tokio::test]
async fn test_streamable_session_id_round_trip() {
    let server = MockServer::start().await;
    let reply = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", "sess-42"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header_exists("mcp-protocol-version"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("mcp-session-id", "sess-42")
                .set_body_raw(reply.as_bytes().to_vec(), "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", "sess-42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let gate = common::gate_for(common::port_of(&server));
    let transport = StreamableHttpTransport::new(
        gate,
        format!("{}/mcp", server.uri()),
        Some("tok".to_string()),
    );

    transport.send(PING.to_string()).await.unwrap();
    assert_eq!(next_message(&transport).await.as_deref(), Some(reply));
    assert_eq!(transport.session_id().await.as_deref(), Some("sess-42"));

    transport
        .send(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#.to_string())
        .await
        .unwrap();

    transport.close().await.unwrap();
    transport.close().await.unwrap();
}

/// An SSE response body is split into `message` events.
#[tokio::test]
async fn test_streamable_event_stream_response() {
    let server = MockServer::start().await;
    let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n: keepalive\n\n";
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let transport = StreamableHttpTransport::new(
        common::gate_for(common::port_of(&server)),
        format!("{}/mcp", server.uri()),
        None,
    );
    transport.send(PING.to_string()).await.unwrap();
    assert_eq!(
        next_message(&transport).await.as_deref(),
        Some(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#)
    );
}

/// `401` keeps the `WWW-Authenticate` value for discovery.
#[tokio::test]
async fn test_streamable_unauthorized_carries_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("www-authenticate", "Bearer resource_metadata=\"x\""),
        )
        .mount(&server)
        .await;

    let transport = StreamableHttpTransport::new(
        common::gate_for(common::port_of(&server)),
        format!("{}/mcp", server.uri()),
        None,
    );
    let err = transport.send(PING.to_string()).await.unwrap_err();
    match err.downcast_ref::<McpGateError>() {
        Some(McpGateError::Unauthorized { www_authenticate }) => {
            assert_eq!(
                www_authenticate.as_deref(),
                Some("Bearer resource_metadata=\"x\"")
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_streamable_refused_target_never_sent() {
    let server = MockServer::start().await;
    // Port not added to the policy.
    let gate = common::gate_for(1);
    let transport = StreamableHttpTransport::new(gate, format!("{}/mcp", server.uri()), None);

    let err = transport.send(PING.to_string()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<McpGateError>(),
        Some(McpGateError::Validation(_))
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Legacy SSE
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_sse_endpoint_event_sets_post_url() {
    let server = MockServer::start().await;
    let body = "event: endpoint\ndata: /messages?sessionId=abc\n\n";
    Mock::given(method("GET"))
        .and(path("/sse"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let transport = SseTransport::connect(
        common::gate_for(common::port_of(&server)),
        &format!("{}/sse", server.uri()),
        Some("tok".to_string()),
    )
    .await
    .unwrap();

    assert_eq!(
        transport.post_endpoint(),
        format!("{}/messages?sessionId=abc", server.uri())
    );
    transport.send(PING.to_string()).await.unwrap();
    transport.close().await.unwrap();
    assert!(transport.send(PING.to_string()).await.is_err());
}

#[tokio::test]
async fn test_sse_handshake_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = SseTransport::connect(
        common::gate_for(common::port_of(&server)),
        &format!("{}/sse", server.uri()),
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<McpGateError>(),
        Some(McpGateError::Unauthorized {
            www_authenticate: None
        })
    ));
}

#[tokio::test]
async fn test_sse_stream_without_endpoint_fails() {
    let server = MockServer::start().await;
    let body = "event: message\ndata: {}\n\n";
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let err = SseTransport::connect(
        common::gate_for(common::port_of(&server)),
        &format!("{}/sse", server.uri()),
        None,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("endpoint"));
}
