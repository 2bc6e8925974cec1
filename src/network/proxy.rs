//! HTTP proxy surface in front of the network gate
//!
//! Browsers and other clients that cannot enforce the outbound policy
//! themselves reach MCP servers through these routes. The target is taken
//! from the `server_uri` query parameter and checked by [`NetworkGate`] before
//! any byte leaves the process.
//!
//! | Route                          | Upstream request                     |
//! |--------------------------------|--------------------------------------|
//! | `POST /proxy/mcp/streamable`   | POST of the body, response relayed   |
//! | `GET  /proxy/mcp/streamable`   | GET `text/event-stream`, streamed    |
//! | `POST /proxy/mcp/sse`          | POST to the SSE message endpoint     |
//! | `GET  /proxy/mcp/sse`          | GET `text/event-stream`, streamed    |
//!
//! Validation failures answer `400 Invalid server URI: <reason>`, other
//! failures `500 Proxy error: <message>`.

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CACHE_CONTROL, CONNECTION, CONTENT_TYPE,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::error::McpGateError;
use crate::network::gate::{GateRequest, NetworkGate};

const POST_METHODS: &str = "POST, OPTIONS";
const GET_METHODS: &str = "GET, OPTIONS";
const ALL_METHODS: &str = "GET, POST, OPTIONS";

/// Client headers copied onto the upstream request.
const FORWARDED_HEADERS: [&str; 5] = [
    "authorization",
    "mcp-session-id",
    "mcp-protocol-version",
    "last-event-id",
    "accept",
];

/// Upstream headers that describe the upstream connection, not the payload.
const HOP_BY_HOP: [&str; 5] = [
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
    "upgrade",
];

/// Query parameters shared by every proxy route
#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    /// Upstream MCP endpoint, URL-encoded
    pub server_uri: Option<String>,
}

/// Build the proxy router.
///
/// # Examples
///
/// ```
/// use mcpgate::network::gate::NetworkGate;
/// use mcpgate::network::policy::NetworkPolicy;
/// use mcpgate::network::proxy;
///
/// let gate = NetworkGate::new(NetworkPolicy::default()).unwrap();
/// let _router: axum::Router = proxy::router(gate);
/// ```
pub fn router(gate: NetworkGate) -> Router {
    Router::new()
        .route(
            "/proxy/mcp/streamable",
            get(forward_stream).post(forward_post).options(preflight),
        )
        .route(
            "/proxy/mcp/sse",
            get(forward_stream).post(forward_post).options(preflight),
        )
        .with_state(gate)
}

async fn forward_post(
    State(gate): State<NetworkGate>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(target) = query.server_uri else {
        return invalid_uri("missing server_uri parameter", POST_METHODS);
    };

    let mut request = GateRequest::post_bytes(body, "application/json");
    if let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        request = request.with_header(CONTENT_TYPE.as_str(), content_type);
    }
    request = forward_headers(request, &headers);

    match gate.fetch(&target, request).await {
        Ok(upstream) => relay(upstream, POST_METHODS),
        Err(e) => failure(e, POST_METHODS),
    }
}

async fn forward_stream(
    State(gate): State<NetworkGate>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(target) = query.server_uri else {
        return invalid_uri("missing server_uri parameter", GET_METHODS);
    };

    let request =
        forward_headers(GateRequest::get(), &headers).with_accept("text/event-stream");

    let upstream = match gate.fetch(&target, request).await {
        Ok(upstream) => upstream,
        Err(e) => return failure(e, GET_METHODS),
    };

    if !upstream.status().is_success() {
        return relay(upstream, GET_METHODS);
    }
    if upstream.content_length() == Some(0) {
        tracing::warn!("upstream {} returned an empty stream", target);
        return text(StatusCode::BAD_GATEWAY, "No upstream stream".to_string(), GET_METHODS);
    }

    let mut response = relay(upstream, GET_METHODS);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

async fn preflight() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    cors(response.headers_mut(), ALL_METHODS);
    response
}

fn forward_headers(mut request: GateRequest, headers: &HeaderMap) -> GateRequest {
    for name in FORWARDED_HEADERS {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            request = request.with_header(name, value);
        }
    }
    request
}

/// Copy an upstream response (status, headers, streamed body) into an axum
/// response.
fn relay(upstream: reqwest::Response, methods: &'static str) -> Response {
    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    cors(response.headers_mut(), methods);
    response
}

fn failure(error: anyhow::Error, methods: &'static str) -> Response {
    match error.downcast_ref::<McpGateError>() {
        Some(McpGateError::Validation(reason)) => {
            tracing::warn!("proxy target rejected: {}", reason);
            invalid_uri(&reason.to_string(), methods)
        }
        _ => {
            tracing::error!("proxy request failed: {:#}", error);
            text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Proxy error: {}", error),
                methods,
            )
        }
    }
}

fn invalid_uri(reason: &str, methods: &'static str) -> Response {
    text(
        StatusCode::BAD_REQUEST,
        format!("Invalid server URI: {}", reason),
        methods,
    )
}

fn text(status: StatusCode, body: String, methods: &'static str) -> Response {
    let mut response = (status, body).into_response();
    cors(response.headers_mut(), methods);
    response
}

fn cors(headers: &mut HeaderMap, methods: &'static str) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(methods));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::policy::NetworkPolicy;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        router(NetworkGate::new(NetworkPolicy::default()).unwrap())
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_server_uri_is_bad_request() {
        let response = app()
            .oneshot(
                Request::post("/proxy/mcp/streamable")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_text(response).await,
            "Invalid server URI: missing server_uri parameter"
        );
    }

    #[tokio::test]
    async fn test_disallowed_host_reports_reason() {
        let response = app()
            .oneshot(
                Request::get("/proxy/mcp/sse?server_uri=http%3A%2F%2Fevil.example%2Fsse")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_METHODS], GET_METHODS);
        let body = body_text(response).await;
        assert!(body.starts_with("Invalid server URI: "));
        assert!(body.contains("evil.example"));
    }

    #[tokio::test]
    async fn test_preflight_allows_both_verbs() {
        let response = app()
            .oneshot(
                Request::options("/proxy/mcp/streamable")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_HEADERS],
            "Authorization, Content-Type"
        );
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_METHODS], ALL_METHODS);
    }

    #[test]
    fn test_forward_headers_copies_session_and_auth() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer t"));
        headers.insert("mcp-session-id", HeaderValue::from_static("s-1"));
        headers.insert("cookie", HeaderValue::from_static("secret"));
        let request = forward_headers(GateRequest::get(), &headers);
        assert_eq!(request.headers["authorization"], "Bearer t");
        assert_eq!(request.headers["mcp-session-id"], "s-1");
        assert!(request.headers.get("cookie").is_none());
    }
}
