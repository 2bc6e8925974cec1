//! SSRF-hardened outbound HTTP gate
//!
//! Every outbound request in this crate goes through [`NetworkGate::fetch`].
//! The gate validates the target against the [`NetworkPolicy`] allow-lists,
//! resolves the host and rejects blocked address ranges, strips embedded
//! credentials, and then issues the request with redirects disabled.
//!
//! Streaming requests (`Accept: text/event-stream`) are bounded only until
//! response headers arrive, so long-lived event streams survive; everything
//! else gets a single end-to-end timeout.

use crate::error::{McpGateError, Result, ValidationError};
use crate::network::policy::{NetworkPolicy, LOOPBACK_NAMES};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use url::{Host, Url};

/// Upper bound on DNS resolution during validation.
const DNS_TIMEOUT: Duration = Duration::from_secs(5);

/// An outbound request description handed to [`NetworkGate::fetch`].
///
/// # Examples
///
/// ```
/// use mcpgate::network::gate::GateRequest;
///
/// let req = GateRequest::get().with_accept("text/event-stream");
/// assert!(req.is_streaming());
///
/// let req = GateRequest::post_json(&serde_json::json!({"a": 1})).unwrap();
/// assert!(!req.is_streaming());
/// ```
#[derive(Debug, Clone)]
pub struct GateRequest {
    /// HTTP method
    pub method: Method,
    /// Request headers
    pub headers: HeaderMap,
    /// Optional request body
    pub body: Option<Bytes>,
}

impl GateRequest {
    /// A request with the given method and no headers or body
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// A bare `GET`
    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    /// A bare `DELETE`
    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    /// A `POST` carrying `value` as a JSON body
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Serialization` if `value` cannot be serialized.
    pub fn post_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value).map_err(McpGateError::Serialization)?;
        Ok(Self::post_bytes(body, "application/json"))
    }

    /// A `POST` carrying an `application/x-www-form-urlencoded` body
    pub fn post_form(pairs: &[(&str, &str)]) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        Self::post_bytes(body, "application/x-www-form-urlencoded")
    }

    /// A `POST` with a raw body and content type
    pub fn post_bytes(body: impl Into<Bytes>, content_type: &'static str) -> Self {
        let mut req = Self::new(Method::POST);
        req.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        req.body = Some(body.into());
        req
    }

    /// Set the `Accept` header
    pub fn with_accept(mut self, accept: &'static str) -> Self {
        self.headers.insert(ACCEPT, HeaderValue::from_static(accept));
        self
    }

    /// Attach `Authorization: Bearer <token>`; an unencodable token is skipped
    pub fn with_bearer(mut self, token: &str) -> Self {
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(value) => {
                self.headers.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("Bearer token contains invalid header characters"),
        }
        self
    }

    /// Set an arbitrary header; invalid names or values are skipped
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// True when the caller asked for an event stream and nothing else
    pub fn is_streaming(&self) -> bool {
        self.headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().starts_with("text/event-stream"))
            .unwrap_or(false)
    }
}

/// Validates targets against a [`NetworkPolicy`] and performs the request.
///
/// Cloning is cheap; clones share the policy and the connection pool.
#[derive(Debug, Clone)]
pub struct NetworkGate {
    policy: Arc<NetworkPolicy>,
    http: reqwest::Client,
}

impl NetworkGate {
    /// Create a gate enforcing `policy`
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Http` if the HTTP client cannot be built.
    pub fn new(policy: NetworkPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("mcpgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(McpGateError::Http)?;

        Ok(Self {
            policy: Arc::new(policy),
            http,
        })
    }

    /// The policy this gate enforces
    pub fn policy(&self) -> &NetworkPolicy {
        &self.policy
    }

    /// Validate `raw` against the policy
    ///
    /// Checks, in order: parse, protocol, exact host allow-list, effective
    /// port, resolved address against blocked ranges (skipped for the
    /// loopback names), then strips any embedded username and password.
    ///
    /// # Arguments
    ///
    /// * `raw` - Caller-supplied target URL
    ///
    /// # Returns
    ///
    /// The sanitized URL, or the specific reason the target was rejected.
    pub async fn validate(&self, raw: &str) -> std::result::Result<Url, ValidationError> {
        let mut url =
            Url::parse(raw.trim()).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

        let scheme = url.scheme().to_string();
        if !self.policy.is_protocol_allowed(&scheme) {
            return Err(ValidationError::ProtocolNotAllowed(scheme));
        }

        let host = url
            .host_str()
            .ok_or_else(|| ValidationError::InvalidUrl("URL has no host".to_string()))?
            .to_string();
        if !self.policy.is_host_allowed(&host) {
            return Err(ValidationError::HostNotAllowed(host));
        }

        let port = url
            .port_or_known_default()
            .ok_or_else(|| ValidationError::InvalidUrl("URL has no port".to_string()))?;
        if !self.policy.is_port_allowed(port) {
            return Err(ValidationError::PortNotAllowed(port));
        }

        if !LOOPBACK_NAMES.contains(&host.as_str()) {
            self.check_resolved_addresses(&url, &host, port).await?;
        }

        if !url.username().is_empty() || url.password().is_some() {
            tracing::debug!("Stripping embedded credentials from {}", host);
            // Both setters only fail for cannot-be-a-base URLs, which have no host.
            let _ = url.set_username("");
            let _ = url.set_password(None);
        }

        Ok(url)
    }

    async fn check_resolved_addresses(
        &self,
        url: &Url,
        host: &str,
        port: u16,
    ) -> std::result::Result<(), ValidationError> {
        let addrs: Vec<std::net::IpAddr> = match url.host() {
            Some(Host::Ipv4(v4)) => vec![v4.into()],
            Some(Host::Ipv6(v6)) => vec![v6.into()],
            Some(Host::Domain(domain)) => {
                let lookup =
                    tokio::time::timeout(DNS_TIMEOUT, tokio::net::lookup_host((domain, port)))
                        .await;
                match lookup {
                    Ok(Ok(addrs)) => addrs.map(|a| a.ip()).collect(),
                    Ok(Err(e)) => {
                        return Err(ValidationError::Resolution {
                            host: host.to_string(),
                            message: e.to_string(),
                        })
                    }
                    Err(_) => {
                        return Err(ValidationError::Resolution {
                            host: host.to_string(),
                            message: "lookup timed out".to_string(),
                        })
                    }
                }
            }
            None => return Err(ValidationError::InvalidUrl("URL has no host".to_string())),
        };

        if addrs.is_empty() {
            return Err(ValidationError::Resolution {
                host: host.to_string(),
                message: "no addresses returned".to_string(),
            });
        }

        for addr in addrs {
            if let Some(cidr) = self.policy.blocked_range_for(addr) {
                return Err(ValidationError::BlockedAddress {
                    host: host.to_string(),
                    address: addr.to_string(),
                    cidr: cidr.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Validate `raw` and perform `request` against it
    ///
    /// # Arguments
    ///
    /// * `raw` - Caller-supplied target URL
    /// * `request` - Method, headers and body to send
    ///
    /// # Returns
    ///
    /// The upstream response. Any non-redirect status is returned as-is.
    ///
    /// # Errors
    ///
    /// - `McpGateError::Validation` when the target is rejected
    /// - `McpGateError::Network` on timeout, transport failure or any 3xx
    pub async fn fetch(&self, raw: &str, request: GateRequest) -> Result<reqwest::Response> {
        let url = self.validate(raw).await.map_err(McpGateError::Validation)?;
        let streaming = request.is_streaming();

        tracing::debug!(
            method = %request.method,
            host = url.host_str().unwrap_or_default(),
            streaming,
            "Gate fetch"
        );

        let mut builder = self
            .http
            .request(request.method, url.clone())
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = if streaming {
            let handshake = self.policy.stream_handshake_timeout();
            match tokio::time::timeout(handshake, builder.send()).await {
                Ok(result) => result.map_err(|e| send_error(&url, e))?,
                Err(_) => {
                    return Err(McpGateError::Network(format!(
                        "stream handshake with {} timed out after {}ms",
                        url,
                        handshake.as_millis()
                    ))
                    .into())
                }
            }
        } else {
            builder
                .timeout(self.policy.timeout())
                .send()
                .await
                .map_err(|e| send_error(&url, e))?
        };

        if response.status().is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("<none>")
                .to_string();
            return Err(McpGateError::Network(format!(
                "upstream {} answered HTTP {} redirect to {}; redirects are refused",
                url,
                response.status().as_u16(),
                location
            ))
            .into());
        }

        Ok(response)
    }
}

fn send_error(url: &Url, err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        McpGateError::Network(format!("request to {} timed out", url)).into()
    } else {
        McpGateError::Network(format!("request to {} failed: {}", url, err)).into()
    }
}
