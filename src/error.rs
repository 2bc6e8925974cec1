//! Error types for mcpgate
//!
//! This module defines all error types used throughout the crate, using
//! `thiserror` for ergonomic error handling. Library functions return
//! [`Result`] (an `anyhow` alias) and raise [`McpGateError`] variants; callers
//! that need to branch on a specific condition downcast with
//! `err.downcast_ref::<McpGateError>()`.

use thiserror::Error;

/// Reason a target URL was rejected by the network gate.
///
/// Each variant carries enough detail to tell an operator exactly which
/// allow-list or block-list entry stopped the request.
///
/// # Examples
///
/// ```
/// use mcpgate::error::ValidationError;
///
/// let err = ValidationError::HostNotAllowed("evil.example".to_string());
/// assert_eq!(err.to_string(), "host 'evil.example' is not in the allow-list");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The URL could not be parsed or has no host.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The URL scheme is not an allowed protocol.
    #[error("protocol '{0}' is not allowed")]
    ProtocolNotAllowed(String),

    /// The hostname is not literally present in the allow-list.
    #[error("host '{0}' is not in the allow-list")]
    HostNotAllowed(String),

    /// The effective port is not allowed.
    #[error("port {0} is not allowed")]
    PortNotAllowed(u16),

    /// The host resolved into a blocked network range.
    #[error("host '{host}' resolves to {address}, inside blocked range {cidr}")]
    BlockedAddress {
        /// Hostname from the URL
        host: String,
        /// Resolved address that matched
        address: String,
        /// Blocked range that matched
        cidr: String,
    },

    /// DNS resolution failed or timed out.
    #[error("could not resolve host '{host}': {message}")]
    Resolution {
        /// Hostname from the URL
        host: String,
        /// Resolver failure detail
        message: String,
    },
}

/// Main error type for mcpgate operations
#[derive(Error, Debug)]
pub enum McpGateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Target URL rejected by the network gate
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Outbound request failed after validation (timeout, redirect, transport)
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream answered HTTP 401
    #[error("Unauthorized (WWW-Authenticate: {})", .www_authenticate.as_deref().unwrap_or("<none>"))]
    Unauthorized {
        /// Raw `WWW-Authenticate` header value, if the server sent one
        www_authenticate: Option<String>,
    },

    /// Discovery could not produce usable authorization metadata
    #[error("Discovery degraded: {0}")]
    DiscoveryDegraded(String),

    /// OAuth authorization or token endpoint failure
    #[error("Authorization error: {0}")]
    Auth(String),

    /// Dynamic client registration was rejected
    #[error("Registration failed with HTTP {status}: {body}")]
    Registration {
        /// Upstream HTTP status code
        status: u16,
        /// Upstream response body
        body: String,
    },

    /// Transport-level connect failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// No live session exists for the server identifier
    #[error("Server '{0}' is not connected")]
    NotConnected(String),

    /// Authenticated decryption failed (wrong key or tampered payload)
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// MCP protocol-level errors (bad responses, JSON-RPC errors)
    #[error("MCP error: {0}")]
    Mcp(String),

    /// MCP transport errors (stream closed, send failed)
    #[error("MCP transport error: {0}")]
    McpTransport(String),

    /// MCP request did not complete in time
    #[error("MCP request '{method}' timed out")]
    McpTimeout {
        /// JSON-RPC method that timed out
        method: String,
    },

    /// Server negotiated an unsupported protocol revision
    #[error("MCP protocol version mismatch: expected one of {expected:?}, got {got}")]
    McpProtocolVersion {
        /// Versions this client supports
        expected: Vec<String>,
        /// Version the server selected
        got: String,
    },

    /// Credential storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Result type alias for mcpgate operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = McpGateError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_validation_error_display_carries_reason() {
        let error: McpGateError = ValidationError::PortNotAllowed(22).into();
        assert_eq!(error.to_string(), "Validation error: port 22 is not allowed");
    }

    #[test]
    fn test_blocked_address_display() {
        let error = ValidationError::BlockedAddress {
            host: "intranet".to_string(),
            address: "10.1.2.3".to_string(),
            cidr: "10.0.0.0/8".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "host 'intranet' resolves to 10.1.2.3, inside blocked range 10.0.0.0/8"
        );
    }

    #[test]
    fn test_unauthorized_display_without_header() {
        let error = McpGateError::Unauthorized {
            www_authenticate: None,
        };
        assert_eq!(error.to_string(), "Unauthorized (WWW-Authenticate: <none>)");
    }

    #[test]
    fn test_registration_error_display() {
        let error = McpGateError::Registration {
            status: 400,
            body: "invalid_redirect_uri".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Registration failed with HTTP 400: invalid_redirect_uri"
        );
    }

    #[test]
    fn test_not_connected_display() {
        let error = McpGateError::NotConnected("github".to_string());
        assert_eq!(error.to_string(), "Server 'github' is not connected");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: McpGateError = io_error.into();
        assert!(matches!(error, McpGateError::Io(_)));
    }

    #[test]
    fn test_downcast_from_anyhow() {
        let err: anyhow::Error = McpGateError::Decryption("tag mismatch".to_string()).into();
        assert!(matches!(
            err.downcast_ref::<McpGateError>(),
            Some(McpGateError::Decryption(_))
        ));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<McpGateError>();
    }
}
