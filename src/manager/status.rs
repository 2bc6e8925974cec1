//! Server descriptors and connection status values

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::McpGateError;
use crate::mcp::auth::metadata::{
    AuthMetadataHint, AuthorizationServerMetadata, ProtectedResourceMetadata,
};

/// Wire transport used to reach an MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Legacy HTTP+SSE: persistent event stream plus a POST endpoint
    Sse,
    /// Streamable HTTP: POST per message, `mcp-session-id` correlation
    StreamableHttp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Sse => write!(f, "sse"),
            TransportKind::StreamableHttp => write!(f, "streamable_http"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = McpGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sse" => Ok(TransportKind::Sse),
            "streamable_http" | "http" => Ok(TransportKind::StreamableHttp),
            other => Err(McpGateError::Config(format!(
                "Unknown transport '{}'. Must be one of: sse, streamable_http",
                other
            ))),
        }
    }
}

/// Everything needed to reach one logical MCP server.
///
/// Owned by the caller; the connection manager keeps a copy per session.
///
/// # Examples
///
/// ```
/// use mcpgate::manager::{ServerDescriptor, TransportKind};
///
/// let desc = ServerDescriptor::new("github", "https://mcp.example.com/mcp")
///     .with_transport(TransportKind::Sse)
///     .with_auth_provider("github");
/// assert_eq!(desc.uti, "github");
/// assert!(desc.auth_metadata_hint.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Caller-assigned logical server identifier
    pub uti: String,
    /// Transport to use
    pub transport: TransportKind,
    /// MCP endpoint URL
    pub uri: String,
    /// Known authorization endpoints; skips discovery when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_metadata_hint: Option<AuthMetadataHint>,
    /// Provider name used for the fallback endpoint table
    #[serde(default)]
    pub auth_provider: String,
}

impl ServerDescriptor {
    /// Streamable HTTP descriptor with no hint and no provider
    pub fn new(uti: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            uti: uti.into(),
            transport: TransportKind::StreamableHttp,
            uri: uri.into(),
            auth_metadata_hint: None,
            auth_provider: String::new(),
        }
    }

    /// Set the transport
    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Set the fallback provider name
    pub fn with_auth_provider(mut self, provider: impl Into<String>) -> Self {
        self.auth_provider = provider.into();
        self
    }

    /// Set the authorization hint
    pub fn with_auth_hint(mut self, hint: AuthMetadataHint) -> Self {
        self.auth_metadata_hint = Some(hint);
        self
    }
}

/// Position in the per-server state machine.
///
/// `connecting -> {success, authenticate, error}`; `authenticate -> connecting`
/// once a credential is supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Attempt in flight
    Connecting,
    /// Session established
    Success,
    /// Server requires a credential the caller must obtain
    Authenticate,
    /// Connection or discovery failed
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Success => "success",
            ConnectionState::Authenticate => "authenticate",
            ConnectionState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Result of a connection attempt or discovery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// State machine position
    pub state: ConnectionState,
    /// Protected resource metadata captured during discovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_metadata: Option<ProtectedResourceMetadata>,
    /// Authorization server metadata captured during discovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_auth_server_metadata: Option<AuthorizationServerMetadata>,
    /// Human-readable failure reason for `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionStatus {
    /// A status with no metadata
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state,
            remote_metadata: None,
            remote_auth_server_metadata: None,
            error: None,
        }
    }

    /// `connecting`
    pub fn connecting() -> Self {
        Self::new(ConnectionState::Connecting)
    }

    /// `success`
    pub fn success() -> Self {
        Self::new(ConnectionState::Success)
    }

    /// `error` with a reason
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(ConnectionState::Error)
        }
    }

    /// Whether the state is `success`
    pub fn is_success(&self) -> bool {
        self.state == ConnectionState::Success
    }
}
