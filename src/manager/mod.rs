//! Per-server MCP session registry
//!
//! [`ConnectionManager`] owns the map from server identifier (uti) to live
//! session and drives each server through
//! `connecting -> {success, authenticate, error}`. Every byte it sends goes
//! through the [`NetworkGate`]; a `401` hands control to [`AuthDiscovery`],
//! and tokens obtained afterwards are sealed into the [`CredentialVault`].
//!
//! # Module Layout
//!
//! - [`status`] -- descriptors and status values
//!
//! # Session wiring
//!
//! ```text
//! JsonRpcClient --out_tx--> outbound pump --send()--> Transport
//! Transport --receive()--> inbound pump --in_tx--> read loop --> JsonRpcClient
//! ```
//!
//! Both pumps and the read loop stop when the session's cancellation token
//! fires. A send failure is delivered to the waiting request, so an
//! `Unauthorized` from the transport surfaces from `initialize` unchanged.

pub mod status;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{McpGateError, Result};
use crate::mcp::auth::fallback::ProviderFallbacks;
use crate::mcp::auth::registration::{OAuthNegotiator, RegisteredClient};
use crate::mcp::auth::token::OAuthToken;
use crate::mcp::auth::AuthDiscovery;
use crate::mcp::client::{request_id, start_read_loop, JsonRpcClient};
use crate::mcp::protocol::{InitializedMcpProtocol, McpProtocol, ServerCapabilityFlag};
use crate::mcp::transport::sse::SseTransport;
use crate::mcp::transport::streamable_http::StreamableHttpTransport;
use crate::mcp::transport::Transport;
use crate::mcp::types::{
    CallToolResponse, ClientCapabilities, GetPromptResponse, Implementation, McpTool, Prompt,
    Resource, ResourceContents, ResourceTemplate, ServerCapabilities,
};
use crate::network::gate::NetworkGate;
use crate::vault::credentials::CredentialVault;

pub use status::{ConnectionState, ConnectionStatus, ServerDescriptor, TransportKind};

/// Everything a connected server exposes, in one document.
///
/// This is what [`ConnectionManager::prepare_prompt`] hands to the layer that
/// turns tool lists into model functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSummary {
    /// Server identifier
    pub uti: String,
    /// `serverInfo` from the handshake
    pub server_version: Implementation,
    /// Free-form instructions from the handshake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Advertised capabilities
    pub capabilities: ServerCapabilities,
    /// Tools
    pub tools: Vec<McpTool>,
    /// Prompts
    pub prompts: Vec<Prompt>,
    /// Resources
    pub resources: Vec<Resource>,
    /// Resource templates
    pub resource_templates: Vec<ResourceTemplate>,
}

impl ServerSummary {
    /// No tools, prompts or resources
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.prompts.is_empty() && self.resources.is_empty()
    }
}

/// Outcome of [`ConnectionManager::ping`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    /// Raw `ping` result, normally `{}`
    pub response: serde_json::Value,
    /// Round trip in milliseconds
    pub ping_time_ms: u64,
}

#[derive(Debug)]
struct Session {
    protocol: InitializedMcpProtocol,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
}

#[derive(Debug, Clone)]
struct Entry {
    descriptor: ServerDescriptor,
    status: ConnectionStatus,
}

type InFlight = Shared<BoxFuture<'static, ConnectionStatus>>;

struct Inner {
    gate: NetworkGate,
    vault: CredentialVault,
    negotiator: OAuthNegotiator,
    discovery: AuthDiscovery,
    fallbacks: Arc<ProviderFallbacks>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    entries: RwLock<HashMap<String, Entry>>,
    in_flight: Mutex<HashMap<String, (u64, InFlight)>>,
    /// Current attempt per uti; `close` removes it so stale attempts settle
    /// without touching the registry.
    attempts: Mutex<HashMap<String, u64>>,
    next_attempt: AtomicU64,
}

/// Registry of live MCP sessions keyed by uti.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("gate", &self.inner.gate)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager.
    ///
    /// # Arguments
    ///
    /// * `gate` - Outbound gate for transports, discovery and OAuth calls
    /// * `vault` - Encrypted token storage
    /// * `negotiator` - Registration and code exchange
    /// * `fallbacks` - Provider endpoint table used by discovery
    pub fn new(
        gate: NetworkGate,
        vault: CredentialVault,
        negotiator: OAuthNegotiator,
        fallbacks: Arc<ProviderFallbacks>,
    ) -> Self {
        let discovery = AuthDiscovery::new(gate.clone(), Arc::clone(&fallbacks));
        Self {
            inner: Arc::new(Inner {
                gate,
                vault,
                negotiator,
                discovery,
                fallbacks,
                sessions: RwLock::new(HashMap::new()),
                entries: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                attempts: Mutex::new(HashMap::new()),
                next_attempt: AtomicU64::new(1),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Connect to `descriptor`.
    ///
    /// A stored token is attached as a bearer credential (refreshed first
    /// when it has expired and a refresh token exists). Without one the
    /// attempt is anonymous; a `401` runs discovery and the result is
    /// returned as `authenticate` or `error` without a session.
    ///
    /// A second call for a uti whose attempt is still in flight waits for
    /// that attempt and returns its status. An attempt overtaken by
    /// [`close`](Self::close) reports `error` and leaves no session behind.
    pub async fn connect(&self, descriptor: ServerDescriptor) -> ConnectionStatus {
        let uti = descriptor.uti.clone();
        let attempt = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(&uti) {
                Some((_, existing)) => {
                    tracing::debug!("{}: joining connection attempt in flight", uti);
                    existing.clone()
                }
                None => {
                    let attempt_id = self.begin_attempt(&uti).await;
                    let this = self.clone();
                    let key = uti.clone();
                    let attempt = async move {
                        let status = this.run_connect(descriptor, attempt_id).await;
                        let mut in_flight = this.inner.in_flight.lock().await;
                        if matches!(in_flight.get(&key), Some((id, _)) if *id == attempt_id) {
                            in_flight.remove(&key);
                        }
                        status
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(uti, (attempt_id, attempt.clone()));
                    attempt
                }
            }
        };
        attempt.await
    }

    async fn begin_attempt(&self, uti: &str) -> u64 {
        let attempt = self.inner.next_attempt.fetch_add(1, Ordering::SeqCst);
        self.inner
            .attempts
            .lock()
            .await
            .insert(uti.to_string(), attempt);
        attempt
    }

    async fn run_connect(&self, descriptor: ServerDescriptor, attempt: u64) -> ConnectionStatus {
        let uti = descriptor.uti.clone();
        tracing::info!("{}: connecting to {} ({})", uti, descriptor.uri, descriptor.transport);
        self.drop_session(&uti).await;
        self.record(&descriptor, attempt, ConnectionStatus::connecting())
            .await;

        let bearer = match self.bearer_for(&uti).await {
            Ok(bearer) => bearer,
            Err(e) => {
                tracing::error!("{}: stored credential unusable: {}", uti, e);
                return self
                    .record(&descriptor, attempt, ConnectionStatus::error(e.to_string()))
                    .await;
            }
        };

        let outcome = match self.open_transport(&descriptor, bearer).await {
            Ok(transport) => self.establish(transport).await,
            Err(e) => Err(e),
        };
        self.settle(&descriptor, attempt, outcome).await
    }

    async fn open_transport(
        &self,
        descriptor: &ServerDescriptor,
        bearer: Option<String>,
    ) -> Result<Arc<dyn Transport>> {
        let gate = self.inner.gate.clone();
        let transport: Arc<dyn Transport> = match descriptor.transport {
            TransportKind::StreamableHttp => Arc::new(StreamableHttpTransport::new(
                gate,
                descriptor.uri.as_str(),
                bearer,
            )),
            TransportKind::Sse => {
                Arc::new(SseTransport::connect(gate, &descriptor.uri, bearer).await?)
            }
        };
        Ok(transport)
    }

    /// Wire `transport` to a JSON-RPC client and run the handshake.
    async fn establish(&self, transport: Arc<dyn Transport>) -> Result<Session> {
        let cancel = CancellationToken::new();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
        let client = JsonRpcClient::new(out_tx);
        start_read_loop(in_rx, cancel.clone(), client.clone());

        {
            let transport = Arc::clone(&transport);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut inbound = transport.receive();
                loop {
                    let message = tokio::select! {
                        _ = cancel.cancelled() => break,
                        message = inbound.next() => message,
                    };
                    match message {
                        Some(message) => {
                            if in_tx.send(message).is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            });
        }

        {
            let transport = Arc::clone(&transport);
            let cancel = cancel.clone();
            let client = client.clone();
            tokio::spawn(async move {
                loop {
                    let message = tokio::select! {
                        _ = cancel.cancelled() => break,
                        message = out_rx.recv() => match message {
                            Some(message) => message,
                            None => break,
                        },
                    };
                    let id = request_id(&message);
                    if let Err(e) = transport.send(message).await {
                        match id {
                            Some(id) => {
                                client.fail_request(id, e).await;
                            }
                            None => tracing::warn!("MCP notification not delivered: {}", e),
                        }
                    }
                }
            });
        }

        let handshake = McpProtocol::new(client)
            .initialize(
                Implementation::mcpgate(),
                ClientCapabilities::default(),
                Some(self.inner.gate.policy().timeout()),
            )
            .await;

        match handshake {
            Ok(protocol) => Ok(Session {
                protocol,
                transport,
                cancel,
            }),
            Err(e) => {
                cancel.cancel();
                if let Err(close_err) = transport.close().await {
                    tracing::debug!("transport close after failed handshake: {}", close_err);
                }
                Err(e)
            }
        }
    }

    async fn settle(
        &self,
        descriptor: &ServerDescriptor,
        attempt: u64,
        outcome: Result<Session>,
    ) -> ConnectionStatus {
        let uti = descriptor.uti.as_str();
        let status = match outcome {
            Ok(session) => {
                let attempts = self.inner.attempts.lock().await;
                if attempts.get(uti) != Some(&attempt) {
                    drop(attempts);
                    tracing::info!("{}: closed while connecting, discarding session", uti);
                    session.cancel.cancel();
                    if let Err(e) = session.transport.close().await {
                        tracing::debug!("{}: transport close failed: {}", uti, e);
                    }
                    return Self::closed_status(uti);
                }
                let server = &session.protocol.initialize_response.server_info;
                tracing::info!(
                    "{}: connected to {} {} (protocol {})",
                    uti,
                    server.name,
                    server.version,
                    session.protocol.initialize_response.protocol_version
                );
                self.inner
                    .sessions
                    .write()
                    .await
                    .insert(uti.to_string(), Arc::new(session));
                drop(attempts);
                ConnectionStatus::success()
            }
            Err(e) => match e.downcast_ref::<McpGateError>() {
                Some(McpGateError::Unauthorized { www_authenticate }) => {
                    tracing::info!("{}: server requires authorization", uti);
                    self.inner
                        .discovery
                        .discover(descriptor, www_authenticate.as_deref())
                        .await
                }
                _ => {
                    tracing::warn!("{}: connection failed: {:#}", uti, e);
                    ConnectionStatus::error(McpGateError::Connection(format!("{:#}", e)).to_string())
                }
            },
        };
        self.record(descriptor, attempt, status).await
    }

    /// Store `status` unless `attempt` has been closed in the meantime.
    async fn record(
        &self,
        descriptor: &ServerDescriptor,
        attempt: u64,
        status: ConnectionStatus,
    ) -> ConnectionStatus {
        let attempts = self.inner.attempts.lock().await;
        if attempts.get(&descriptor.uti) != Some(&attempt) {
            return Self::closed_status(&descriptor.uti);
        }
        self.inner.entries.write().await.insert(
            descriptor.uti.clone(),
            Entry {
                descriptor: descriptor.clone(),
                status: status.clone(),
            },
        );
        status
    }

    fn closed_status(uti: &str) -> ConnectionStatus {
        ConnectionStatus::error(
            McpGateError::Connection(format!("'{uti}' was closed while connecting")).to_string(),
        )
    }

    async fn bearer_for(&self, uti: &str) -> Result<Option<String>> {
        let Some(token) = self.inner.vault.load_token(uti).await? else {
            return Ok(None);
        };
        if !token.is_expired() {
            return Ok(Some(token.access_token));
        }

        let Some(refresh) = token.refresh_token.as_deref() else {
            tracing::info!("{}: stored token expired, connecting without it", uti);
            return Ok(None);
        };
        match self.inner.negotiator.refresh(uti, refresh).await {
            Ok(mut fresh) => {
                if fresh.refresh_token.is_none() {
                    fresh.refresh_token = token.refresh_token.clone();
                }
                self.inner.vault.save_token(uti, &fresh).await?;
                tracing::info!("{}: refreshed access token", uti);
                Ok(Some(fresh.access_token))
            }
            Err(e) => {
                tracing::warn!("{}: token refresh failed: {}", uti, e);
                Ok(None)
            }
        }
    }

    /// Last recorded status for `uti`
    pub async fn status(&self, uti: &str) -> Option<ConnectionStatus> {
        self.inner
            .entries
            .read()
            .await
            .get(uti)
            .map(|entry| entry.status.clone())
    }

    /// Identifiers with a live session, sorted
    pub async fn connected(&self) -> Vec<String> {
        let mut utis: Vec<String> = self.inner.sessions.read().await.keys().cloned().collect();
        utis.sort();
        utis
    }

    /// Tear down the session for `uti` and forget its status.
    ///
    /// An attempt still in flight is abandoned: it finishes on its own but
    /// its session is closed instead of registered. Closing an unknown uti
    /// is a no-op.
    pub async fn close(&self, uti: &str) -> Result<()> {
        if self.inner.in_flight.lock().await.remove(uti).is_some() {
            tracing::debug!("{}: abandoning connection attempt in flight", uti);
        }
        self.inner.attempts.lock().await.remove(uti);
        self.drop_session(uti).await;
        self.inner.entries.write().await.remove(uti);
        Ok(())
    }

    /// Close every session
    pub async fn close_all(&self) -> Result<()> {
        let mut utis: Vec<String> = {
            let entries = self.inner.entries.read().await;
            let sessions = self.inner.sessions.read().await;
            entries.keys().chain(sessions.keys()).cloned().collect()
        };
        utis.extend(self.inner.in_flight.lock().await.keys().cloned());
        utis.sort();
        utis.dedup();
        for uti in utis {
            self.close(&uti).await?;
        }
        Ok(())
    }

    async fn drop_session(&self, uti: &str) {
        let Some(session) = self.inner.sessions.write().await.remove(uti) else {
            return;
        };
        session.cancel.cancel();
        if let Err(e) = session.transport.close().await {
            tracing::debug!("{}: transport close failed: {}", uti, e);
        }
        tracing::info!("{}: session closed", uti);
    }

    // -----------------------------------------------------------------------
    // Authorization
    // -----------------------------------------------------------------------

    /// Build the URL the user must visit to authorize `uti`.
    ///
    /// Descriptors carrying an authorization hint redirect straight to the
    /// hint's URL. Otherwise a stored client is used when there is one, the
    /// server's registration endpoint when offered, and finally the provider
    /// table's pre-registered client id.
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Auth` when `uti` is not waiting for
    /// authorization or no client id can be obtained, and registration
    /// errors unchanged.
    pub async fn authorization_url(&self, uti: &str) -> Result<String> {
        let entry = self
            .inner
            .entries
            .read()
            .await
            .get(uti)
            .cloned()
            .ok_or_else(|| McpGateError::Auth(format!("no authorization pending for '{uti}'")))?;
        if entry.status.state != ConnectionState::Authenticate {
            return Err(McpGateError::Auth(format!(
                "'{}' is {}, not waiting for authorization",
                uti, entry.status.state
            ))
            .into());
        }
        let metadata = entry.status.remote_auth_server_metadata.ok_or_else(|| {
            McpGateError::Auth(format!("no authorization server metadata for '{uti}'"))
        })?;

        let client = match self.inner.negotiator.registered_client(uti).await? {
            Some(client) => Some(client),
            None if metadata.registration_endpoint.is_none() => self
                .inner
                .fallbacks
                .get(&entry.descriptor.auth_provider)
                .and_then(|endpoints| endpoints.client_id.clone())
                .map(|client_id| RegisteredClient {
                    client_id,
                    client_secret: None,
                    token_endpoint: None,
                }),
            None => None,
        };

        if let Some(hint) = &entry.descriptor.auth_metadata_hint {
            return self
                .inner
                .negotiator
                .direct_authorization(uti, hint, client)
                .await;
        }
        self.inner.negotiator.negotiate(uti, &metadata, client).await
    }

    /// Finish authorization for `uti` with the redirect's `code`, store the
    /// token and reconnect.
    ///
    /// # Errors
    ///
    /// Code exchange and storage failures. The reconnect itself reports
    /// through the returned status.
    pub async fn complete_authorization(&self, uti: &str, code: &str) -> Result<ConnectionStatus> {
        let descriptor = self
            .inner
            .entries
            .read()
            .await
            .get(uti)
            .map(|entry| entry.descriptor.clone())
            .ok_or_else(|| McpGateError::Auth(format!("unknown server '{uti}'")))?;

        let token = self.inner.negotiator.exchange_code(uti, code).await?;
        self.inner.vault.save_token(uti, &token).await?;
        tracing::info!("{}: authorization complete, reconnecting", uti);
        Ok(self.connect(descriptor).await)
    }

    /// Store a token obtained elsewhere; the next `connect` uses it
    pub async fn store_token(&self, uti: &str, token: &OAuthToken) -> Result<()> {
        self.inner.vault.save_token(uti, token).await
    }

    /// Forget the stored token for `uti`
    pub async fn forget_token(&self, uti: &str) -> Result<()> {
        self.inner.vault.delete_token(uti).await
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    async fn session(&self, uti: &str) -> Result<Arc<Session>> {
        self.inner
            .sessions
            .read()
            .await
            .get(uti)
            .cloned()
            .ok_or_else(|| McpGateError::NotConnected(uti.to_string()).into())
    }

    /// Tools offered by `uti`; empty when the server has no tools capability
    ///
    /// # Errors
    ///
    /// `McpGateError::NotConnected` when no session exists for `uti`.
    pub async fn list_tools(&self, uti: &str) -> Result<Vec<McpTool>> {
        let session = self.session(uti).await?;
        if !session.protocol.capable(ServerCapabilityFlag::Tools) {
            return Ok(Vec::new());
        }
        session.protocol.list_tools().await
    }

    /// Prompts offered by `uti`
    pub async fn list_prompts(&self, uti: &str) -> Result<Vec<Prompt>> {
        let session = self.session(uti).await?;
        if !session.protocol.capable(ServerCapabilityFlag::Prompts) {
            return Ok(Vec::new());
        }
        session.protocol.list_prompts().await
    }

    /// Resources offered by `uti`
    pub async fn list_resources(&self, uti: &str) -> Result<Vec<Resource>> {
        let session = self.session(uti).await?;
        if !session.protocol.capable(ServerCapabilityFlag::Resources) {
            return Ok(Vec::new());
        }
        session.protocol.list_resources().await
    }

    /// Resource templates offered by `uti`
    pub async fn list_resource_templates(&self, uti: &str) -> Result<Vec<ResourceTemplate>> {
        let session = self.session(uti).await?;
        if !session.protocol.capable(ServerCapabilityFlag::Resources) {
            return Ok(Vec::new());
        }
        session.protocol.list_resource_templates().await
    }

    /// Capabilities from the handshake
    pub async fn get_server_capabilities(&self, uti: &str) -> Result<ServerCapabilities> {
        let session = self.session(uti).await?;
        Ok(session.protocol.initialize_response.capabilities.clone())
    }

    /// Instructions from the handshake
    pub async fn get_server_instructions(&self, uti: &str) -> Result<Option<String>> {
        let session = self.session(uti).await?;
        Ok(session.protocol.initialize_response.instructions.clone())
    }

    /// `serverInfo` from the handshake
    pub async fn get_server_version(&self, uti: &str) -> Result<Implementation> {
        let session = self.session(uti).await?;
        Ok(session.protocol.initialize_response.server_info.clone())
    }

    /// Everything `uti` exposes, gathered concurrently
    pub async fn get_structured_json(&self, uti: &str) -> Result<ServerSummary> {
        let (server_version, instructions, capabilities) = (
            self.get_server_version(uti).await?,
            self.get_server_instructions(uti).await?,
            self.get_server_capabilities(uti).await?,
        );
        let (tools, prompts, resources, resource_templates) = tokio::try_join!(
            self.list_tools(uti),
            self.list_prompts(uti),
            self.list_resources(uti),
            self.list_resource_templates(uti),
        )?;
        Ok(ServerSummary {
            uti: uti.to_string(),
            server_version,
            instructions,
            capabilities,
            tools,
            prompts,
            resources,
            resource_templates,
        })
    }

    /// Summaries of every connected server that exposes anything.
    ///
    /// Servers that fail to answer are logged and skipped.
    pub async fn prepare_prompt(&self) -> Vec<ServerSummary> {
        let mut summaries = Vec::new();
        for uti in self.connected().await {
            match self.get_structured_json(&uti).await {
                Ok(summary) if summary.is_empty() => {
                    tracing::debug!("{}: nothing to offer, skipped", uti)
                }
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::warn!("{}: summary failed: {}", uti, e),
            }
        }
        summaries
    }

    /// Round-trip a `ping`
    pub async fn ping(&self, uti: &str) -> Result<PingResult> {
        let session = self.session(uti).await?;
        let started = Instant::now();
        let response = session.protocol.ping().await?;
        let ping_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!("{}: ping {} ms", uti, ping_time_ms);
        Ok(PingResult {
            response,
            ping_time_ms,
        })
    }

    // -----------------------------------------------------------------------
    // Invocation
    // -----------------------------------------------------------------------

    /// Call tool `name` on `uti`
    pub async fn call_tool(
        &self,
        uti: &str,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResponse> {
        let session = self.session(uti).await?;
        session.protocol.call_tool(name, arguments).await
    }

    /// Read resource `uri` from `uti`
    pub async fn read_resource(&self, uti: &str, uri: &str) -> Result<Vec<ResourceContents>> {
        let session = self.session(uti).await?;
        session.protocol.read_resource(uri).await
    }

    /// Render prompt `name` on `uti`
    pub async fn get_prompt(
        &self,
        uti: &str,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<GetPromptResponse> {
        let session = self.session(uti).await?;
        session.protocol.get_prompt(name, arguments).await
    }
}
