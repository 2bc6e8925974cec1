//! Typed MCP lifecycle over [`JsonRpcClient`]
//!
//! - [`McpProtocol`] is an uninitialized session. [`McpProtocol::initialize`]
//!   performs the `initialize` / `notifications/initialized` handshake and
//!   yields an [`InitializedMcpProtocol`].
//! - [`InitializedMcpProtocol`] exposes the typed methods the connection
//!   manager needs. The `*/list` methods follow `nextCursor` until the server
//!   stops returning one.

use std::collections::HashMap;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::{McpGateError, Result};
use crate::mcp::client::JsonRpcClient;
use crate::mcp::types::{
    CallToolParams, CallToolResponse, ClientCapabilities, GetPromptParams, GetPromptResponse,
    Implementation, InitializeParams, InitializeResponse, ListPromptsResponse,
    ListResourceTemplatesResponse, ListResourcesResponse, ListToolsResponse, McpTool,
    PaginatedParams, Prompt, ReadResourceParams, ReadResourceResponse, Resource,
    ResourceContents, ResourceTemplate, LATEST_PROTOCOL_VERSION, METHOD_INITIALIZE,
    METHOD_INITIALIZED, METHOD_PING, METHOD_PROMPTS_GET, METHOD_PROMPTS_LIST,
    METHOD_RESOURCES_LIST, METHOD_RESOURCES_READ, METHOD_RESOURCES_TEMPLATES_LIST,
    METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, SUPPORTED_PROTOCOL_VERSIONS,
};

/// Upper bound on pages fetched for one list call.
const MAX_PAGES: usize = 64;

/// Server capability selector for [`InitializedMcpProtocol::capable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCapabilityFlag {
    /// `tools/*`
    Tools,
    /// `resources/*`
    Resources,
    /// `prompts/*`
    Prompts,
}

/// An MCP session before the handshake.
#[derive(Debug)]
pub struct McpProtocol {
    client: JsonRpcClient,
}

impl McpProtocol {
    /// Wrap a client whose read loop is already running
    pub fn new(client: JsonRpcClient) -> Self {
        Self { client }
    }

    /// Perform the handshake.
    ///
    /// # Errors
    ///
    /// - `McpGateError::McpProtocolVersion` when the server picks a revision
    ///   outside [`SUPPORTED_PROTOCOL_VERSIONS`]
    /// - any request error, including transport failures such as
    ///   `McpGateError::Unauthorized`
    pub async fn initialize(
        self,
        client_info: Implementation,
        capabilities: ClientCapabilities,
        timeout: Option<Duration>,
    ) -> Result<InitializedMcpProtocol> {
        let response: InitializeResponse = self
            .client
            .request(
                METHOD_INITIALIZE,
                InitializeParams {
                    protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
                    capabilities,
                    client_info,
                },
                timeout,
            )
            .await?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&response.protocol_version.as_str()) {
            return Err(McpGateError::McpProtocolVersion {
                expected: SUPPORTED_PROTOCOL_VERSIONS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                got: response.protocol_version,
            }
            .into());
        }

        if let Err(e) = self.client.notify(METHOD_INITIALIZED, serde_json::json!({})) {
            tracing::debug!("initialized notification not sent: {e}");
        }

        Ok(InitializedMcpProtocol {
            client: self.client,
            initialize_response: response,
        })
    }
}

/// A negotiated MCP session.
#[derive(Debug, Clone)]
pub struct InitializedMcpProtocol {
    /// Underlying client
    pub client: JsonRpcClient,
    /// What the server answered to `initialize`
    pub initialize_response: InitializeResponse,
}

/// Page shape shared by the list responses.
trait Page: DeserializeOwned {
    type Item;
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

impl Page for ListToolsResponse {
    type Item = McpTool;
    fn into_parts(self) -> (Vec<McpTool>, Option<String>) {
        (self.tools, self.next_cursor)
    }
}

impl Page for ListPromptsResponse {
    type Item = Prompt;
    fn into_parts(self) -> (Vec<Prompt>, Option<String>) {
        (self.prompts, self.next_cursor)
    }
}

impl Page for ListResourcesResponse {
    type Item = Resource;
    fn into_parts(self) -> (Vec<Resource>, Option<String>) {
        (self.resources, self.next_cursor)
    }
}

impl Page for ListResourceTemplatesResponse {
    type Item = ResourceTemplate;
    fn into_parts(self) -> (Vec<ResourceTemplate>, Option<String>) {
        (self.resource_templates, self.next_cursor)
    }
}

impl InitializedMcpProtocol {
    /// Whether the server advertised `capability`
    pub fn capable(&self, capability: ServerCapabilityFlag) -> bool {
        let caps = &self.initialize_response.capabilities;
        match capability {
            ServerCapabilityFlag::Tools => caps.tools.is_some(),
            ServerCapabilityFlag::Resources => caps.resources.is_some(),
            ServerCapabilityFlag::Prompts => caps.prompts.is_some(),
        }
    }

    async fn list_all<P: Page>(&self, method: &str) -> Result<Vec<P::Item>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let page: P = self
                .client
                .request(method, PaginatedParams { cursor }, None)
                .await?;
            let (batch, next) = page.into_parts();
            items.extend(batch);

            match next {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => return Ok(items),
            }
        }

        tracing::warn!("{method}: stopped after {MAX_PAGES} pages");
        Ok(items)
    }

    /// All tools
    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        self.list_all::<ListToolsResponse>(METHOD_TOOLS_LIST).await
    }

    /// All prompts
    pub async fn list_prompts(&self) -> Result<Vec<Prompt>> {
        self.list_all::<ListPromptsResponse>(METHOD_PROMPTS_LIST)
            .await
    }

    /// All resources
    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        self.list_all::<ListResourcesResponse>(METHOD_RESOURCES_LIST)
            .await
    }

    /// All resource templates
    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>> {
        self.list_all::<ListResourceTemplatesResponse>(METHOD_RESOURCES_TEMPLATES_LIST)
            .await
    }

    /// Invoke tool `name`
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResponse> {
        self.client
            .request(
                METHOD_TOOLS_CALL,
                CallToolParams {
                    name: name.to_string(),
                    arguments,
                },
                None,
            )
            .await
    }

    /// Read resource `uri`
    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>> {
        let resp: ReadResourceResponse = self
            .client
            .request(
                METHOD_RESOURCES_READ,
                ReadResourceParams {
                    uri: uri.to_string(),
                },
                None,
            )
            .await?;
        Ok(resp.contents)
    }

    /// Render prompt `name`
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<GetPromptResponse> {
        self.client
            .request(
                METHOD_PROMPTS_GET,
                GetPromptParams {
                    name: name.to_string(),
                    arguments,
                },
                None,
            )
            .await
    }

    /// Send `ping` and return the raw result (normally `{}`)
    pub async fn ping(&self) -> Result<serde_json::Value> {
        self.client
            .request(METHOD_PING, serde_json::json!({}), None)
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
