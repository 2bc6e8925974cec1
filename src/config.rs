//! Configuration management for mcpgate
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.
//! The only security-relevant knobs are the network allow/block lists; the
//! vault secret is read from the environment and never from a file.

use crate::cli::{Cli, Commands};
use crate::error::{McpGateError, Result};
use crate::mcp::auth::fallback::ProviderEndpoints;
use crate::network::policy::{CidrBlock, DEFAULT_BLOCKED_CIDRS, LOOPBACK_NAMES};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Main configuration structure for mcpgate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Outbound network policy
    #[serde(default)]
    pub network: NetworkConfig,
    /// Proxy/callback HTTP server
    #[serde(default)]
    pub server: ServerConfig,
    /// OAuth client settings
    #[serde(default)]
    pub oauth: OAuthConfig,
    /// Credential storage backend
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Outbound network policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Hosts that may be contacted (exact match)
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// Ports that may be contacted
    #[serde(default = "default_allowed_ports")]
    pub allowed_ports: Vec<u16>,

    /// URL schemes that may be used
    #[serde(default = "default_allowed_protocols")]
    pub allowed_protocols: Vec<String>,

    /// Address ranges that are never reachable
    #[serde(default = "default_blocked_cidrs")]
    pub blocked_cidrs: Vec<String>,

    /// Kept for compatibility; redirects are never followed
    #[serde(default)]
    pub max_redirects: u32,

    /// End-to-end timeout for non-streaming requests
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Time allowed for a streaming response's headers to arrive
    #[serde(default = "default_stream_handshake_timeout_ms")]
    pub stream_handshake_timeout_ms: u64,
}

fn default_allowed_hosts() -> Vec<String> {
    LOOPBACK_NAMES.iter().map(|h| h.to_string()).collect()
}

fn default_allowed_ports() -> Vec<u16> {
    vec![80, 443]
}

fn default_allowed_protocols() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

fn default_blocked_cidrs() -> Vec<String> {
    DEFAULT_BLOCKED_CIDRS.iter().map(|c| c.to_string()).collect()
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_stream_handshake_timeout_ms() -> u64 {
    1_000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: default_allowed_hosts(),
            allowed_ports: default_allowed_ports(),
            allowed_protocols: default_allowed_protocols(),
            blocked_cidrs: default_blocked_cidrs(),
            max_redirects: 0,
            timeout_ms: default_timeout_ms(),
            stream_handshake_timeout_ms: default_stream_handshake_timeout_ms(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the proxy and callback listen on
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_bind_address() -> String {
    "127.0.0.1:3001".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// OAuth client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// `client_name` sent in dynamic registration
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Redirect URI registered with authorization servers
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Scope requested during authorization
    #[serde(default)]
    pub scope: Option<String>,

    /// Extra provider endpoints, merged over the built-in table
    #[serde(default)]
    pub providers: HashMap<String, ProviderEndpoints>,
}

fn default_client_name() -> String {
    "mcpgate".to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:3001/callback/mcp/oauth".to_string()
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            redirect_uri: default_redirect_uri(),
            scope: None,
            providers: HashMap::new(),
        }
    }
}

/// Credential store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process memory; lost on exit
    #[default]
    Memory,
    /// Embedded sled database
    Sled,
    /// OS keyring
    Keyring,
}

impl std::str::FromStr for StorageBackend {
    type Err = McpGateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "sled" => Ok(StorageBackend::Sled),
            "keyring" => Ok(StorageBackend::Keyring),
            other => Err(McpGateError::Config(format!(
                "Invalid storage backend: {}. Must be one of: memory, sled, keyring",
                other
            ))),
        }
    }
}

/// Credential storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend to use
    #[serde(default)]
    pub backend: StorageBackend,

    /// sled directory; defaults to the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| McpGateError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| McpGateError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(hosts) = std::env::var("MCPGATE_ALLOWED_HOSTS") {
            self.network.allowed_hosts = split_list(&hosts);
        }

        if let Ok(ports) = std::env::var("MCPGATE_ALLOWED_PORTS") {
            let parsed: std::result::Result<Vec<u16>, _> =
                split_list(&ports).iter().map(|p| p.parse::<u16>()).collect();
            match parsed {
                Ok(ports) => self.network.allowed_ports = ports,
                Err(e) => tracing::warn!("Ignoring MCPGATE_ALLOWED_PORTS: {}", e),
            }
        }

        if let Ok(cidrs) = std::env::var("MCPGATE_BLOCKED_CIDRS") {
            self.network.blocked_cidrs = split_list(&cidrs);
        }

        if let Ok(timeout) = std::env::var("MCPGATE_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(ms) => self.network.timeout_ms = ms,
                Err(e) => tracing::warn!("Ignoring MCPGATE_TIMEOUT_MS: {}", e),
            }
        }

        if let Ok(bind) = std::env::var("MCPGATE_BIND_ADDRESS") {
            self.server.bind_address = bind;
        }

        if let Ok(redirect) = std::env::var("MCPGATE_REDIRECT_URI") {
            self.oauth.redirect_uri = redirect;
        }

        if let Ok(backend) = std::env::var("MCPGATE_STORAGE_BACKEND") {
            match backend.parse() {
                Ok(backend) => self.storage.backend = backend,
                Err(e) => tracing::warn!("Ignoring MCPGATE_STORAGE_BACKEND: {}", e),
            }
        }

        if let Ok(path) = std::env::var("MCPGATE_STORAGE_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        for host in &cli.allow_host {
            if !self.network.allowed_hosts.contains(host) {
                self.network.allowed_hosts.push(host.clone());
            }
        }
        for port in &cli.allow_port {
            if !self.network.allowed_ports.contains(port) {
                self.network.allowed_ports.push(*port);
            }
        }

        if let Commands::Serve {
            bind: Some(bind), ..
        } = &cli.command
        {
            self.server.bind_address = bind.clone();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `McpGateError::Config` naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.network.allowed_hosts.is_empty() {
            return Err(
                McpGateError::Config("network.allowed_hosts cannot be empty".to_string()).into(),
            );
        }

        if self.network.allowed_ports.is_empty() {
            return Err(
                McpGateError::Config("network.allowed_ports cannot be empty".to_string()).into(),
            );
        }

        if self.network.allowed_protocols.is_empty() {
            return Err(McpGateError::Config(
                "network.allowed_protocols cannot be empty".to_string(),
            )
            .into());
        }

        for cidr in &self.network.blocked_cidrs {
            cidr.parse::<CidrBlock>()?;
        }

        if self.network.timeout_ms == 0 {
            return Err(McpGateError::Config(
                "network.timeout_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.network.stream_handshake_timeout_ms == 0 {
            return Err(McpGateError::Config(
                "network.stream_handshake_timeout_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(McpGateError::Config(format!(
                "Invalid server.bind_address: {}",
                self.server.bind_address
            ))
            .into());
        }

        match url::Url::parse(&self.oauth.redirect_uri) {
            Ok(url) if url.has_host() => {}
            _ => {
                return Err(McpGateError::Config(format!(
                    "oauth.redirect_uri must be an absolute URL: {}",
                    self.oauth.redirect_uri
                ))
                .into())
            }
        }

        if self.oauth.client_name.trim().is_empty() {
            return Err(
                McpGateError::Config("oauth.client_name cannot be empty".to_string()).into(),
            );
        }

        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
