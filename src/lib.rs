//! mcpgate - MCP client runtime library
//!
//! This library connects an application to remote Model Context Protocol
//! servers, negotiates OAuth with them when required, and sends every
//! outbound request through an SSRF-hardened gate.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `network`: outbound policy, the gate, and the HTTP proxy routes
//! - `vault`: token encryption and encrypted credential storage
//! - `store`: pluggable key-value credential stores
//! - `mcp`: MCP wire types, JSON-RPC client, transports and OAuth
//! - `manager`: per-server connection lifecycle and introspection
//! - `server`: axum application for the proxy and OAuth callback
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use mcpgate::manager::ServerDescriptor;
//! use mcpgate::server::AppState;
//! use mcpgate::vault::TokenVault;
//! use mcpgate::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let state = AppState::from_config(&config, TokenVault::client(), None)?;
//!     let status = state
//!         .manager
//!         .connect(ServerDescriptor::new("local", "http://localhost:8081/mcp"))
//!         .await;
//!     println!("{}", status.state);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod manager;
pub mod mcp;
pub mod network;
pub mod server;
pub mod store;
pub mod vault;

// Re-export commonly used types
pub use config::Config;
pub use error::{McpGateError, Result, ValidationError};
pub use manager::{ConnectionManager, ConnectionState, ConnectionStatus, ServerDescriptor};
pub use network::{NetworkGate, NetworkPolicy};
