//! MCP client support
//!
//! Targets protocol revision **2025-11-25** and accepts the earlier revisions
//! listed in [`types::SUPPORTED_PROTOCOL_VERSIONS`] from servers.
//!
//! # Module Layout
//!
//! - `types`     -- MCP wire types and JSON-RPC primitives
//! - `client`    -- transport-agnostic async JSON-RPC 2.0 client
//! - `protocol`  -- typed lifecycle wrapper over `JsonRpcClient`
//! - `transport` -- `Transport` trait, streamable HTTP and legacy SSE
//! - `auth`      -- OAuth discovery, registration and tokens

pub mod auth;
pub mod client;
pub mod protocol;
pub mod transport;
pub mod types;

pub use types::*;
