//! MCP OAuth 2.1 authorization
//!
//! Authorization applies to the HTTP transports only. A `401` from an MCP
//! server starts discovery; a successful discovery yields metadata the
//! negotiator turns into an authorization URL; the redirect's code is
//! exchanged for a token that the vault stores encrypted per server.
//!
//! # Module Layout
//!
//! - [`discovery`]    -- `401` handling, RFC 9728 / RFC 8414 discovery
//! - [`fallback`]     -- built-in provider endpoint table
//! - [`metadata`]     -- typed discovery documents and caller hints
//! - [`pkce`]         -- PKCE `S256` verifier/challenge generation
//! - [`registration`] -- dynamic client registration and authorization URLs
//! - [`token`]        -- token shape and token endpoint grants

pub mod discovery;
pub mod fallback;
pub mod metadata;
pub mod pkce;
pub mod registration;
pub mod token;

pub use discovery::AuthDiscovery;
pub use fallback::{ProviderEndpoints, ProviderFallbacks};
pub use metadata::{AuthMetadataHint, AuthorizationServerMetadata, ProtectedResourceMetadata};
pub use registration::{OAuthClientRegistration, OAuthNegotiator, RegisteredClient};
pub use token::OAuthToken;
