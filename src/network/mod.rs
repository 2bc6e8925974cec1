//! Outbound network boundary
//!
//! # Module Layout
//!
//! - [`policy`] -- allow-lists, blocked ranges and timeouts
//! - [`gate`]   -- validation and the only place requests are sent from
//! - [`proxy`]  -- axum routes exposing the gate over HTTP

pub mod gate;
pub mod policy;
pub mod proxy;

pub use gate::{GateRequest, NetworkGate};
pub use policy::NetworkPolicy;
