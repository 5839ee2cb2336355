//! OpenStack-style compute backend for skiff
//!
//! Talks Keystone v2 password auth and the Nova compute API over
//! reqwest. Authentication is lazy: the first gateway call obtains a
//! token and the compute endpoint from the service catalog, and the
//! session is reused for the lifetime of the gateway.

pub mod auth;
pub mod client;
pub mod gateway;

pub use client::OpenStackCredentials;
pub use gateway::OpenStackGateway;
