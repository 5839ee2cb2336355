//! Cloud gateway abstraction for skiff
//!
//! This crate defines the capability surface skiff needs from an IaaS
//! backend, plus the two primitives every backend interaction is built
//! from:
//!
//! - [`CloudGateway`]: one trait covering instances, floating IPs,
//!   security groups, keypairs, images and flavors. Backends
//!   (OpenStack-style, EC2-style) implement it; the lifecycle controller
//!   never branches on which one it is talking to.
//! - [`fault`]: classification of backend faults — "not found" becomes
//!   an absent value, rate limits get a single hinted retry, duplicate
//!   creations of idempotent resources are swallowed.
//! - [`poll`]: a bounded sleep-and-repoll primitive for asynchronous
//!   cloud state transitions.

pub mod error;
pub mod fault;
pub mod gateway;
pub mod poll;
pub mod types;

// Re-exports
pub use error::{CloudError, Result};
pub use fault::{idempotent, optional, retry_over_limit};
pub use gateway::CloudGateway;
pub use poll::wait_until;
pub use types::{
    FloatingIp, Flavor, Image, Instance, InstanceSpec, InstanceStatus, KeyPair, SecurityGroup,
    SecurityRule,
};
