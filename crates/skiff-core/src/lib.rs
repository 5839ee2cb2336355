//! Environment lifecycle for skiff
//!
//! Binds a resolved [`EnvironmentConfig`](skiff_config::EnvironmentConfig)
//! to a [`CloudGateway`](skiff_cloud::CloudGateway) and drives the
//! instance through its lifecycle.

pub mod env;
pub mod error;

pub use env::Environment;
pub use error::{EnvError, Result};
