//! EC2-style compute backend for skiff
//!
//! Instances carry the environment name as their `Name` tag; lookups
//! filter on it and exclude terminated instances. Public addresses are
//! assigned by the backend itself, so the floating-IP setup step is a
//! no-op here.

pub mod gateway;

pub use gateway::{Ec2Credentials, Ec2Gateway};
