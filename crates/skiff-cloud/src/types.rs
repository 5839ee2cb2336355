//! Resource types shared by all cloud backends

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A compute instance as reported by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Opaque backend identifier
    pub id: String,

    /// Name, unique within the project namespace
    pub name: String,

    /// Current lifecycle status
    pub status: InstanceStatus,

    /// Addresses of attached network interfaces. Non-empty means the
    /// fabric has assigned a fixed IP.
    pub networks: Vec<String>,

    /// Backend metadata/tags attached to the instance
    pub metadata: HashMap<String, String>,
}

impl Instance {
    pub fn has_fixed_ip(&self) -> bool {
        !self.networks.is_empty()
    }
}

/// Instance lifecycle status, mapped from backend-native strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Building,
    Active,
    Error,
    Deleting,
    Unknown,
}

impl InstanceStatus {
    /// Map a backend-native status string onto the shared enum.
    pub fn from_backend(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "ACTIVE" | "RUNNING" | "UP" => InstanceStatus::Active,
            "BUILD" | "BUILDING" | "PENDING" | "SPAWNING" => InstanceStatus::Building,
            "ERROR" => InstanceStatus::Error,
            "DELETING" | "DELETED" | "SHUTTING-DOWN" | "TERMINATED" => InstanceStatus::Deleting,
            _ => InstanceStatus::Unknown,
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Building => write!(f, "building"),
            InstanceStatus::Active => write!(f, "active"),
            InstanceStatus::Error => write!(f, "error"),
            InstanceStatus::Deleting => write!(f, "deleting"),
            InstanceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Everything the backend needs to create an instance
#[derive(Debug, Clone, Default)]
pub struct InstanceSpec {
    pub name: String,
    pub image_id: String,
    pub flavor_id: String,
    pub security_groups: Vec<String>,
    pub keypair_name: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// A public address leasable to the project, independent of any
/// instance's lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloatingIp {
    pub address: String,

    /// Instance currently binding this address; `None` means free.
    pub instance_id: Option<String>,
}

impl FloatingIp {
    pub fn is_free(&self) -> bool {
        self.instance_id.is_none()
    }
}

/// A named, project-scoped firewall rule set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
}

/// One ingress rule within a security group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    pub protocol: String,
    pub from_port: i32,
    pub to_port: i32,
    pub cidr: String,
}

impl std::fmt::Display for SecurityRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}",
            self.protocol, self.from_port, self.to_port, self.cidr
        )
    }
}

/// A named public-key credential registered with the project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPair {
    pub name: String,
    pub fingerprint: Option<String>,
}

/// A bootable machine image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
}

/// A compute sizing template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
}
