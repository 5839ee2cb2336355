//! Cloud gateway trait definition

use crate::error::{CloudError, Result};
use crate::types::{
    Flavor, FloatingIp, Image, Instance, InstanceSpec, KeyPair, SecurityGroup, SecurityRule,
};
use async_trait::async_trait;

/// Capability surface of an IaaS backend
///
/// All backends (OpenStack-style, EC2-style) implement this trait to
/// present a uniform contract to the lifecycle controller. Lookup
/// operations return `Ok(None)` for a missing resource; `CloudError`
/// is reserved for genuine faults.
#[async_trait]
pub trait CloudGateway: Send + Sync {
    /// Returns the backend name (e.g. "openstack", "ec2")
    fn name(&self) -> &str;

    /// Auth endpoint this gateway was constructed against, recorded in
    /// instance metadata for lifecycle traceability.
    fn auth_endpoint(&self) -> &str;

    /// List instances in a running/visible state. An empty project is
    /// an empty list, never an error.
    async fn list_instances(&self) -> Result<Vec<Instance>>;

    /// Exact-name lookup. Fails with [`CloudError::AmbiguousMatch`]
    /// when the backend reports more than one match.
    async fn find_instance(&self, name: &str) -> Result<Option<Instance>>;

    async fn get_instance(&self, id: &str) -> Result<Option<Instance>>;

    /// Create an instance. Fails with [`CloudError::OverLimit`] when
    /// the project quota is exhausted and [`CloudError::BadEndpoint`]
    /// when the backend is unreachable or misconfigured.
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<Instance>;

    /// Request deletion. Deletion is asynchronous; callers poll
    /// [`CloudGateway::find_instance`] until the instance disappears.
    async fn delete_instance(&self, id: &str) -> Result<()>;

    /// Readiness predicate: has the instance reached its backend's
    /// "active" status?
    async fn is_instance_active(&self, id: &str) -> Result<bool>;

    /// Readiness predicate: has the network fabric attached an
    /// interface (OpenStack-style) or assigned an address (EC2-style)?
    async fn is_network_active(&self, id: &str) -> Result<bool>;

    /// Resolve an image from a human name or an opaque id. Multiple
    /// name matches are a reported error, never a silent pick.
    async fn find_image(&self, search: &str) -> Result<Option<Image>>;

    async fn find_flavor(&self, name: &str) -> Result<Option<Flavor>>;

    /// First unbound address in the project pool. Fails with
    /// [`CloudError::NoIpsAvailable`] when every lease is bound.
    async fn find_free_floating_ip(&self) -> Result<String>;

    /// Address currently bound to the given instance, if any.
    async fn find_floating_ip(&self, instance_id: &str) -> Result<Option<String>>;

    /// Lease a new address to the project. The lease outlives any
    /// instance and is never implicitly released.
    async fn allocate_floating_ip(&self) -> Result<FloatingIp>;

    async fn assign_floating_ip(&self, instance_id: &str, address: &str) -> Result<()>;

    async fn find_security_group(&self, name: &str) -> Result<Option<SecurityGroup>>;

    async fn create_security_group(&self, name: &str) -> Result<SecurityGroup>;

    /// Add one ingress rule. Fails with [`CloudError::AlreadyExists`]
    /// for a duplicate rule; callers treat that as success.
    async fn add_security_group_rule(
        &self,
        group: &SecurityGroup,
        rule: &SecurityRule,
    ) -> Result<()>;

    async fn find_keypair(&self, name: &str) -> Result<Option<KeyPair>>;

    async fn create_keypair(&self, name: &str, public_key: &str) -> Result<()>;

    /// Snapshot the instance's disk into a new image.
    async fn snapshot(&self, instance_id: &str, name: &str) -> Result<Image>;

    /// Give the instance a public address.
    ///
    /// The provided implementation covers backends with explicit
    /// floating-IP binding: take the first free address, or allocate a
    /// new lease and retry the lookup exactly once when the pool is
    /// exhausted. A second exhaustion is fatal. Backends that assign
    /// public addresses automatically override this with a no-op.
    async fn setup_network(&self, instance_id: &str) -> Result<()> {
        let address = match self.find_free_floating_ip().await {
            Ok(address) => address,
            Err(CloudError::NoIpsAvailable) => {
                tracing::info!("floating IP pool exhausted, allocating a new address");
                self.allocate_floating_ip().await?;
                self.find_free_floating_ip().await?
            }
            Err(e) => return Err(e),
        };

        tracing::info!(address = %address, "assigning floating IP to instance");
        self.assign_floating_ip(instance_id, &address).await
    }
}
