//! Environment lifecycle controller
//!
//! Drives one cloud instance from absent to reachable and back, via
//! the gateway's capability surface. The controller never caches
//! backend state across a readiness check and never branches on which
//! backend it is bound to.
//!
//! Build walks a fixed ladder:
//!
//! ```text
//! absent --create--> building --fixed ip--> network pending
//!   --ACTIVE--> active --setup_network + public ip--> ready
//! ```
//!
//! Destroy deletes and then polls until the name stops resolving;
//! deletion is asynchronous on every supported backend.

use crate::error::{EnvError, Result};
use skiff_cloud::{
    CloudError, CloudGateway, Instance, InstanceSpec, idempotent, retry_over_limit, wait_until,
};
use skiff_config::EnvironmentConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// One developer environment: a single named instance on one cloud
pub struct Environment {
    gateway: Arc<dyn CloudGateway>,
    config: EnvironmentConfig,
}

impl Environment {
    pub fn new(gateway: Arc<dyn CloudGateway>, config: EnvironmentConfig) -> Self {
        Self { gateway, config }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Fresh lookup of this environment's instance.
    pub async fn find(&self) -> Result<Option<Instance>> {
        Ok(self.gateway.find_instance(&self.config.name).await?)
    }

    /// All visible instances in the project.
    pub async fn list(&self) -> Result<Vec<Instance>> {
        Ok(self.gateway.list_instances().await?)
    }

    /// Public address of the environment's instance.
    ///
    /// An address is meaningless without an instance, so a missing
    /// instance is an error rather than `None`.
    pub async fn ip(&self) -> Result<Option<String>> {
        let instance = self
            .find()
            .await?
            .ok_or_else(|| EnvError::NoInstance(self.config.name.clone()))?;
        Ok(self.gateway.find_floating_ip(&instance.id).await?)
    }

    /// Create the instance and wait until it is reachable.
    ///
    /// Returns only on full readiness; any failed step aborts the
    /// whole build and leaves cloud state as-is. A re-run re-discovers
    /// state from scratch, so a failed build is safe to retry.
    pub async fn build(&self) -> Result<Instance> {
        tracing::info!(image = %self.config.image, "resolving image");
        let image = match self.gateway.find_image(&self.config.image).await {
            Ok(Some(image)) => image,
            Ok(None) => return Err(EnvError::ImageNotFound(self.config.image.clone())),
            Err(CloudError::AmbiguousMatch(_)) => {
                return Err(EnvError::AmbiguousImage(self.config.image.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let flavor = self
            .gateway
            .find_flavor(&self.config.flavor)
            .await?
            .ok_or_else(|| EnvError::FlavorNotFound(self.config.flavor.clone()))?;

        tracing::info!(group = %self.config.sec_group_name, "ensuring security group");
        self.ensure_security_group().await?;

        if let Some(keypair) = self.config.keypair_name.clone() {
            tracing::info!(keypair = %keypair, "ensuring keypair");
            self.ensure_keypair(&keypair).await?;
        }

        let mut metadata = HashMap::new();
        metadata.insert(
            "skiff_auth_url".to_string(),
            self.gateway.auth_endpoint().to_string(),
        );

        let spec = InstanceSpec {
            name: self.config.name.clone(),
            image_id: image.id,
            flavor_id: flavor.id,
            security_groups: vec![self.config.sec_group_name.clone()],
            keypair_name: self.config.keypair_name.clone(),
            metadata,
        };

        tracing::info!(name = %spec.name, "creating instance");
        let instance = retry_over_limit("server", || self.gateway.create_instance(&spec)).await?;
        let id = instance.id;

        let poll = &self.config.poll;

        // Fixed IPs land before ACTIVE on some backends, so the
        // network-attach wait comes first and gets the generous bound.
        wait_until("fixed IP assignment", poll.fixed_ip_attempts, poll.interval, || {
            self.gateway.is_network_active(&id)
        })
        .await?;

        wait_until("ACTIVE status", poll.active_attempts, poll.interval, || {
            self.gateway.is_instance_active(&id)
        })
        .await?;

        self.gateway.setup_network(&id).await?;

        wait_until("public IP binding", poll.public_ip_attempts, poll.interval, || async {
            Ok(self.gateway.find_floating_ip(&id).await?.is_some())
        })
        .await?;

        tracing::info!(name = %self.config.name, "environment is ready");

        // Hand back freshly fetched state, not the creation snapshot.
        self.gateway
            .get_instance(&id)
            .await?
            .ok_or_else(|| EnvError::NoInstance(self.config.name.clone()))
    }

    /// Delete the instance and wait, bounded, for it to disappear.
    ///
    /// Exceeding the bound reports the environment as still
    /// terminating rather than claiming success; the operator re-runs
    /// destroy to keep waiting.
    pub async fn destroy(&self) -> Result<()> {
        let name = &self.config.name;
        let instance = self
            .find()
            .await?
            .ok_or_else(|| EnvError::NoInstance(name.clone()))?;

        self.gateway.delete_instance(&instance.id).await?;
        tracing::info!(name = %name, "deletion triggered");

        let poll = &self.config.poll;
        wait_until("instance deletion", poll.delete_attempts, poll.interval, || async {
            Ok(self.gateway.find_instance(name).await?.is_none())
        })
        .await
        .map_err(|e| match e {
            CloudError::ReadinessTimeout(_) => EnvError::StillTerminating(name.clone()),
            other => other.into(),
        })
    }

    /// Snapshot the instance's disk, returning the snapshot name used.
    ///
    /// Collisions with prior snapshot names are the backend's concern,
    /// not checked here.
    pub async fn snapshot(&self, name: Option<&str>) -> Result<String> {
        let instance = self
            .find()
            .await?
            .ok_or_else(|| EnvError::NoInstance(self.config.name.clone()))?;

        let snapshot_name = match name {
            Some(name) => name.to_string(),
            None => format!("{}-snapshot", self.config.name),
        };

        tracing::info!(snapshot = %snapshot_name, "creating snapshot");
        retry_over_limit("snapshot", || {
            self.gateway.snapshot(&instance.id, &snapshot_name)
        })
        .await?;

        Ok(snapshot_name)
    }

    /// Idempotent security-group provisioning: create the group if
    /// absent, then apply the full configured rule set unconditionally.
    /// "Already exists" from either step is success.
    async fn ensure_security_group(&self) -> Result<()> {
        let name = &self.config.sec_group_name;

        let group = match self.gateway.find_security_group(name).await? {
            Some(group) => group,
            None => match self.gateway.create_security_group(name).await {
                Ok(group) => group,
                Err(CloudError::AlreadyExists(_)) => {
                    // Lost a race with another invocation; the group is
                    // there now.
                    self.gateway
                        .find_security_group(name)
                        .await?
                        .ok_or_else(|| CloudError::NotFound(name.clone()))?
                }
                Err(e) => return Err(e.into()),
            },
        };

        for rule in &self.config.sec_group_rules {
            tracing::debug!(rule = %rule, "adding security group rule");
            idempotent(self.gateway.add_security_group_rule(&group, rule).await)?;
        }

        Ok(())
    }

    /// Idempotent keypair provisioning. Key material is only read from
    /// disk when the named keypair is absent.
    async fn ensure_keypair(&self, name: &str) -> Result<()> {
        if self.gateway.find_keypair(name).await?.is_some() {
            return Ok(());
        }

        let path = &self.config.keypair_location;
        tracing::info!(keypair = %name, path = %path.display(), "keypair absent, uploading");
        let material =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| EnvError::KeyMaterial {
                    path: path.clone(),
                    source,
                })?;

        idempotent(self.gateway.create_keypair(name, material.trim_end()).await)?;
        Ok(())
    }
}
