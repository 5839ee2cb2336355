//! `CloudGateway` implementation over the Nova client

use crate::client::{NovaClient, OpenStackCredentials, ServerDetail};
use async_trait::async_trait;
use serde_json::json;
use skiff_cloud::{
    CloudError, CloudGateway, Flavor, FloatingIp, Image, Instance, InstanceSpec, InstanceStatus,
    KeyPair, Result, SecurityGroup, SecurityRule, optional,
};

pub struct OpenStackGateway {
    client: NovaClient,
}

impl OpenStackGateway {
    pub fn new(credentials: OpenStackCredentials) -> Self {
        Self {
            client: NovaClient::new(credentials),
        }
    }
}

fn into_instance(server: ServerDetail) -> Instance {
    let networks = server
        .addresses
        .into_values()
        .flatten()
        .map(|address| address.addr)
        .collect();
    Instance {
        id: server.id,
        name: server.name,
        status: InstanceStatus::from_backend(&server.status),
        networks,
        metadata: server.metadata,
    }
}

#[async_trait]
impl CloudGateway for OpenStackGateway {
    fn name(&self) -> &str {
        "openstack"
    }

    fn auth_endpoint(&self) -> &str {
        self.client.auth_url()
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let servers = self.client.list_servers().await?;
        Ok(servers.into_iter().map(into_instance).collect())
    }

    async fn find_instance(&self, name: &str) -> Result<Option<Instance>> {
        // Nova's name filter is a regex; match exactly on our side.
        let mut matches: Vec<ServerDetail> = self
            .client
            .list_servers()
            .await?
            .into_iter()
            .filter(|server| server.name == name)
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop().map(into_instance)),
            _ => Err(CloudError::AmbiguousMatch(name.to_string())),
        }
    }

    async fn get_instance(&self, id: &str) -> Result<Option<Instance>> {
        let server = optional(self.client.get_server(id).await)?;
        Ok(server.map(into_instance))
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> Result<Instance> {
        let mut server = json!({
            "name": spec.name,
            "imageRef": spec.image_id,
            "flavorRef": spec.flavor_id,
            "security_groups": spec.security_groups
                .iter()
                .map(|name| json!({"name": name}))
                .collect::<Vec<_>>(),
            "metadata": spec.metadata,
        });
        if let Some(keypair) = &spec.keypair_name {
            server["key_name"] = json!(keypair);
        }

        tracing::debug!(name = %spec.name, "submitting server creation");
        let created = self.client.create_server(&json!({"server": server})).await?;
        Ok(into_instance(created))
    }

    async fn delete_instance(&self, id: &str) -> Result<()> {
        self.client.delete_server(id).await
    }

    async fn is_instance_active(&self, id: &str) -> Result<bool> {
        let server = self.client.get_server(id).await?;
        match InstanceStatus::from_backend(&server.status) {
            InstanceStatus::Active => Ok(true),
            // A server that entered ERROR will never become ACTIVE;
            // waiting longer only hides the failure.
            InstanceStatus::Error => Err(CloudError::Api(format!(
                "instance {id} entered ERROR state during boot"
            ))),
            _ => Ok(false),
        }
    }

    async fn is_network_active(&self, id: &str) -> Result<bool> {
        let server = self.client.get_server(id).await?;
        Ok(into_instance(server).has_fixed_ip())
    }

    async fn find_image(&self, search: &str) -> Result<Option<Image>> {
        let images = self.client.list_images().await?;

        // An exact id match is unambiguous even when names collide.
        if let Some(image) = images.iter().find(|image| image.id == search) {
            return Ok(Some(Image {
                id: image.id.clone(),
                name: image.name.clone(),
            }));
        }

        let mut matches: Vec<_> = images
            .into_iter()
            .filter(|image| image.name == search)
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop().map(|image| Image {
                id: image.id,
                name: image.name,
            })),
            _ => Err(CloudError::AmbiguousMatch(search.to_string())),
        }
    }

    async fn find_flavor(&self, name: &str) -> Result<Option<Flavor>> {
        let flavors = self.client.list_flavors().await?;
        Ok(flavors
            .into_iter()
            .find(|flavor| flavor.name == name)
            .map(|flavor| Flavor {
                id: flavor.id,
                name: flavor.name,
            }))
    }

    async fn find_free_floating_ip(&self) -> Result<String> {
        let ips = self.client.list_floating_ips().await?;
        ips.into_iter()
            .find(|ip| ip.instance_id.is_none())
            .map(|ip| ip.ip)
            .ok_or(CloudError::NoIpsAvailable)
    }

    async fn find_floating_ip(&self, instance_id: &str) -> Result<Option<String>> {
        let ips = self.client.list_floating_ips().await?;
        Ok(ips
            .into_iter()
            .find(|ip| ip.instance_id.as_deref() == Some(instance_id))
            .map(|ip| ip.ip))
    }

    async fn allocate_floating_ip(&self) -> Result<FloatingIp> {
        let ip = self.client.allocate_floating_ip().await?;
        tracing::info!(address = %ip.ip, "allocated floating IP lease");
        Ok(FloatingIp {
            address: ip.ip,
            instance_id: ip.instance_id,
        })
    }

    async fn assign_floating_ip(&self, instance_id: &str, address: &str) -> Result<()> {
        self.client
            .server_action(instance_id, &json!({"addFloatingIp": {"address": address}}))
            .await?;
        Ok(())
    }

    async fn find_security_group(&self, name: &str) -> Result<Option<SecurityGroup>> {
        let groups = self.client.list_security_groups().await?;
        Ok(groups
            .into_iter()
            .find(|group| group.name == name)
            .map(|group| SecurityGroup {
                id: group.id,
                name: group.name,
            }))
    }

    async fn create_security_group(&self, name: &str) -> Result<SecurityGroup> {
        let group = self.client.create_security_group(name).await?;
        Ok(SecurityGroup {
            id: group.id,
            name: group.name,
        })
    }

    async fn add_security_group_rule(
        &self,
        group: &SecurityGroup,
        rule: &SecurityRule,
    ) -> Result<()> {
        let body = json!({
            "security_group_rule": {
                "ip_protocol": rule.protocol,
                "from_port": rule.from_port,
                "to_port": rule.to_port,
                "cidr": rule.cidr,
                "parent_group_id": group.id,
            }
        });
        self.client.create_security_group_rule(&body).await
    }

    async fn find_keypair(&self, name: &str) -> Result<Option<KeyPair>> {
        let keypairs = self.client.list_keypairs().await?;
        Ok(keypairs
            .into_iter()
            .find(|keypair| keypair.name == name)
            .map(|keypair| KeyPair {
                name: keypair.name,
                fingerprint: keypair.fingerprint,
            }))
    }

    async fn create_keypair(&self, name: &str, public_key: &str) -> Result<()> {
        self.client.create_keypair(name, public_key).await
    }

    async fn snapshot(&self, instance_id: &str, name: &str) -> Result<Image> {
        let response = self
            .client
            .server_action(instance_id, &json!({"createImage": {"name": name}}))
            .await?;

        // Nova points at the new image via the Location header.
        let located = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|url| url.rsplit('/').next())
            .map(str::to_string);

        if let Some(id) = located {
            return Ok(Image {
                id,
                name: name.to_string(),
            });
        }

        // Older deployments omit the header; fall back to a lookup.
        self.find_image(name)
            .await?
            .ok_or_else(|| CloudError::Api(format!("snapshot `{name}` was not created")))
    }
}
