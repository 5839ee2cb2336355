//! `CloudGateway` implementation over the AWS EC2 SDK

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::config::{Credentials, Region};
use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::primitives::Blob;
use aws_sdk_ec2::types::{Filter, InstanceType, ResourceType, Tag, TagSpecification};
use skiff_cloud::{
    CloudError, CloudGateway, Flavor, FloatingIp, Image, Instance, InstanceSpec, InstanceStatus,
    KeyPair, Result, SecurityGroup, SecurityRule, optional,
};
use std::collections::HashMap;

/// Credentials for an EC2-compatible endpoint
#[derive(Debug, Clone)]
pub struct Ec2Credentials {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

pub struct Ec2Gateway {
    client: aws_sdk_ec2::Client,
    endpoint: String,
}

/// Instance states a lookup should still see. Terminated instances
/// linger in `DescribeInstances` long after deletion; including them
/// would make the destroy poll spin forever.
const VISIBLE_STATES: [&str; 5] = ["pending", "running", "stopping", "stopped", "shutting-down"];

impl Ec2Gateway {
    pub async fn new(credentials: Ec2Credentials) -> Self {
        let base = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(credentials.region.clone()))
            .credentials_provider(Credentials::new(
                credentials.access_key.clone(),
                credentials.secret_key.clone(),
                None,
                None,
                "skiff",
            ))
            .endpoint_url(&credentials.endpoint)
            .load()
            .await;

        Self {
            client: aws_sdk_ec2::Client::new(&base),
            endpoint: credentials.endpoint,
        }
    }

    async fn describe_visible(
        &self,
        name: Option<&str>,
    ) -> Result<Vec<aws_sdk_ec2::types::Instance>> {
        let mut request = self.client.describe_instances().filters(
            Filter::builder()
                .name("instance-state-name")
                .set_values(Some(
                    VISIBLE_STATES.iter().map(|s| s.to_string()).collect(),
                ))
                .build(),
        );
        if let Some(name) = name {
            request = request.filters(Filter::builder().name("tag:Name").values(name).build());
        }

        let response = request.send().await.map_err(classify)?;
        Ok(response
            .reservations
            .unwrap_or_default()
            .into_iter()
            .flat_map(|reservation| reservation.instances.unwrap_or_default())
            .collect())
    }

    async fn describe_one(&self, id: &str) -> Result<Option<aws_sdk_ec2::types::Instance>> {
        let result = self
            .client
            .describe_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(classify);

        let response = match optional(result)? {
            Some(response) => response,
            None => return Ok(None),
        };
        Ok(response
            .reservations
            .unwrap_or_default()
            .into_iter()
            .flat_map(|reservation| reservation.instances.unwrap_or_default())
            .next())
    }
}

#[async_trait]
impl CloudGateway for Ec2Gateway {
    fn name(&self) -> &str {
        "ec2"
    }

    fn auth_endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let instances = self.describe_visible(None).await?;
        Ok(instances.into_iter().map(into_instance).collect())
    }

    async fn find_instance(&self, name: &str) -> Result<Option<Instance>> {
        let mut matches = self.describe_visible(Some(name)).await?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop().map(into_instance)),
            _ => Err(CloudError::AmbiguousMatch(name.to_string())),
        }
    }

    async fn get_instance(&self, id: &str) -> Result<Option<Instance>> {
        Ok(self.describe_one(id).await?.map(into_instance))
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> Result<Instance> {
        let mut tags = TagSpecification::builder()
            .resource_type(ResourceType::Instance)
            .tags(Tag::builder().key("Name").value(&spec.name).build());
        for (key, value) in &spec.metadata {
            tags = tags.tags(Tag::builder().key(key).value(value).build());
        }

        let mut request = self
            .client
            .run_instances()
            .image_id(&spec.image_id)
            .instance_type(InstanceType::from(spec.flavor_id.as_str()))
            .min_count(1)
            .max_count(1)
            .tag_specifications(tags.build());
        for group in &spec.security_groups {
            request = request.security_groups(group);
        }
        if let Some(keypair) = &spec.keypair_name {
            request = request.key_name(keypair);
        }

        tracing::debug!(name = %spec.name, "submitting RunInstances");
        let response = request.send().await.map_err(classify)?;
        let instance = response
            .instances
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| CloudError::Api("RunInstances returned no instance".into()))?;

        let mut instance = into_instance(instance);
        // Tags propagate asynchronously; report the requested identity
        // rather than the racy describe view.
        instance.name = spec.name.clone();
        instance.metadata = spec.metadata.clone();
        Ok(instance)
    }

    async fn delete_instance(&self, id: &str) -> Result<()> {
        self.client
            .terminate_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn is_instance_active(&self, id: &str) -> Result<bool> {
        let instance = self
            .describe_one(id)
            .await?
            .ok_or_else(|| CloudError::NotFound(id.to_string()))?;
        Ok(status_of(&instance) == InstanceStatus::Active)
    }

    async fn is_network_active(&self, id: &str) -> Result<bool> {
        let instance = self
            .describe_one(id)
            .await?
            .ok_or_else(|| CloudError::NotFound(id.to_string()))?;
        Ok(into_instance(instance).has_fixed_ip())
    }

    async fn find_image(&self, search: &str) -> Result<Option<Image>> {
        let request = if search.starts_with("ami-") {
            self.client.describe_images().image_ids(search)
        } else {
            self.client
                .describe_images()
                .filters(Filter::builder().name("name").values(search).build())
        };

        let response = match optional(request.send().await.map_err(classify))? {
            Some(response) => response,
            None => return Ok(None),
        };

        let mut images = response.images.unwrap_or_default();
        match images.len() {
            0 => Ok(None),
            1 => {
                let image = images.remove(0);
                Ok(Some(Image {
                    id: image.image_id.unwrap_or_default(),
                    name: image.name.unwrap_or_else(|| search.to_string()),
                }))
            }
            _ => Err(CloudError::AmbiguousMatch(search.to_string())),
        }
    }

    async fn find_flavor(&self, name: &str) -> Result<Option<Flavor>> {
        // Instance types are fixed identifiers, not listable resources
        // worth a round trip; validity is checked by RunInstances.
        Ok(Some(Flavor {
            id: name.to_string(),
            name: name.to_string(),
        }))
    }

    async fn find_free_floating_ip(&self) -> Result<String> {
        let response = self
            .client
            .describe_addresses()
            .send()
            .await
            .map_err(classify)?;
        response
            .addresses
            .unwrap_or_default()
            .into_iter()
            .find(|address| address.instance_id.is_none())
            .and_then(|address| address.public_ip)
            .ok_or(CloudError::NoIpsAvailable)
    }

    async fn find_floating_ip(&self, instance_id: &str) -> Result<Option<String>> {
        let instance = self.describe_one(instance_id).await?;
        Ok(instance.and_then(|instance| instance.public_ip_address))
    }

    async fn allocate_floating_ip(&self) -> Result<FloatingIp> {
        let response = self
            .client
            .allocate_address()
            .send()
            .await
            .map_err(classify)?;
        let address = response
            .public_ip
            .ok_or_else(|| CloudError::Api("AllocateAddress returned no address".into()))?;
        Ok(FloatingIp {
            address,
            instance_id: None,
        })
    }

    async fn assign_floating_ip(&self, instance_id: &str, address: &str) -> Result<()> {
        self.client
            .associate_address()
            .instance_id(instance_id)
            .public_ip(address)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn find_security_group(&self, name: &str) -> Result<Option<SecurityGroup>> {
        let result = self
            .client
            .describe_security_groups()
            .filters(Filter::builder().name("group-name").values(name).build())
            .send()
            .await
            .map_err(classify);

        let response = match optional(result)? {
            Some(response) => response,
            None => return Ok(None),
        };
        Ok(response
            .security_groups
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|group| SecurityGroup {
                id: group.group_id.unwrap_or_default(),
                name: group.group_name.unwrap_or_else(|| name.to_string()),
            }))
    }

    async fn create_security_group(&self, name: &str) -> Result<SecurityGroup> {
        let response = self
            .client
            .create_security_group()
            .group_name(name)
            .description(name)
            .send()
            .await
            .map_err(classify)?;
        Ok(SecurityGroup {
            id: response.group_id.unwrap_or_default(),
            name: name.to_string(),
        })
    }

    async fn add_security_group_rule(
        &self,
        group: &SecurityGroup,
        rule: &SecurityRule,
    ) -> Result<()> {
        self.client
            .authorize_security_group_ingress()
            .group_name(&group.name)
            .ip_protocol(&rule.protocol)
            .from_port(rule.from_port)
            .to_port(rule.to_port)
            .cidr_ip(&rule.cidr)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn find_keypair(&self, name: &str) -> Result<Option<KeyPair>> {
        let result = self
            .client
            .describe_key_pairs()
            .key_names(name)
            .send()
            .await
            .map_err(classify);

        let response = match optional(result)? {
            Some(response) => response,
            None => return Ok(None),
        };
        Ok(response
            .key_pairs
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|keypair| KeyPair {
                name: keypair.key_name.unwrap_or_else(|| name.to_string()),
                fingerprint: keypair.key_fingerprint,
            }))
    }

    async fn create_keypair(&self, name: &str, public_key: &str) -> Result<()> {
        self.client
            .import_key_pair()
            .key_name(name)
            .public_key_material(Blob::new(public_key.as_bytes()))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn snapshot(&self, instance_id: &str, name: &str) -> Result<Image> {
        let response = self
            .client
            .create_image()
            .instance_id(instance_id)
            .name(name)
            .send()
            .await
            .map_err(classify)?;
        Ok(Image {
            id: response.image_id.unwrap_or_default(),
            name: name.to_string(),
        })
    }

    /// Public addresses arrive with the instance on this backend;
    /// there is no floating-IP pool to manage.
    async fn setup_network(&self, instance_id: &str) -> Result<()> {
        tracing::debug!(instance = %instance_id, "public address is backend-assigned, nothing to do");
        Ok(())
    }
}

fn status_of(instance: &aws_sdk_ec2::types::Instance) -> InstanceStatus {
    instance
        .state
        .as_ref()
        .and_then(|state| state.name.as_ref())
        .map(|name| InstanceStatus::from_backend(name.as_str()))
        .unwrap_or(InstanceStatus::Unknown)
}

fn into_instance(instance: aws_sdk_ec2::types::Instance) -> Instance {
    let status = status_of(&instance);
    let mut name = String::new();
    let mut metadata = HashMap::new();
    for tag in instance.tags.unwrap_or_default() {
        match (tag.key, tag.value) {
            (Some(key), Some(value)) if key == "Name" => name = value,
            (Some(key), Some(value)) => {
                metadata.insert(key, value);
            }
            _ => {}
        }
    }

    let networks = instance.private_ip_address.into_iter().collect();

    Instance {
        id: instance.instance_id.unwrap_or_default(),
        name,
        status,
        networks,
        metadata,
    }
}

/// Map an SDK failure onto the error taxonomy. Dispatch and timeout
/// failures mean the endpoint itself is bad; service errors are
/// classified by their EC2 error code.
fn classify<E, R>(error: SdkError<E, R>) -> CloudError
where
    SdkError<E, R>: ProvideErrorMetadata,
{
    if matches!(
        &error,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
    ) {
        return CloudError::BadEndpoint("EC2 endpoint unreachable or misconfigured".into());
    }

    let code = error.code().unwrap_or_default().to_string();
    let message = error
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("EC2 request failed ({code})"));

    match code.as_str() {
        "RequestLimitExceeded" | "AddressLimitExceeded" | "InstanceLimitExceeded" => {
            // EC2 supplies no Retry-After equivalent.
            CloudError::OverLimit {
                message,
                retry_after: None,
            }
        }
        "AuthFailure" | "UnauthorizedOperation" => {
            CloudError::Api(format!("request rejected: {message}"))
        }
        code if code.ends_with(".NotFound") => CloudError::NotFound(message),
        code if code.ends_with(".Duplicate") => CloudError::AlreadyExists(message),
        _ => CloudError::Api(message),
    }
}
