//! In-memory gateway fake with scripted behavior and call counters.

use async_trait::async_trait;
use skiff_cloud::{
    CloudError, CloudGateway, Flavor, FloatingIp, Image, Instance, InstanceSpec, InstanceStatus,
    KeyPair, SecurityGroup, SecurityRule,
};
use skiff_config::{Backend, EnvironmentConfig, PollTuning, parse_rule};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

pub const AUTH_URL: &str = "http://keystone.example:5000/v2.0";

/// Scripted backend state. Tests set this up, run the controller, then
/// assert on the counters and the mutated state.
pub struct Script {
    pub images: Vec<Image>,
    pub ambiguous_image: bool,
    pub flavors: Vec<Flavor>,
    pub instance: Option<Instance>,
    /// How many `is_network_active` calls report false before true.
    pub network_pending_polls: u32,
    /// How many `is_instance_active` calls report false before true.
    pub status_pending_polls: u32,
    pub free_ips: Vec<String>,
    pub assigned_ip: Option<String>,
    /// Address handed out by `allocate_floating_ip`.
    pub allocatable_ip: Option<String>,
    /// When set, the next `create_instance` fails over-limit with this
    /// retry hint.
    pub create_over_limit: Option<Option<Duration>>,
    /// After deletion, how many `find_instance` calls still see the
    /// instance before it disappears.
    pub linger_polls: u32,
    pub deleted: bool,
    pub group: Option<SecurityGroup>,
    pub rules: Vec<String>,
    pub keypair: Option<KeyPair>,
    pub uploaded_key: Option<String>,
    pub snapshot_names: Vec<String>,
}

impl Script {
    /// A backend where a straightforward build succeeds immediately.
    pub fn ready() -> Self {
        Self {
            images: vec![Image {
                id: "img-1".into(),
                name: "ubuntu-22.04".into(),
            }],
            ambiguous_image: false,
            flavors: vec![Flavor {
                id: "flv-1".into(),
                name: "m1.small".into(),
            }],
            instance: None,
            network_pending_polls: 0,
            status_pending_polls: 0,
            free_ips: vec!["203.0.113.5".into()],
            assigned_ip: None,
            allocatable_ip: None,
            create_over_limit: None,
            linger_polls: 0,
            deleted: false,
            group: None,
            rules: Vec::new(),
            keypair: Some(KeyPair {
                name: "dev".into(),
                fingerprint: None,
            }),
            uploaded_key: None,
            snapshot_names: Vec::new(),
        }
    }

    pub fn with_instance(mut self, name: &str) -> Self {
        self.instance = Some(Instance {
            id: "srv-1".into(),
            name: name.into(),
            status: InstanceStatus::Active,
            networks: vec!["10.0.0.4".into()],
            metadata: HashMap::new(),
        });
        self
    }
}

#[derive(Default)]
pub struct Calls {
    pub find_instance: AtomicU32,
    pub create_instance: AtomicU32,
    pub delete_instance: AtomicU32,
    pub is_network_active: AtomicU32,
    pub is_instance_active: AtomicU32,
    pub find_free_floating_ip: AtomicU32,
    pub allocate_floating_ip: AtomicU32,
    pub assign_floating_ip: AtomicU32,
    pub create_security_group: AtomicU32,
    pub add_rule: AtomicU32,
    pub create_keypair: AtomicU32,
    pub snapshot: AtomicU32,
}

pub struct FakeGateway {
    pub script: Mutex<Script>,
    pub calls: Calls,
}

impl FakeGateway {
    pub fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            calls: Calls::default(),
        }
    }

    fn bump(counter: &AtomicU32) -> u32 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl CloudGateway for FakeGateway {
    fn name(&self) -> &str {
        "fake"
    }

    fn auth_endpoint(&self) -> &str {
        AUTH_URL
    }

    async fn list_instances(&self) -> skiff_cloud::Result<Vec<Instance>> {
        let script = self.script.lock().unwrap();
        Ok(script.instance.clone().into_iter().collect())
    }

    async fn find_instance(&self, name: &str) -> skiff_cloud::Result<Option<Instance>> {
        Self::bump(&self.calls.find_instance);
        let mut script = self.script.lock().unwrap();
        if script.deleted {
            if script.linger_polls > 0 {
                script.linger_polls -= 1;
            } else {
                return Ok(None);
            }
        }
        Ok(script
            .instance
            .clone()
            .filter(|instance| instance.name == name))
    }

    async fn get_instance(&self, id: &str) -> skiff_cloud::Result<Option<Instance>> {
        let script = self.script.lock().unwrap();
        Ok(script.instance.clone().filter(|instance| instance.id == id))
    }

    async fn create_instance(&self, spec: &InstanceSpec) -> skiff_cloud::Result<Instance> {
        Self::bump(&self.calls.create_instance);
        let mut script = self.script.lock().unwrap();
        if let Some(retry_after) = script.create_over_limit.take() {
            return Err(CloudError::OverLimit {
                message: "quota exceeded for instances".into(),
                retry_after,
            });
        }
        let instance = Instance {
            id: "srv-1".into(),
            name: spec.name.clone(),
            status: InstanceStatus::Building,
            networks: vec!["10.0.0.4".into()],
            metadata: spec.metadata.clone(),
        };
        script.instance = Some(instance.clone());
        Ok(instance)
    }

    async fn delete_instance(&self, _id: &str) -> skiff_cloud::Result<()> {
        Self::bump(&self.calls.delete_instance);
        self.script.lock().unwrap().deleted = true;
        Ok(())
    }

    async fn is_instance_active(&self, _id: &str) -> skiff_cloud::Result<bool> {
        let count = Self::bump(&self.calls.is_instance_active);
        let script = self.script.lock().unwrap();
        Ok(count > script.status_pending_polls)
    }

    async fn is_network_active(&self, _id: &str) -> skiff_cloud::Result<bool> {
        let count = Self::bump(&self.calls.is_network_active);
        let script = self.script.lock().unwrap();
        Ok(count > script.network_pending_polls)
    }

    async fn find_image(&self, search: &str) -> skiff_cloud::Result<Option<Image>> {
        let script = self.script.lock().unwrap();
        if script.ambiguous_image {
            return Err(CloudError::AmbiguousMatch(search.to_string()));
        }
        Ok(script
            .images
            .iter()
            .find(|image| image.name == search || image.id == search)
            .cloned())
    }

    async fn find_flavor(&self, name: &str) -> skiff_cloud::Result<Option<Flavor>> {
        let script = self.script.lock().unwrap();
        Ok(script.flavors.iter().find(|flavor| flavor.name == name).cloned())
    }

    async fn find_free_floating_ip(&self) -> skiff_cloud::Result<String> {
        Self::bump(&self.calls.find_free_floating_ip);
        let script = self.script.lock().unwrap();
        script
            .free_ips
            .first()
            .cloned()
            .ok_or(CloudError::NoIpsAvailable)
    }

    async fn find_floating_ip(&self, _instance_id: &str) -> skiff_cloud::Result<Option<String>> {
        let script = self.script.lock().unwrap();
        Ok(script.assigned_ip.clone())
    }

    async fn allocate_floating_ip(&self) -> skiff_cloud::Result<FloatingIp> {
        Self::bump(&self.calls.allocate_floating_ip);
        let mut script = self.script.lock().unwrap();
        let address = script
            .allocatable_ip
            .clone()
            .ok_or(CloudError::NoIpsAvailable)?;
        script.free_ips.push(address.clone());
        Ok(FloatingIp {
            address,
            instance_id: None,
        })
    }

    async fn assign_floating_ip(
        &self,
        _instance_id: &str,
        address: &str,
    ) -> skiff_cloud::Result<()> {
        Self::bump(&self.calls.assign_floating_ip);
        let mut script = self.script.lock().unwrap();
        script.free_ips.retain(|free| free != address);
        script.assigned_ip = Some(address.to_string());
        Ok(())
    }

    async fn find_security_group(&self, name: &str) -> skiff_cloud::Result<Option<SecurityGroup>> {
        let script = self.script.lock().unwrap();
        Ok(script.group.clone().filter(|group| group.name == name))
    }

    async fn create_security_group(&self, name: &str) -> skiff_cloud::Result<SecurityGroup> {
        Self::bump(&self.calls.create_security_group);
        let mut script = self.script.lock().unwrap();
        if script.group.is_some() {
            return Err(CloudError::AlreadyExists(name.to_string()));
        }
        let group = SecurityGroup {
            id: "sg-1".into(),
            name: name.into(),
        };
        script.group = Some(group.clone());
        Ok(group)
    }

    async fn add_security_group_rule(
        &self,
        _group: &SecurityGroup,
        rule: &SecurityRule,
    ) -> skiff_cloud::Result<()> {
        Self::bump(&self.calls.add_rule);
        let mut script = self.script.lock().unwrap();
        let key = rule.to_string();
        if script.rules.contains(&key) {
            return Err(CloudError::AlreadyExists(key));
        }
        script.rules.push(key);
        Ok(())
    }

    async fn find_keypair(&self, name: &str) -> skiff_cloud::Result<Option<KeyPair>> {
        let script = self.script.lock().unwrap();
        Ok(script.keypair.clone().filter(|keypair| keypair.name == name))
    }

    async fn create_keypair(&self, name: &str, public_key: &str) -> skiff_cloud::Result<()> {
        Self::bump(&self.calls.create_keypair);
        let mut script = self.script.lock().unwrap();
        script.keypair = Some(KeyPair {
            name: name.into(),
            fingerprint: None,
        });
        script.uploaded_key = Some(public_key.to_string());
        Ok(())
    }

    async fn snapshot(&self, _instance_id: &str, name: &str) -> skiff_cloud::Result<Image> {
        Self::bump(&self.calls.snapshot);
        let mut script = self.script.lock().unwrap();
        script.snapshot_names.push(name.to_string());
        Ok(Image {
            id: "snap-1".into(),
            name: name.into(),
        })
    }
}

/// A resolved config matching [`Script::ready`], with fast polling.
pub fn test_config(name: &str) -> EnvironmentConfig {
    EnvironmentConfig {
        base_name: name.to_string(),
        name: name.to_string(),
        image: "ubuntu-22.04".into(),
        flavor: "m1.small".into(),
        remote_user: "ubuntu".into(),
        sec_group_name: name.to_string(),
        sec_group_rules: vec![
            parse_rule("icmp, -1, -1, 0.0.0.0/0").unwrap(),
            parse_rule("tcp, 22, 22, 0.0.0.0/0").unwrap(),
        ],
        keypair_name: Some("dev".into()),
        keypair_location: PathBuf::from("/nonexistent/id_rsa.pub"),
        backend: Backend::OpenStack {
            auth_url: AUTH_URL.into(),
            username: "dev".into(),
            password: "hunter2".into(),
            tenant_name: "devteam".into(),
            region: None,
        },
        poll: PollTuning {
            fixed_ip_attempts: 30,
            active_attempts: 10,
            public_ip_attempts: 10,
            delete_attempts: 10,
            interval: Duration::from_secs(1),
        },
    }
}
