//! Layered configuration resolution
//!
//! Four immutable layers feed the resolved [`EnvironmentConfig`], in
//! order of precedence (most specific wins):
//!
//! 1. project (`Skifffile`)
//! 2. cloud (the selected entry in the user config's `clouds:` map)
//! 3. user (top-level keys in the user config)
//! 4. built-in defaults
//!
//! Resolution is a pure function of the layer values; nothing global
//! is consulted and nothing is mutated afterwards.

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use skiff_cloud::SecurityRule;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Overridable settings, present in every layer
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Layer {
    pub image: Option<String>,
    pub flavor: Option<String>,
    pub remote_user: Option<String>,
    pub sec_group_name: Option<String>,
    pub sec_groups: Option<Vec<String>>,
    pub keypair_name: Option<String>,
    pub keypair_location: Option<String>,
    pub fixed_ip_attempts: Option<u32>,
    pub active_attempts: Option<u32>,
    pub public_ip_attempts: Option<u32>,
    pub delete_attempts: Option<u32>,
    pub poll_interval_secs: Option<u64>,
}

/// Shape of `~/.skiff.yml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserConfig {
    pub default_cloud: Option<String>,

    #[serde(default)]
    pub clouds: BTreeMap<String, CloudConfig>,

    #[serde(flatten)]
    pub overrides: Layer,
}

/// One entry in the user config's `clouds:` map
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudConfig {
    pub os_auth_url: Option<String>,
    pub os_username: Option<String>,
    pub os_password: Option<String>,
    pub os_tenant_name: Option<String>,
    pub os_region_name: Option<String>,

    pub ec2_endpoint: Option<String>,
    pub ec2_access_key: Option<String>,
    pub ec2_secret_key: Option<String>,
    pub ec2_region_name: Option<String>,

    #[serde(flatten)]
    pub overrides: Layer,
}

/// Shape of the project `Skifffile`
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectFile {
    /// Project base name; environment names derive from it.
    pub name: String,

    #[serde(flatten)]
    pub overrides: Layer,
}

/// Backend selection, inferred from which credentials a cloud entry
/// carries. The controller never sees this; it only picks which
/// gateway gets constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    OpenStack {
        auth_url: String,
        username: String,
        password: String,
        tenant_name: String,
        region: Option<String>,
    },
    Ec2 {
        endpoint: String,
        access_key: String,
        secret_key: String,
        region: String,
    },
}

impl Backend {
    /// The auth endpoint recorded in instance metadata.
    pub fn auth_endpoint(&self) -> &str {
        match self {
            Backend::OpenStack { auth_url, .. } => auth_url,
            Backend::Ec2 { endpoint, .. } => endpoint,
        }
    }

    fn from_cloud(name: &str, cloud: &CloudConfig) -> Result<Self> {
        let missing = |field| ConfigError::MissingCredential {
            cloud: name.to_string(),
            field,
        };

        if let Some(auth_url) = &cloud.os_auth_url {
            Ok(Backend::OpenStack {
                auth_url: auth_url.clone(),
                username: cloud.os_username.clone().ok_or(missing("os_username"))?,
                password: cloud.os_password.clone().ok_or(missing("os_password"))?,
                tenant_name: cloud
                    .os_tenant_name
                    .clone()
                    .ok_or(missing("os_tenant_name"))?,
                region: cloud.os_region_name.clone(),
            })
        } else if let Some(endpoint) = &cloud.ec2_endpoint {
            Ok(Backend::Ec2 {
                endpoint: endpoint.clone(),
                access_key: cloud.ec2_access_key.clone().ok_or(missing("ec2_access_key"))?,
                secret_key: cloud.ec2_secret_key.clone().ok_or(missing("ec2_secret_key"))?,
                region: cloud
                    .ec2_region_name
                    .clone()
                    .unwrap_or_else(|| "RegionOne".to_string()),
            })
        } else {
            Err(missing("os_auth_url or ec2_endpoint"))
        }
    }
}

/// Bounded-poll tuning; attempt counts differ per transition because
/// fixed-IP assignment is by far the slowest and most variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTuning {
    pub fixed_ip_attempts: u32,
    pub active_attempts: u32,
    pub public_ip_attempts: u32,
    pub delete_attempts: u32,
    pub interval: Duration,
}

impl Default for PollTuning {
    fn default() -> Self {
        Self {
            fixed_ip_attempts: 600,
            active_attempts: 60,
            public_ip_attempts: 60,
            delete_attempts: 60,
            interval: Duration::from_secs(1),
        }
    }
}

/// The resolved, validated configuration the controller runs against
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub base_name: String,
    pub name: String,
    pub image: String,
    pub flavor: String,
    pub remote_user: String,
    pub sec_group_name: String,
    pub sec_group_rules: Vec<SecurityRule>,
    pub keypair_name: Option<String>,
    pub keypair_location: PathBuf,
    pub backend: Backend,
    pub poll: PollTuning,
}

/// Built-in defaults, the lowest-precedence layer.
pub fn default_layer() -> Layer {
    Layer {
        flavor: Some("m1.small".to_string()),
        remote_user: Some("ubuntu".to_string()),
        keypair_name: std::env::var("USER").ok(),
        keypair_location: Some("~/.ssh/id_rsa.pub".to_string()),
        sec_groups: Some(vec![
            "icmp, -1, -1, 0.0.0.0/0".to_string(),
            "tcp, 22, 22, 0.0.0.0/0".to_string(),
        ]),
        ..Layer::default()
    }
}

/// Pick which cloud entry an invocation operates on.
///
/// An explicit request wins, then `default_cloud`, then the only entry
/// when exactly one is defined. Anything else is an error the operator
/// has to resolve.
pub fn select_cloud<'a>(
    user: &'a UserConfig,
    requested: Option<&str>,
) -> Result<(&'a str, &'a CloudConfig)> {
    if user.clouds.is_empty() {
        return Err(ConfigError::NoClouds);
    }

    let known = || user.clouds.keys().cloned().collect::<Vec<_>>();

    let name = match requested.or(user.default_cloud.as_deref()) {
        Some(name) => name,
        None if user.clouds.len() == 1 => {
            // Unambiguous, safe to default.
            user.clouds.keys().next().map(String::as_str).unwrap_or_default()
        }
        None => return Err(ConfigError::AmbiguousCloud(known())),
    };

    match user.clouds.get_key_value(name) {
        Some((name, cloud)) => Ok((name.as_str(), cloud)),
        None => Err(ConfigError::UnknownCloud {
            name: name.to_string(),
            known: known(),
        }),
    }
}

/// Resolve the four layers into one validated config.
///
/// `env_suffix` composes the environment name as `<base>-<suffix>`;
/// without it the base name is used directly.
pub fn resolve(
    defaults: &Layer,
    user: &UserConfig,
    cloud_name: &str,
    cloud: &CloudConfig,
    project: &ProjectFile,
    env_suffix: Option<&str>,
) -> Result<EnvironmentConfig> {
    let layers = |get: fn(&Layer) -> &Option<String>| {
        pick([
            get(&project.overrides).clone(),
            get(&cloud.overrides).clone(),
            get(&user.overrides).clone(),
            get(defaults).clone(),
        ])
    };

    let base_name = project.name.clone();
    let name = match env_suffix {
        Some(suffix) => format!("{base_name}-{suffix}"),
        None => base_name.clone(),
    };

    let image = layers(|l| &l.image).ok_or(ConfigError::MissingField("image"))?;
    let flavor = layers(|l| &l.flavor).ok_or(ConfigError::MissingField("flavor"))?;
    let remote_user =
        layers(|l| &l.remote_user).ok_or(ConfigError::MissingField("remote_user"))?;

    // The group name defaults to the project base name so two projects
    // on the same cloud never fight over one rule set.
    let sec_group_name = layers(|l| &l.sec_group_name).unwrap_or_else(|| base_name.clone());

    let rule_strings = pick([
        project.overrides.sec_groups.as_ref(),
        cloud.overrides.sec_groups.as_ref(),
        user.overrides.sec_groups.as_ref(),
        defaults.sec_groups.as_ref(),
    ])
    .cloned()
    .unwrap_or_default();
    let sec_group_rules = rule_strings
        .iter()
        .map(|s| parse_rule(s))
        .collect::<Result<Vec<_>>>()?;

    let keypair_name = layers(|l| &l.keypair_name);
    let keypair_location = expand_home(
        &layers(|l| &l.keypair_location).ok_or(ConfigError::MissingField("keypair_location"))?,
    );

    let backend = Backend::from_cloud(cloud_name, cloud)?;

    let pick_u32 = |get: fn(&Layer) -> &Option<u32>, fallback: u32| {
        pick([
            *get(&project.overrides),
            *get(&cloud.overrides),
            *get(&user.overrides),
            *get(defaults),
        ])
        .unwrap_or(fallback)
    };
    let tuned = PollTuning::default();
    let poll = PollTuning {
        fixed_ip_attempts: pick_u32(|l| &l.fixed_ip_attempts, tuned.fixed_ip_attempts),
        active_attempts: pick_u32(|l| &l.active_attempts, tuned.active_attempts),
        public_ip_attempts: pick_u32(|l| &l.public_ip_attempts, tuned.public_ip_attempts),
        delete_attempts: pick_u32(|l| &l.delete_attempts, tuned.delete_attempts),
        interval: pick([
            project.overrides.poll_interval_secs,
            cloud.overrides.poll_interval_secs,
            user.overrides.poll_interval_secs,
            defaults.poll_interval_secs,
        ])
        .map(Duration::from_secs)
        .unwrap_or(tuned.interval),
    };

    Ok(EnvironmentConfig {
        base_name,
        name,
        image,
        flavor,
        remote_user,
        sec_group_name,
        sec_group_rules,
        keypair_name,
        keypair_location,
        backend,
        poll,
    })
}

/// Parse the `"proto, from, to, cidr"` rule form used in config files.
pub fn parse_rule(raw: &str) -> Result<SecurityRule> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [protocol, from_port, to_port, cidr] = parts.as_slice() else {
        return Err(ConfigError::InvalidRule(raw.to_string()));
    };

    let parse_port = |p: &str| {
        p.parse::<i32>()
            .map_err(|_| ConfigError::InvalidRule(raw.to_string()))
    };

    Ok(SecurityRule {
        protocol: protocol.to_string(),
        from_port: parse_port(from_port)?,
        to_port: parse_port(to_port)?,
        cidr: cidr.to_string(),
    })
}

fn pick<T: Clone>(ordered: [Option<T>; 4]) -> Option<T> {
    ordered.into_iter().flatten().next()
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openstack_cloud() -> CloudConfig {
        CloudConfig {
            os_auth_url: Some("http://keystone.example:5000/v2.0".into()),
            os_username: Some("dev".into()),
            os_password: Some("hunter2".into()),
            os_tenant_name: Some("devteam".into()),
            ..CloudConfig::default()
        }
    }

    fn project(name: &str) -> ProjectFile {
        ProjectFile {
            name: name.into(),
            overrides: Layer {
                image: Some("ubuntu-22.04".into()),
                ..Layer::default()
            },
        }
    }

    fn resolve_simple(
        user: &UserConfig,
        cloud: &CloudConfig,
        project: &ProjectFile,
        suffix: Option<&str>,
    ) -> EnvironmentConfig {
        resolve(&default_layer(), user, "east", cloud, project, suffix).unwrap()
    }

    #[test]
    fn project_layer_beats_cloud_user_and_default() {
        let mut user = UserConfig::default();
        user.overrides.flavor = Some("m1.large".into());

        let mut cloud = openstack_cloud();
        cloud.overrides.flavor = Some("m1.medium".into());

        let mut proj = project("proj");
        proj.overrides.flavor = Some("m1.tiny".into());

        let config = resolve_simple(&user, &cloud, &proj, None);
        assert_eq!(config.flavor, "m1.tiny");
    }

    #[test]
    fn cloud_layer_beats_user_layer() {
        let mut user = UserConfig::default();
        user.overrides.flavor = Some("m1.large".into());

        let mut cloud = openstack_cloud();
        cloud.overrides.flavor = Some("m1.medium".into());

        let config = resolve_simple(&user, &cloud, &project("proj"), None);
        assert_eq!(config.flavor, "m1.medium");
    }

    #[test]
    fn defaults_fill_unset_fields() {
        let config = resolve_simple(
            &UserConfig::default(),
            &openstack_cloud(),
            &project("proj"),
            None,
        );
        assert_eq!(config.flavor, "m1.small");
        assert_eq!(config.remote_user, "ubuntu");
        assert_eq!(config.sec_group_rules.len(), 2);
        assert_eq!(config.poll.fixed_ip_attempts, 600);
    }

    #[test]
    fn suffix_composes_environment_name() {
        let config = resolve_simple(
            &UserConfig::default(),
            &openstack_cloud(),
            &project("proj"),
            Some("dev"),
        );
        assert_eq!(config.base_name, "proj");
        assert_eq!(config.name, "proj-dev");

        let plain = resolve_simple(
            &UserConfig::default(),
            &openstack_cloud(),
            &project("proj"),
            None,
        );
        assert_eq!(plain.name, "proj");
    }

    #[test]
    fn sec_group_name_defaults_to_base_name() {
        let config = resolve_simple(
            &UserConfig::default(),
            &openstack_cloud(),
            &project("proj"),
            Some("dev"),
        );
        assert_eq!(config.sec_group_name, "proj");
    }

    #[test]
    fn missing_image_is_an_error() {
        let proj = ProjectFile {
            name: "proj".into(),
            overrides: Layer::default(),
        };
        let result = resolve(
            &default_layer(),
            &UserConfig::default(),
            "east",
            &openstack_cloud(),
            &proj,
            None,
        );
        assert!(matches!(result, Err(ConfigError::MissingField("image"))));
    }

    #[test]
    fn backend_inferred_from_credentials() {
        let config = resolve_simple(
            &UserConfig::default(),
            &openstack_cloud(),
            &project("proj"),
            None,
        );
        assert!(matches!(config.backend, Backend::OpenStack { .. }));
        assert_eq!(
            config.backend.auth_endpoint(),
            "http://keystone.example:5000/v2.0"
        );

        let ec2 = CloudConfig {
            ec2_endpoint: Some("https://ec2.example".into()),
            ec2_access_key: Some("AK".into()),
            ec2_secret_key: Some("SK".into()),
            ..CloudConfig::default()
        };
        let config = resolve(
            &default_layer(),
            &UserConfig::default(),
            "east",
            &ec2,
            &project("proj"),
            None,
        )
        .unwrap();
        match config.backend {
            Backend::Ec2 { region, .. } => assert_eq!(region, "RegionOne"),
            other => panic!("expected EC2 backend, got {other:?}"),
        }
    }

    #[test]
    fn incomplete_credentials_are_rejected() {
        let mut cloud = openstack_cloud();
        cloud.os_password = None;
        let result = resolve(
            &default_layer(),
            &UserConfig::default(),
            "east",
            &cloud,
            &project("proj"),
            None,
        );
        assert!(matches!(
            result,
            Err(ConfigError::MissingCredential { field: "os_password", .. })
        ));
    }

    #[test]
    fn rule_parsing_accepts_icmp_wildcards() {
        let rule = parse_rule("icmp, -1, -1, 0.0.0.0/0").unwrap();
        assert_eq!(rule.protocol, "icmp");
        assert_eq!(rule.from_port, -1);
        assert_eq!(rule.cidr, "0.0.0.0/0");

        assert!(parse_rule("tcp, 22").is_err());
        assert!(parse_rule("tcp, low, high, 0.0.0.0/0").is_err());
    }

    #[test]
    fn select_cloud_prefers_explicit_then_default_then_singleton() {
        let mut user = UserConfig::default();
        user.clouds.insert("east".into(), openstack_cloud());

        let (name, _) = select_cloud(&user, None).unwrap();
        assert_eq!(name, "east");

        user.clouds.insert("west".into(), openstack_cloud());
        assert!(matches!(
            select_cloud(&user, None),
            Err(ConfigError::AmbiguousCloud(_))
        ));

        user.default_cloud = Some("west".into());
        let (name, _) = select_cloud(&user, None).unwrap();
        assert_eq!(name, "west");

        let (name, _) = select_cloud(&user, Some("east")).unwrap();
        assert_eq!(name, "east");

        assert!(matches!(
            select_cloud(&user, Some("north")),
            Err(ConfigError::UnknownCloud { .. })
        ));
    }

    #[test]
    fn poll_tuning_is_overridable_per_layer() {
        let mut proj = project("proj");
        proj.overrides.fixed_ip_attempts = Some(60);
        proj.overrides.poll_interval_secs = Some(2);

        let config = resolve_simple(&UserConfig::default(), &openstack_cloud(), &proj, None);
        assert_eq!(config.poll.fixed_ip_attempts, 60);
        assert_eq!(config.poll.interval, Duration::from_secs(2));
        assert_eq!(config.poll.active_attempts, 60);
    }
}
