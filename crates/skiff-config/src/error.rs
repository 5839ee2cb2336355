use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("could not read user config at {0}; create a ~/.skiff.yml first")]
    UserConfigNotFound(PathBuf),

    #[error("could not read project config at {0}; run skiff from a directory with a Skifffile")]
    ProjectConfigNotFound(PathBuf),

    #[error("no clouds defined in user config")]
    NoClouds,

    #[error("cloud `{name}` is not defined in user config (known: {})", known.join(", "))]
    UnknownCloud { name: String, known: Vec<String> },

    #[error(
        "multiple clouds defined ({}); set default_cloud or pass --cloud",
        .0.join(", ")
    )]
    AmbiguousCloud(Vec<String>),

    #[error("`{0}` is not set in any config layer")]
    MissingField(&'static str),

    #[error("cloud `{cloud}` is missing `{field}`")]
    MissingCredential { cloud: String, field: &'static str },

    #[error("malformed security rule `{0}`; expected `proto, from, to, cidr`")]
    InvalidRule(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
