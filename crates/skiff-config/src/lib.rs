//! Configuration loading for skiff
//!
//! Two YAML files feed the resolver: the user config (credentials and
//! personal overrides, found in the home directory) and the project
//! config (a `Skifffile` in the working directory). See [`resolve`]
//! for how the layers combine.

pub mod error;
pub mod resolve;

pub use error::{ConfigError, Result};
pub use resolve::{
    Backend, CloudConfig, EnvironmentConfig, Layer, PollTuning, ProjectFile, UserConfig,
    default_layer, parse_rule, resolve, select_cloud,
};

use std::path::{Path, PathBuf};

const USER_CONFIG_CANDIDATES: [&str; 2] = [".skiff.yml", ".skiff"];
const PROJECT_CONFIG_CANDIDATES: [&str; 2] = ["Skifffile.yml", "Skifffile"];

/// Locate the user config in the home directory.
pub fn find_user_config() -> Result<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    find_in(&home, &USER_CONFIG_CANDIDATES)
        .ok_or_else(|| ConfigError::UserConfigNotFound(home.join(USER_CONFIG_CANDIDATES[0])))
}

/// Locate the project config in the given directory.
pub fn find_project_config(dir: &Path) -> Result<PathBuf> {
    find_in(dir, &PROJECT_CONFIG_CANDIDATES)
        .ok_or_else(|| ConfigError::ProjectConfigNotFound(dir.join(PROJECT_CONFIG_CANDIDATES[0])))
}

fn find_in(dir: &Path, candidates: &[&str]) -> Option<PathBuf> {
    candidates.iter().map(|name| dir.join(name)).find(|p| p.exists())
}

pub fn load_user_config(path: &Path) -> Result<UserConfig> {
    let content = std::fs::read_to_string(path)?;
    let config = serde_yaml::from_str(&content)?;
    tracing::debug!(path = %path.display(), "loaded user config");
    Ok(config)
}

pub fn load_project_config(path: &Path) -> Result<ProjectFile> {
    let content = std::fs::read_to_string(path)?;
    let config = serde_yaml::from_str(&content)?;
    tracing::debug!(path = %path.display(), "loaded project config");
    Ok(config)
}
