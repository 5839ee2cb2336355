use skiff_cloud::CloudError;
use std::path::PathBuf;
use thiserror::Error;

/// Terminal failures of an environment operation
///
/// Everything here surfaces as one human-readable message; a partial
/// success is never reported as success.
#[derive(Error, Debug)]
pub enum EnvError {
    #[error("image `{0}` could not be found")]
    ImageNotFound(String),

    #[error("multiple images named `{0}` exist; configure an image id instead")]
    AmbiguousImage(String),

    #[error("flavor `{0}` could not be found")]
    FlavorNotFound(String),

    #[error("environment `{0}` does not exist; try `skiff up` first")]
    NoInstance(String),

    #[error("environment `{0}` is still terminating; re-run destroy to keep waiting")]
    StillTerminating(String),

    #[error("could not read public key at {path}: {source}")]
    KeyMaterial {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

pub type Result<T> = std::result::Result<T, EnvError>;
