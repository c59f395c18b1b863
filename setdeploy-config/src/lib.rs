mod dependencies;
mod deployment;
mod env_vars;
mod environment;

use std::path::{Path, PathBuf};

pub use dependencies::{DependencyAddress, DependencyEntry, DependencyTable, StaticLookup};
pub use deployment::{DeploymentArgs, DeploymentConfig, DeploymentConfigBuilder};
pub use env_vars::{REQUIRED_ENV_VARS, load_dotenv, validate_env_vars};
pub use environment::{Environment, NetworkKey};

use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config error {0}: {1}")]
    File(PathBuf, #[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("missing environment variables: {}", .0.join(", "))]
    MissingEnvVars(Vec<String>),

    #[error("network constant must be defined")]
    MissingNetworkConstant,

    #[error("unknown environment {0:?}, expected development, staging or production")]
    UnknownEnvironment(String),
}

pub(crate) async fn read_toml<T, P>(path: P) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let s = tokio::fs::read_to_string(path.as_ref())
        .await
        .map_err(|e| ConfigError::File(path.as_ref().into(), Box::new(e)))?;
    toml::from_str(&s).map_err(|e| ConfigError::File(path.as_ref().into(), Box::new(e)))
}
