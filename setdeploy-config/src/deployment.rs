use std::path::PathBuf;

use bon::Builder;
use clap::Args;
use url::Url;

use crate::{ConfigError, Environment, NetworkKey};

/// Deployment settings, read from the command line or the environment.
#[derive(Clone, Debug, Args)]
pub struct DeploymentArgs {
    /// Chain id of the target network.
    #[arg(long, env = "DEPLOYMENT_NETWORK_ID")]
    pub network_id: u64,

    /// Network constant: development, staging or production.
    #[arg(long, env = "DEPLOYMENT_CONSTANT")]
    pub constant: Option<Environment>,

    /// Hex encoded private key of the deployer.
    #[arg(long, env = "DEPLOYMENT_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    #[arg(long, env = "DEPLOYMENT_RPC_URL", default_value = "http://127.0.0.1:8545")]
    pub rpc_url: Url,

    /// Treat the run as production: every privileged call is deferred.
    #[arg(long, env = "TESTING_PRODUCTION")]
    pub testing_production: bool,

    #[arg(long, default_value = "deployments")]
    pub deployments_dir: PathBuf,

    #[arg(long, default_value = "artifacts")]
    pub artifacts_dir: PathBuf,
}

impl DeploymentArgs {
    pub fn resolve(self) -> Result<DeploymentConfig, ConfigError> {
        let environment = self.constant.ok_or(ConfigError::MissingNetworkConstant)?;
        Ok(DeploymentConfig {
            network: NetworkKey::new(self.network_id, environment),
            private_key: self.private_key,
            rpc_url: self.rpc_url,
            testing_production: self.testing_production,
            deployments_dir: self.deployments_dir,
            artifacts_dir: self.artifacts_dir,
        })
    }
}

#[derive(Debug, Clone, Builder)]
pub struct DeploymentConfig {
    pub network: NetworkKey,
    pub private_key: Option<String>,
    pub rpc_url: Url,
    #[builder(default)]
    pub testing_production: bool,
    #[builder(default = PathBuf::from("deployments"))]
    pub deployments_dir: PathBuf,
    #[builder(default = PathBuf::from("artifacts"))]
    pub artifacts_dir: PathBuf,
}

impl DeploymentConfig {
    pub fn environment(&self) -> Environment {
        self.network.environment
    }

    /// `{deployments_dir}/outputs/{network_id}-{environment}.json`
    pub fn outputs_path(&self) -> PathBuf {
        self.deployments_dir
            .join("outputs")
            .join(format!("{}.json", self.network))
    }

    pub fn dependencies_path(&self) -> PathBuf {
        self.deployments_dir.join("dependencies.toml")
    }
}
