use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use setdeploy::{
    DeployContext, OutputStore,
    scaffold::{ScaffoldError, create_deployment_files},
    stages,
    verify::{EtherscanConfig, EtherscanVerifier, RATE_LIMIT_DELAY, verify_deployments},
};
use setdeploy_config::{
    DependencyTable, DeploymentArgs, DeploymentConfig, REQUIRED_ENV_VARS, load_dotenv,
    validate_env_vars,
};
use setdeploy_contract::{ArtifactStore, Chain, connect};
use setdeploy_utils::types::logging::init_logging;
use tracing::{error, info};
use url::Url;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every unfinished stage of the configured network.
    Deploy {
        #[command(flatten)]
        deployment: DeploymentArgs,
    },
    /// Show the deployment progress of the configured network.
    Status {
        #[command(flatten)]
        deployment: DeploymentArgs,
    },
    /// List the transactions waiting for a multisig.
    Pending {
        #[command(flatten)]
        deployment: DeploymentArgs,
    },
    /// Submit all unverified contracts to the block explorer.
    Verify {
        #[command(flatten)]
        deployment: DeploymentArgs,
        #[command(flatten)]
        etherscan: EtherscanArgs,
        /// Fully qualified name, e.g. `contracts/modules/Foo.sol:Foo`, for
        /// contracts whose name shadows another one.
        contract: Option<String>,
    },
    /// Create the files of a new numbered deployment.
    CreateDeployment {
        /// Deployment name, prefixed with the next stage number unless it
        /// starts with one.
        name: String,
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}

#[derive(Debug, Args)]
struct EtherscanArgs {
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    etherscan_api_key: String,

    #[arg(long, env = "ETHERSCAN_API_URL", default_value = "https://api.etherscan.io/api")]
    etherscan_api_url: Url,
}

async fn load(
    args: DeploymentArgs,
) -> Result<(DeploymentConfig, DependencyTable, OutputStore)> {
    let config = args.resolve()?;
    let dependencies = DependencyTable::read(config.dependencies_path()).await?;
    let store = OutputStore::for_config(&config, &dependencies);
    Ok((config, dependencies, store))
}

async fn deploy<C: Chain>(cx: DeployContext<C>) -> Result<()> {
    let network = cx.store.network();
    let pipeline = stages::for_network::<C>(network.network_id)?;
    info!(%network, deployer = %cx.deployer(), stages = pipeline.ids().count(), "deploying");
    let report = pipeline.run(&cx).await?;
    info!(ran = ?report.ran, skipped = ?report.skipped, "deployment finished");
    Ok(())
}

async fn status(store: &OutputStore) -> Result<()> {
    let outputs = store.read().await?;
    println!("network:          {}", store.network());
    println!("outputs:          {}", store.path().display());
    println!("next stage:       {}", outputs.last_deployment_stage());
    println!("addresses:        {}", outputs.addresses.len());
    println!("transactions:     {}", outputs.transactions.len());
    println!("pending:          {}", outputs.deferred().count());
    for (name, address) in &outputs.addresses {
        println!("  {name:<40} {address}");
    }
    Ok(())
}

async fn pending(store: &OutputStore) -> Result<()> {
    let outputs = store.read().await?;
    for (key, tx) in outputs.deferred() {
        println!("[{key}] {}", tx.description);
        println!("    contract: {}", tx.contract_name);
        if let Some(to) = tx.to {
            println!("    to:       {to}");
        }
        if let Some(from) = tx.from {
            println!("    from:     {from}");
        }
        println!("    data:     {}", tx.data);
        if let Some(params) = &tx.params {
            println!("    params:   {params}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    init_logging();

    match Cli::parse().command {
        Command::Deploy { deployment } => {
            validate_env_vars(REQUIRED_ENV_VARS)?;
            let (config, dependencies, store) = load(deployment).await?;
            let key = config
                .private_key
                .as_deref()
                .ok_or_else(|| anyhow!("deployer private key must be set"))?;
            let chain = connect(key, config.rpc_url.clone()).context("invalid private key")?;
            let cx = DeployContext::new(
                chain,
                store,
                dependencies,
                ArtifactStore::new(&config.artifacts_dir),
                config.testing_production,
            );
            deploy(cx).await?;
        }
        Command::Status { deployment } => {
            let (_, _, store) = load(deployment).await?;
            status(&store).await?;
        }
        Command::Pending { deployment } => {
            let (_, _, store) = load(deployment).await?;
            pending(&store).await?;
        }
        Command::Verify {
            deployment,
            etherscan,
            contract,
        } => {
            let (config, _, store) = load(deployment).await?;
            let etherscan = EtherscanConfig::builder()
                .api_url(etherscan.etherscan_api_url)
                .api_key(etherscan.etherscan_api_key)
                .maybe_contract(contract)
                .build();
            let verifier =
                EtherscanVerifier::new(etherscan, ArtifactStore::new(&config.artifacts_dir))?;
            let report = verify_deployments(&store, &verifier, RATE_LIMIT_DELAY).await?;
            info!(
                verified = report.verified.len(),
                failed = report.failed.len(),
                "verification done"
            );
        }
        Command::CreateDeployment { name, root } => match create_deployment_files(&root, &name) {
            Ok(files) => {
                println!("new deployment files at:");
                for f in files {
                    println!("> {}", f.display());
                }
            }
            Err(err @ ScaffoldError::Exists(_)) => {
                error!(%err, "refusing to overwrite");
                exit(1)
            }
            Err(err) => return Err(err.into()),
        },
    }

    Ok(())
}
