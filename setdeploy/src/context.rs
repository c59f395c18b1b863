use alloy::primitives::{Address, Bytes, TxHash};
use anyhow::{Context, Result, anyhow};
use bon::Builder;
use serde_json::Value;
use setdeploy_config::{DependencyTable, Environment};
use setdeploy_contract::{ArtifactStore, Chain};
use tracing::{info, warn};

use crate::{
    deferred::DeferredTransaction,
    outputs::{OutputStore, OutputsError},
    policy::{Authority, ExecutionMode, ExecutionPolicy},
    resolver::Resolver,
};

/// Everything a deployment stage works with.
pub struct DeployContext<C> {
    pub chain: C,
    pub store: OutputStore,
    pub dependencies: DependencyTable,
    pub artifacts: ArtifactStore,
    pub policy: ExecutionPolicy,
}

/// A call that needs a privileged signer.
#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct PrivilegedCall {
    pub from: Address,
    pub to: Address,
    #[builder(into)]
    pub data: Bytes,
    pub description: String,
    pub contract_name: String,
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Executed(TxHash),
    /// Appended to the deferred log under this key.
    Deferred(u64),
    /// Nothing to do, the chain is already in the target state.
    Skipped,
}

impl<C: Chain> DeployContext<C> {
    pub fn new(
        chain: C,
        store: OutputStore,
        dependencies: DependencyTable,
        artifacts: ArtifactStore,
        testing_production: bool,
    ) -> Self {
        let policy = ExecutionPolicy::new(store.network().environment, testing_production);
        Self {
            chain,
            store,
            dependencies,
            artifacts,
            policy,
        }
    }

    pub fn deployer(&self) -> Address {
        self.chain.deployer()
    }

    pub fn environment(&self) -> Environment {
        self.policy.environment
    }

    pub fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.dependencies, &self.store)
    }

    pub async fn find_dependency(&self, name: &str) -> Result<Option<Address>> {
        Ok(self.resolver().resolve(name).await?)
    }

    pub async fn require_dependency(&self, name: &str) -> Result<Address> {
        self.find_dependency(name).await?.ok_or_else(|| {
            anyhow!(
                "dependency {name} is not resolved on {}",
                self.store.network()
            )
        })
    }

    /// Start of a deployment run: development networks start from a clean
    /// document, every network gets its document created.
    pub async fn prepare(&self) -> Result<()> {
        if self.environment().is_development() {
            match self.store.remove_network().await {
                Ok(()) => {}
                Err(OutputsError::NothingToWipe(_)) => info!("no addresses to wipe"),
                Err(err) => return Err(err.into()),
            }
        }
        self.store.check_network_id().await?;
        self.store.ensure().await?;
        Ok(())
    }

    pub fn mode(&self, authority: Authority) -> ExecutionMode {
        self.policy.resolve(authority, self.deployer())
    }

    /// Send `call` now or append it to the deferred log, depending on `mode`.
    pub async fn execute_or_defer(
        &self,
        mode: ExecutionMode,
        call: PrivilegedCall,
    ) -> Result<Outcome> {
        match mode {
            ExecutionMode::Execute => {
                let tx_hash = self
                    .chain
                    .send(call.from, call.to, call.data)
                    .await
                    .with_context(|| format!("failed to execute {}", call.description))?;
                self.store
                    .save_transaction(&tx_hash.to_string(), &call.description)
                    .await?;
                info!(%tx_hash, description = %call.description, "executed");
                Ok(Outcome::Executed(tx_hash))
            }
            ExecutionMode::Defer => {
                if self.policy.testing_production {
                    warn!(description = %call.description, "testing production, deferring");
                }
                let tx = DeferredTransaction {
                    data: call.data,
                    description: call.description,
                    contract_name: call.contract_name,
                    to: Some(call.to),
                    from: Some(call.from),
                    params: call.params,
                };
                let key = self.store.save_deferred_transaction(tx).await?;
                Ok(Outcome::Deferred(key))
            }
        }
    }

    /// Send a call signed by the deployer and record it.
    pub async fn send_as_deployer(
        &self,
        to: Address,
        data: Bytes,
        description: &str,
    ) -> Result<TxHash> {
        let tx_hash = self
            .chain
            .send(self.deployer(), to, data)
            .await
            .with_context(|| format!("failed to execute {description}"))?;
        self.store
            .save_transaction(&tx_hash.to_string(), description)
            .await?;
        info!(%tx_hash, %description, "executed");
        Ok(tx_hash)
    }
}
