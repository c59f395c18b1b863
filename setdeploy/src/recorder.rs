//! Records deployments and plain transactions in the outputs document.

use std::collections::BTreeMap;

use alloy::primitives::Address;
use bon::Builder;
use serde_json::{Map, Value};
use setdeploy_utils::time::now_millis;
use tracing::{debug, info};

use crate::outputs::{
    DeploymentRecord, OutputStore, OutputsError, PlainRecord, TransactionRecord,
};

#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct ContractDeployment {
    /// Logical name the address is stored under.
    pub name: String,
    pub contract_address: Address,
    /// Hash of the creation transaction.
    pub transaction_id: String,
    pub description: String,
    #[builder(default)]
    pub constructor_args: Vec<Value>,
    #[builder(default)]
    pub libraries: BTreeMap<String, Address>,
    /// Artifact name, if different from `name`.
    pub contract: Option<String>,
}

impl OutputStore {
    /// Store the address and a deployment record, unless `name` is already
    /// recorded. Returns `false` for the no-op case.
    pub async fn save_contract_deployment(
        &self,
        deployment: ContractDeployment,
    ) -> Result<bool, OutputsError> {
        let mut outputs = self.read().await?;
        if outputs.address(&deployment.name)?.is_some() {
            debug!(name = %deployment.name, "deployment already recorded");
            return Ok(false);
        }
        outputs.addresses.insert(
            deployment.name.clone(),
            deployment.contract_address.to_string(),
        );
        let key = outputs.next_transaction_key();
        outputs.transactions.insert(
            key,
            TransactionRecord::Deployment(DeploymentRecord {
                id: deployment.transaction_id,
                name: deployment.name.clone(),
                timestamp: now_millis(),
                verified: false,
                description: deployment.description,
                contract_address: deployment.contract_address,
                constructor_args: deployment.constructor_args,
                libraries: deployment.libraries,
                contract: deployment.contract,
                extra: Map::new(),
            }),
        );
        self.write(&outputs).await?;
        info!(name = %deployment.name, address = %deployment.contract_address, key, "recorded deployment");
        Ok(true)
    }

    /// Like [`OutputStore::save_contract_deployment`] but with a plain
    /// transaction record, for addresses that are not verifiable deployments.
    pub async fn save_contract_and_transaction(
        &self,
        name: &str,
        address: Address,
        transaction_id: &str,
        description: &str,
    ) -> Result<bool, OutputsError> {
        let mut outputs = self.read().await?;
        if outputs.address(name)?.is_some() {
            debug!(%name, "address already recorded");
            return Ok(false);
        }
        outputs.addresses.insert(name.to_string(), address.to_string());
        let key = outputs.next_transaction_key();
        outputs
            .transactions
            .insert(key, plain_record(transaction_id, description));
        self.write(&outputs).await?;
        Ok(true)
    }

    /// Record an address that no transaction of ours created, such as a
    /// contract deployed by a factory. Returns false if `name` is taken.
    pub async fn save_address(&self, name: &str, address: Address) -> Result<bool, OutputsError> {
        let mut outputs = self.read().await?;
        if outputs.address(name)?.is_some() {
            debug!(%name, "address already recorded");
            return Ok(false);
        }
        outputs.addresses.insert(name.to_string(), address.to_string());
        self.write(&outputs).await?;
        info!(%name, %address, "recorded address");
        Ok(true)
    }

    /// Append a plain transaction record and return its key.
    pub async fn save_transaction(
        &self,
        transaction_id: &str,
        description: &str,
    ) -> Result<u64, OutputsError> {
        let key = self
            .append_transaction(plain_record(transaction_id, description))
            .await?;
        debug!(%transaction_id, key, "recorded transaction");
        Ok(key)
    }
}

fn plain_record(id: &str, description: &str) -> TransactionRecord {
    TransactionRecord::Plain(PlainRecord {
        id: id.to_string(),
        timestamp: now_millis(),
        description: description.to_string(),
        extra: Map::new(),
    })
}
