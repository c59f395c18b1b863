//! Per-network deployment state.
//!
//! Every network key (`{network_id}-{environment}`) owns one JSON document
//! with three namespaces:
//!
//! ```json
//! {
//!   "state": { "network_key": "1-production", "last_deployment_stage": 3 },
//!   "addresses": { "BED_MANAGER": "0x…" },
//!   "transactions": { "0": { "id": "0x…", "timestamp": 1650000000000, "description": "…" } }
//! }
//! ```
//!
//! An empty address string means "not deployed".

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use alloy::primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use setdeploy_config::{DependencyTable, DeploymentConfig, NetworkKey};
use tracing::{debug, warn};

pub const LAST_DEPLOYMENT_STAGE: &str = "last_deployment_stage";

#[derive(Debug, thiserror::Error)]
pub enum OutputsError {
    #[error("failed to access {0:?}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("malformed deployment outputs {0:?}: {1}")]
    Json(PathBuf, #[source] serde_json::Error),

    #[error("invalid address {value:?} recorded for {name}")]
    Address { name: String, value: String },

    #[error("outputs {path:?} belong to network {found}, expected {expected}")]
    NetworkMismatch {
        path: PathBuf,
        found: u64,
        expected: u64,
    },

    #[error("no addresses to wipe at {0:?}")]
    NothingToWipe(PathBuf),
}

/// A contract created by the deployer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub id: String,
    pub name: String,
    pub timestamp: i64,
    pub verified: bool,
    pub description: String,
    pub contract_address: Address,
    #[serde(default)]
    pub constructor_args: Vec<Value>,
    #[serde(default)]
    pub libraries: BTreeMap<String, Address>,
    /// Artifact the contract was built from, when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    /// Fields written by other tools, kept on rewrite.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A privileged call the deployer could not sign, kept for a multisig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredRecord {
    pub id: Option<String>,
    pub timestamp: Option<i64>,
    pub data: Bytes,
    pub description: String,
    pub contract_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainRecord {
    pub id: String,
    pub timestamp: i64,
    pub description: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransactionRecord {
    Deployment(DeploymentRecord),
    Deferred(DeferredRecord),
    Plain(PlainRecord),
}

impl TransactionRecord {
    pub fn description(&self) -> &str {
        match self {
            Self::Deployment(r) => &r.description,
            Self::Deferred(r) => &r.description,
            Self::Plain(r) => &r.description,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentOutputs {
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub addresses: BTreeMap<String, String>,
    #[serde(default)]
    pub transactions: BTreeMap<u64, TransactionRecord>,
}

impl DeploymentOutputs {
    pub fn address(&self, name: &str) -> Result<Option<Address>, OutputsError> {
        match self.addresses.get(name).map(String::as_str) {
            None | Some("") => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| OutputsError::Address {
                    name: name.to_string(),
                    value: value.to_string(),
                }),
        }
    }

    pub fn next_transaction_key(&self) -> u64 {
        self.transactions
            .last_key_value()
            .map(|(k, _)| k + 1)
            .unwrap_or(0)
    }

    pub fn last_deployment_stage(&self) -> u64 {
        self.state
            .get(LAST_DEPLOYMENT_STAGE)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    pub fn network_id(&self) -> Option<u64> {
        self.state.get("network_id").and_then(Value::as_u64)
    }

    pub fn deferred(&self) -> impl Iterator<Item = (u64, &DeferredRecord)> {
        self.transactions.iter().filter_map(|(k, r)| match r {
            TransactionRecord::Deferred(d) => Some((*k, d)),
            _ => None,
        })
    }
}

/// Reads and writes the outputs document of one network key.
///
/// Every operation re-reads the file and rewrites it in full. There is no
/// locking: concurrent processes on the same network key race and the last
/// write wins.
#[derive(Debug, Clone)]
pub struct OutputStore {
    path: PathBuf,
    network: NetworkKey,
    human_friendly_name: String,
}

impl OutputStore {
    pub fn new<P, S>(path: P, network: NetworkKey, network_name: Option<S>) -> Self
    where
        P: Into<PathBuf>,
        S: AsRef<str>,
    {
        let name: &str = match &network_name {
            Some(n) => n.as_ref(),
            None => "unknown",
        };
        Self {
            path: path.into(),
            network,
            human_friendly_name: format!("{name}-{}", network.environment),
        }
    }

    pub fn for_config(config: &DeploymentConfig, dependencies: &DependencyTable) -> Self {
        Self::new(
            config.outputs_path(),
            config.network,
            dependencies.human_friendly_name(config.network.network_id),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn network(&self) -> NetworkKey {
        self.network
    }

    /// A document with only the network identity filled in.
    pub fn empty(&self) -> DeploymentOutputs {
        let mut state = Map::new();
        state.insert("network_key".into(), self.network.to_string().into());
        state.insert(
            "human_friendly_name".into(),
            self.human_friendly_name.clone().into(),
        );
        state.insert("network_id".into(), self.network.network_id.into());
        DeploymentOutputs {
            state,
            ..Default::default()
        }
    }

    /// The persisted document, or [`OutputStore::empty`] if the file is
    /// missing or has no content yet.
    pub async fn read(&self) -> Result<DeploymentOutputs, OutputsError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = ?self.path, "no deployment outputs yet");
                return Ok(self.empty());
            }
            Err(err) => return Err(OutputsError::Io(self.path.clone(), err)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(self.empty());
        }
        serde_json::from_slice(&bytes).map_err(|e| OutputsError::Json(self.path.clone(), e))
    }

    pub async fn write(&self, outputs: &DeploymentOutputs) -> Result<(), OutputsError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| OutputsError::Io(dir.into(), e))?;
        }
        let mut bytes = serde_json::to_vec_pretty(outputs)
            .map_err(|e| OutputsError::Json(self.path.clone(), e))?;
        bytes.push(b'\n');
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| OutputsError::Io(self.path.clone(), e))
    }

    async fn exists(&self) -> Result<bool, OutputsError> {
        tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| OutputsError::Io(self.path.clone(), e))
    }

    /// Create the document if it does not exist yet.
    pub async fn ensure(&self) -> Result<(), OutputsError> {
        if !self.exists().await? {
            self.write(&self.empty()).await?;
        }
        Ok(())
    }

    /// Reset the document of this network key, dropping all addresses,
    /// transactions and stage progress.
    pub async fn remove_network(&self) -> Result<(), OutputsError> {
        if !self.exists().await? {
            return Err(OutputsError::NothingToWipe(self.path.clone()));
        }
        warn!(network = %self.network, "clearing all addresses");
        self.write(&self.empty()).await
    }

    pub async fn contract_address(&self, name: &str) -> Result<Option<Address>, OutputsError> {
        self.read().await?.address(name)
    }

    /// Append `record` under the next free key and return the key.
    pub async fn append_transaction(
        &self,
        record: TransactionRecord,
    ) -> Result<u64, OutputsError> {
        let mut outputs = self.read().await?;
        let key = outputs.next_transaction_key();
        outputs.transactions.insert(key, record);
        self.write(&outputs).await?;
        Ok(key)
    }

    pub async fn set_state<V: Into<Value>>(&self, key: &str, value: V) -> Result<(), OutputsError> {
        let mut outputs = self.read().await?;
        outputs.state.insert(key.to_string(), value.into());
        self.write(&outputs).await
    }

    pub async fn last_deployment_stage(&self) -> Result<u64, OutputsError> {
        Ok(self.read().await?.last_deployment_stage())
    }

    /// Refuse to touch a document recorded for another chain.
    pub async fn check_network_id(&self) -> Result<(), OutputsError> {
        match self.read().await?.network_id() {
            Some(found) if found != self.network.network_id => Err(OutputsError::NetworkMismatch {
                path: self.path.clone(),
                found,
                expected: self.network.network_id,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;
    use setdeploy_config::Environment;

    use super::*;
    use crate::test_utils::scratch_dir;

    fn store(dir: &Path) -> OutputStore {
        OutputStore::new(
            dir.join("outputs/1-staging.json"),
            NetworkKey::new(1, Environment::Staging),
            Some("mainnet"),
        )
    }

    fn plain(id: &str) -> TransactionRecord {
        TransactionRecord::Plain(PlainRecord {
            id: id.into(),
            timestamp: 1,
            description: "test".into(),
            extra: Map::new(),
        })
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty_document() {
        let dir = scratch_dir();
        let store = store(&dir);

        let outputs = store.read().await.unwrap();
        assert_eq!(outputs.state["network_key"], "1-staging");
        assert_eq!(outputs.state["human_friendly_name"], "mainnet-staging");
        assert_eq!(outputs.state["network_id"], 1);
        assert!(outputs.addresses.is_empty());
        assert!(outputs.transactions.is_empty());
        assert_eq!(outputs.last_deployment_stage(), 0);
        assert!(!store.path().exists());

        tokio::fs::create_dir_all(store.path().parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(store.path(), "").await.unwrap();
        assert_eq!(store.read().await.unwrap(), store.empty());

        tokio::fs::write(store.path(), "{ not json").await.unwrap();
        assert!(matches!(store.read().await, Err(OutputsError::Json(..))));
    }

    #[tokio::test]
    async fn transaction_keys_are_contiguous() {
        let dir = scratch_dir();
        let store = store(&dir);

        for expected in 0..4 {
            let key = store.append_transaction(plain("0x01")).await.unwrap();
            assert_eq!(key, expected);
        }
        let outputs = store.read().await.unwrap();
        assert_eq!(
            outputs.transactions.keys().copied().collect::<Vec<_>>(),
            [0, 1, 2, 3]
        );

        let text = tokio::fs::read_to_string(store.path()).await.unwrap();
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["transactions"]["3"]["id"], "0x01");
    }

    #[tokio::test]
    async fn blank_addresses_are_absent() {
        let dir = scratch_dir();
        let store = store(&dir);
        let manager = address!("1111111111111111111111111111111111111111");

        let mut outputs = store.empty();
        outputs.addresses.insert("BLANK".into(), "".into());
        outputs
            .addresses
            .insert("MANAGER".into(), manager.to_string());
        outputs.addresses.insert("BROKEN".into(), "0x12".into());
        store.write(&outputs).await.unwrap();

        assert_eq!(store.contract_address("MANAGER").await.unwrap(), Some(manager));
        assert_eq!(store.contract_address("BLANK").await.unwrap(), None);
        assert_eq!(store.contract_address("UNKNOWN").await.unwrap(), None);
        assert!(matches!(
            store.contract_address("BROKEN").await,
            Err(OutputsError::Address { .. })
        ));
    }

    #[tokio::test]
    async fn records_keep_their_shape() {
        let dir = scratch_dir();
        let store = store(&dir);
        let deferred = TransactionRecord::Deferred(DeferredRecord {
            id: None,
            timestamp: None,
            data: Bytes::from_static(&[0xde, 0xad]),
            description: "set operator".into(),
            contract_name: "BaseManager".into(),
            to: None,
            from: None,
            params: Some(serde_json::json!({ "newOperator": "0x00" })),
            extra: Map::new(),
        });
        store.append_transaction(deferred.clone()).await.unwrap();
        store.append_transaction(plain("0xabc")).await.unwrap();

        let outputs = store.read().await.unwrap();
        assert_eq!(outputs.transactions[&0], deferred);
        assert_eq!(outputs.transactions[&1], plain("0xabc"));
        assert_eq!(outputs.deferred().count(), 1);

        let json: Value =
            serde_json::from_str(&tokio::fs::read_to_string(store.path()).await.unwrap()).unwrap();
        assert!(json["transactions"]["0"]["id"].is_null());
        assert!(json["transactions"]["0"]["timestamp"].is_null());
        assert_eq!(json["transactions"]["0"]["data"], "0xdead");
        assert_eq!(json["transactions"]["0"]["contractName"], "BaseManager");
        assert!(json["transactions"]["0"].get("to").is_none());
    }

    #[tokio::test]
    async fn unknown_record_fields_survive_rewrite() {
        let dir = scratch_dir();
        let store = store(&dir);
        let manager = address!("1111111111111111111111111111111111111111");
        let document = serde_json::json!({
            "state": { "network_key": "1-staging" },
            "addresses": { "BED_MANAGER": manager.to_string() },
            "transactions": {
                "0": {
                    "id": "0x01",
                    "name": "BED_MANAGER",
                    "timestamp": 1,
                    "verified": true,
                    "description": "Deployed BED_MANAGER",
                    "contractAddress": manager.to_string(),
                    "blockNumber": 12
                },
                "1": { "id": "0x02", "timestamp": 2, "description": "x", "gasUsed": "0x5208" },
                "2": {
                    "id": null,
                    "timestamp": null,
                    "data": "0x1234",
                    "description": "y",
                    "contractName": "BED_MANAGER",
                    "safeNonce": 7
                }
            }
        });
        tokio::fs::create_dir_all(store.path().parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(store.path(), document.to_string())
            .await
            .unwrap();

        let outputs = store.read().await.unwrap();
        match &outputs.transactions[&0] {
            TransactionRecord::Deployment(r) => assert_eq!(r.extra["blockNumber"], 12),
            other => panic!("unexpected record {other:?}"),
        }

        store.append_transaction(plain("0x03")).await.unwrap();
        let json: Value =
            serde_json::from_str(&tokio::fs::read_to_string(store.path()).await.unwrap()).unwrap();
        assert_eq!(json["transactions"]["0"]["blockNumber"], 12);
        assert_eq!(json["transactions"]["1"]["gasUsed"], "0x5208");
        assert_eq!(json["transactions"]["2"]["safeNonce"], 7);
        assert!(json["transactions"]["3"].get("gasUsed").is_none());
    }

    #[tokio::test]
    async fn wipe_and_network_guard() {
        let dir = scratch_dir();
        let store = store(&dir);

        assert!(matches!(
            store.remove_network().await,
            Err(OutputsError::NothingToWipe(_))
        ));

        store.set_state(LAST_DEPLOYMENT_STAGE, 2).await.unwrap();
        store.append_transaction(plain("0x01")).await.unwrap();
        store.check_network_id().await.unwrap();

        store.remove_network().await.unwrap();
        assert_eq!(store.read().await.unwrap(), store.empty());

        let other = OutputStore::new(
            store.path(),
            NetworkKey::new(10, Environment::Staging),
            None::<&str>,
        );
        assert!(matches!(
            other.check_network_id().await,
            Err(OutputsError::NetworkMismatch { found: 1, expected: 10, .. })
        ));
    }
}
