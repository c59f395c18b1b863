//! Privileged calls handed off to an off-line signer.

use alloy::primitives::{Address, Bytes};
use bon::Builder;
use serde_json::{Map, Value};
use tracing::info;

use crate::outputs::{DeferredRecord, OutputStore, OutputsError, TransactionRecord};

#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct DeferredTransaction {
    #[builder(into)]
    pub data: Bytes,
    pub description: String,
    pub contract_name: String,
    pub to: Option<Address>,
    pub from: Option<Address>,
    pub params: Option<Value>,
}

impl OutputStore {
    /// Append a deferred record (`id` and `timestamp` null). Never deduplicates.
    pub async fn save_deferred_transaction(
        &self,
        tx: DeferredTransaction,
    ) -> Result<u64, OutputsError> {
        let description = tx.description.clone();
        let key = self
            .append_transaction(TransactionRecord::Deferred(DeferredRecord {
                id: None,
                timestamp: None,
                data: tx.data,
                description: tx.description,
                contract_name: tx.contract_name,
                to: tx.to,
                from: tx.from,
                params: tx.params,
                extra: Map::new(),
            }))
            .await?;
        info!(key, %description, "deferred transaction for multisig");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;
    use serde_json::json;
    use setdeploy_config::{Environment, NetworkKey};

    use super::*;
    use crate::test_utils::scratch_dir;

    #[tokio::test]
    async fn deferred_records_always_append() {
        let dir = scratch_dir();
        let store = OutputStore::new(
            dir.join("1-production.json"),
            NetworkKey::new(1, Environment::Production),
            Some("mainnet"),
        );
        let operator = address!("1111111111111111111111111111111111111111");
        let tx = DeferredTransaction::builder()
            .data(vec![0x12, 0x34])
            .description("BED.BaseManager.setOperator()")
            .contract_name("BaseManager")
            .from(operator)
            .params(json!({ "newOperator": operator }))
            .build();

        assert_eq!(store.save_deferred_transaction(tx.clone()).await.unwrap(), 0);
        assert_eq!(store.save_deferred_transaction(tx).await.unwrap(), 1);

        let outputs = store.read().await.unwrap();
        let deferred: Vec<_> = outputs.deferred().collect();
        assert_eq!(deferred.len(), 2);
        let (_, record) = deferred[0];
        assert_eq!(record.id, None);
        assert_eq!(record.from, Some(operator));
        assert_eq!(record.to, None);
        assert_eq!(record.data, Bytes::from(vec![0x12, 0x34]));
        assert_eq!(record.params, Some(json!({ "newOperator": operator })));
    }
}
