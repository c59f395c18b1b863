//! Address lookup: the static dependency table first, then the addresses
//! deployed by earlier stages.

use alloy::primitives::Address;
use setdeploy_config::{DependencyTable, StaticLookup};
use tracing::trace;

use crate::outputs::{OutputStore, OutputsError};

#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    table: &'a DependencyTable,
    store: &'a OutputStore,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a DependencyTable, store: &'a OutputStore) -> Self {
        Self { table, store }
    }

    /// `None` when neither source knows the name. A per-environment entry
    /// without a value for the active environment is final and does not
    /// fall back to deployed addresses.
    pub async fn resolve(&self, name: &str) -> Result<Option<Address>, OutputsError> {
        let network = self.store.network();
        match self
            .table
            .lookup(name, network.network_id, network.environment)
        {
            StaticLookup::Resolved(address) => {
                trace!(%name, %address, "static dependency");
                Ok(Some(address))
            }
            StaticLookup::Unset => Ok(None),
            StaticLookup::Missing => self.store.contract_address(name).await,
        }
    }

    /// [`Resolver::resolve`] in the persisted string form, `""` for unknown.
    pub async fn resolve_or_empty(&self, name: &str) -> Result<String, OutputsError> {
        Ok(self
            .resolve(name)
            .await?
            .map(|a| a.to_string())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;
    use setdeploy_config::{Environment, NetworkKey};
    use setdeploy_contract::testing::ScratchDir;

    use super::*;
    use crate::{outputs::DeploymentOutputs, test_utils::scratch_dir};

    const STAGING: Address = address!("1111111111111111111111111111111111111111");
    const PRODUCTION: Address = address!("2222222222222222222222222222222222222222");
    const DEPLOYED: Address = address!("3333333333333333333333333333333333333333");
    const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

    fn table() -> DependencyTable {
        DependencyTable::default()
            .with_address("USDC", 1, Some(USDC))
            .with_address("BLANK", 1, None)
            .with_variants(
                "BED",
                1,
                [
                    (Environment::Staging, Some(STAGING)),
                    (Environment::Production, Some(PRODUCTION)),
                ],
            )
            .with_variants("DPI", 1, [(Environment::Production, Some(PRODUCTION))])
    }

    async fn store_with_deployed(env: Environment) -> (ScratchDir, OutputStore) {
        let dir = scratch_dir();
        let store = OutputStore::new(
            dir.join("outputs.json"),
            NetworkKey::new(1, env),
            Some("mainnet"),
        );
        let mut outputs: DeploymentOutputs = store.empty();
        for name in ["BLANK", "DPI", "LOCAL", "USDC"] {
            outputs.addresses.insert(name.into(), DEPLOYED.to_string());
        }
        store.write(&outputs).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn static_entries_win() {
        let table = table();
        let (_dir, store) = store_with_deployed(Environment::Production).await;
        let resolver = Resolver::new(&table, &store);

        assert_eq!(resolver.resolve("USDC").await.unwrap(), Some(USDC));
        assert_eq!(resolver.resolve("BED").await.unwrap(), Some(PRODUCTION));
        assert_eq!(resolver.resolve("LOCAL").await.unwrap(), Some(DEPLOYED));
        // blank plain entry falls back to the deployed address
        assert_eq!(resolver.resolve("BLANK").await.unwrap(), Some(DEPLOYED));
        assert_eq!(resolver.resolve("UNKNOWN").await.unwrap(), None);
        assert_eq!(resolver.resolve_or_empty("UNKNOWN").await.unwrap(), "");
    }

    #[tokio::test]
    async fn development_uses_staging_variant() {
        let table = table();
        let (_dev_dir, dev) = store_with_deployed(Environment::Development).await;
        let (_staging_dir, staging) = store_with_deployed(Environment::Staging).await;

        for store in [&dev, &staging] {
            let resolver = Resolver::new(&table, store);
            assert_eq!(resolver.resolve("BED").await.unwrap(), Some(STAGING));
            // per-environment entry without a staging value does not fall back
            assert_eq!(resolver.resolve("DPI").await.unwrap(), None);
        }
    }
}
