//! Built-in deployment stages, per network.

mod exchange_issuance;
mod issuance_module;
mod manager_migration;

use anyhow::{Result, bail};
use setdeploy_contract::Chain;

pub use exchange_issuance::ExchangeIssuanceZeroEx;
pub use issuance_module::IssuanceModule;
pub use manager_migration::ManagerMigration;

use crate::stage::Pipeline;

pub const WETH: &str = "WETH";
pub const ZERO_EX_EXCHANGE: &str = "ZERO_EX_EXCHANGE";

/// Stages deployed to Ethereum mainnet and its forks.
pub fn mainnet<C: Chain>() -> Result<Pipeline<C>> {
    Pipeline::new()
        .stage(ExchangeIssuanceZeroEx)?
        .stage(IssuanceModule)?
        .stage(ManagerMigration::bed())
}

pub fn for_network<C: Chain>(network_id: u64) -> Result<Pipeline<C>> {
    match network_id {
        1 => mainnet(),
        other => bail!("no deployment stages for network {other}"),
    }
}
