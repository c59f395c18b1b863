use anyhow::Result;
use async_trait::async_trait;
use setdeploy_contract::Chain;

use crate::{
    actions::{CONTROLLER, DeploySpec},
    context::DeployContext,
    stage::Stage,
};

use super::{WETH, ZERO_EX_EXCHANGE};

pub const EXCHANGE_ISSUANCE_ZERO_EX: &str = "ExchangeIssuanceZeroEx";

pub struct ExchangeIssuanceZeroEx;

#[async_trait]
impl<C: Chain> Stage<C> for ExchangeIssuanceZeroEx {
    fn id(&self) -> &str {
        "001_exchange_issuance_zero_ex"
    }

    async fn run(&self, cx: &DeployContext<C>) -> Result<()> {
        let weth = cx.require_dependency(WETH).await?;
        let controller = cx.require_dependency(CONTROLLER).await?;
        let exchange = cx.require_dependency(ZERO_EX_EXCHANGE).await?;
        cx.deploy_once(
            DeploySpec::builder()
                .name(EXCHANGE_ISSUANCE_ZERO_EX)
                .contract(EXCHANGE_ISSUANCE_ZERO_EX)
                .args(vec![
                    weth.to_string(),
                    controller.to_string(),
                    exchange.to_string(),
                ])
                .build(),
        )
        .await?;
        Ok(())
    }
}
