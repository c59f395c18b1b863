use anyhow::Result;
use async_trait::async_trait;
use setdeploy_contract::Chain;

use crate::{
    actions::{CONTROLLER, DeploySpec},
    context::DeployContext,
    stage::Stage,
};

pub const DEBT_ISSUANCE_MODULE_V2: &str = "DebtIssuanceModuleV2";

/// Deploys the debt issuance module and registers it with the controller.
pub struct IssuanceModule;

#[async_trait]
impl<C: Chain> Stage<C> for IssuanceModule {
    fn id(&self) -> &str {
        "002_issuance_module"
    }

    async fn run(&self, cx: &DeployContext<C>) -> Result<()> {
        let controller = cx.require_dependency(CONTROLLER).await?;
        cx.deploy_once(
            DeploySpec::builder()
                .name(DEBT_ISSUANCE_MODULE_V2)
                .contract(DEBT_ISSUANCE_MODULE_V2)
                .args(vec![controller.to_string()])
                .build(),
        )
        .await?;
        cx.enable_module_on_controller(DEBT_ISSUANCE_MODULE_V2, false)
            .await?;
        Ok(())
    }
}
