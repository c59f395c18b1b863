use anyhow::Result;
use async_trait::async_trait;
use setdeploy_contract::Chain;
use tracing::info;

use crate::{context::DeployContext, migration::ManagerMigrator, stage::Stage};

/// Moves a SetToken from its legacy `BaseManager` to a `DelegatedManager`.
///
/// The operator multisig acts as the transitional manager and becomes the
/// only operator of the delegated manager.
#[derive(Debug, Clone)]
pub struct ManagerMigration {
    pub id: String,
    pub set_token: String,
    pub operator: String,
    pub methodologist: String,
    pub fee_extension: String,
}

impl ManagerMigration {
    pub fn bed() -> Self {
        Self {
            id: "003_bed_manager_migrations".into(),
            set_token: "BED".into(),
            operator: "BED_OPERATOR_V1".into(),
            methodologist: "BED_METHODOLOGIST".into(),
            fee_extension: "BED_FEE_EXTENSION_V1".into(),
        }
    }
}

#[async_trait]
impl<C: Chain> Stage<C> for ManagerMigration {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, cx: &DeployContext<C>) -> Result<()> {
        let migrator = ManagerMigrator::new(cx).await?;

        let set_token = cx.require_dependency(&self.set_token).await?;
        let operator = cx.require_dependency(&self.operator).await?;
        let methodologist = cx.require_dependency(&self.methodologist).await?;
        let fee_extension = cx.require_dependency(&self.fee_extension).await?;

        migrator
            .impersonate_multisigs(&[operator, methodologist])
            .await?;

        let transitional_manager = operator;
        let delegated_operators = vec![operator];

        migrator
            .transfer_set_to_transitional_manager(transitional_manager, set_token)
            .await?;
        migrator
            .create_delegated_manager(
                transitional_manager,
                set_token,
                operator,
                methodologist,
                delegated_operators,
            )
            .await?;

        // recorded by create, the factory forgets it on initialize
        let delegated_manager = migrator.delegated_manager_address(set_token).await?;
        info!(set = %self.set_token, %delegated_manager, "delegated manager");

        migrator
            .initialize_manager(transitional_manager, fee_extension, set_token)
            .await?;
        migrator
            .transfer_set_to_delegated_manager(transitional_manager, delegated_manager, set_token)
            .await?;
        Ok(())
    }
}
