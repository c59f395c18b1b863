//! Deployment steps shared by stages: idempotent contract deployment,
//! privileged configuration calls and module initialization.
//!
//! Privileged helpers read the current on-chain holder of the role first and
//! let the [`ExecutionPolicy`](crate::policy::ExecutionPolicy) decide whether
//! the deployer sends the call or it is deferred to a multisig. Helpers whose
//! target state is already reached return [`Outcome::Skipped`].

use std::collections::BTreeMap;

use alloy::{
    primitives::{Address, TxHash, U256, keccak256},
    sol_types::SolCall,
};
use anyhow::{Context, Result, bail, ensure};
use bon::Builder;
use serde_json::{Value, json};
use setdeploy_contract::{
    Chain, IBaseExtension, IBaseManager, IController, IDebtIssuanceModule, IGeneralIndexModule,
    ISetToken, IStreamingFeeModule, read,
};
use tracing::{debug, info};

use crate::{
    context::{DeployContext, Outcome, PrivilegedCall},
    policy::Authority,
    recorder::ContractDeployment,
};

pub const CONTROLLER: &str = "CONTROLLER";
pub const GENERAL_INDEX_MODULE: &str = "GENERAL_INDEX_MODULE";
pub const DEBT_ISSUANCE_MODULE: &str = "DEBT_ISSUANCE_MODULE";
pub const STREAMING_FEE_MODULE: &str = "STREAMING_FEE_MODULE";
pub const GOVERNANCE_MODULE: &str = "GOVERNANCE_MODULE";

/// 5%, the highest issuance or redemption fee a manager may set.
pub const MAX_MANAGER_FEE: U256 = U256::from_limbs([50_000_000_000_000_000, 0, 0, 0]);
/// 40%, the highest streaming fee a manager may set.
pub const MAX_STREAMING_FEE: U256 = U256::from_limbs([400_000_000_000_000_000, 0, 0, 0]);

/// A contract to deploy from its build artifact.
#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct DeploySpec {
    /// Name the address is recorded under.
    pub name: String,
    /// Artifact to deploy.
    pub contract: String,
    /// Constructor arguments in their string form.
    #[builder(default)]
    pub args: Vec<String>,
    #[builder(default)]
    pub libraries: BTreeMap<String, Address>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebtIssuanceSettings {
    pub issue_fee: U256,
    pub redeem_fee: U256,
    pub fee_recipient: Address,
    pub issuance_hook: Address,
}

/// How streaming and issuance fees are split between operator and methodologist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    /// Operator share, scaled by 1e18.
    pub operator_share: U256,
    pub operator_fee_recipient: Address,
}

/// An extension deployed for a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstalledExtension {
    pub address: Address,
    /// Result of adding the extension to its manager.
    pub added: Outcome,
}

impl<C: Chain> DeployContext<C> {
    /// Deploy `spec` unless its name already has an address.
    pub async fn deploy_once(&self, spec: DeploySpec) -> Result<Address> {
        if let Some(address) = self.store.contract_address(&spec.name).await? {
            debug!(name = %spec.name, %address, "already deployed");
            return Ok(address);
        }
        let artifact = self.artifacts.artifact(&spec.contract).await?;
        let code = artifact
            .creation_code(&spec.libraries, &spec.args)
            .with_context(|| format!("failed to build creation code of {}", spec.name))?;
        let deployed = self
            .chain
            .deploy(&spec.name, code)
            .await
            .with_context(|| format!("failed to deploy {}", spec.name))?;

        let description = spec
            .description
            .unwrap_or_else(|| format!("Deployed {}", spec.name));
        let contract = (spec.contract != spec.name).then_some(spec.contract);
        self.store
            .save_contract_deployment(ContractDeployment {
                name: spec.name,
                contract_address: deployed.address,
                transaction_id: deployed.tx_hash.to_string(),
                description,
                constructor_args: spec.args.into_iter().map(Value::from).collect(),
                libraries: spec.libraries,
                contract,
            })
            .await?;
        Ok(deployed.address)
    }

    pub async fn deploy_base_manager(
        &self,
        manager_name: &str,
        set_token_name: &str,
        operator: Address,
        methodologist: Address,
    ) -> Result<Address> {
        let set_token = self.require_dependency(set_token_name).await?;
        self.deploy_once(
            DeploySpec::builder()
                .name(manager_name)
                .contract("BaseManager")
                .args(vec![
                    set_token.to_string(),
                    operator.to_string(),
                    methodologist.to_string(),
                ])
                .build(),
        )
        .await
    }

    /// Deploy an extension for `manager_name` and register it there.
    async fn install_extension(
        &self,
        manager_name: &str,
        spec: DeploySpec,
    ) -> Result<InstalledExtension> {
        let name = spec.name.clone();
        let address = self.deploy_once(spec).await?;
        let added = self.add_extension(manager_name, &name).await?;
        Ok(InstalledExtension { address, added })
    }

    pub async fn deploy_governance_extension(
        &self,
        extension_name: &str,
        manager_name: &str,
    ) -> Result<InstalledExtension> {
        let manager = self.require_dependency(manager_name).await?;
        let module = self.require_dependency(GOVERNANCE_MODULE).await?;
        let spec = DeploySpec::builder()
            .name(extension_name)
            .contract("GovernanceExtension")
            .args(vec![manager.to_string(), module.to_string()])
            .build();
        self.install_extension(manager_name, spec).await
    }

    pub async fn deploy_streaming_fee_extension(
        &self,
        extension_name: &str,
        manager_name: &str,
        split: FeeSplit,
    ) -> Result<InstalledExtension> {
        let manager = self.require_dependency(manager_name).await?;
        let module = self.require_dependency(STREAMING_FEE_MODULE).await?;
        let spec = DeploySpec::builder()
            .name(extension_name)
            .contract("StreamingFeeSplitExtension")
            .args(vec![
                manager.to_string(),
                module.to_string(),
                split.operator_share.to_string(),
                split.operator_fee_recipient.to_string(),
            ])
            .build();
        self.install_extension(manager_name, spec).await
    }

    /// Fee split over the streaming fee module and the issuance module
    /// `issuance_module_name`.
    pub async fn deploy_fee_extension(
        &self,
        extension_name: &str,
        manager_name: &str,
        issuance_module_name: &str,
        split: FeeSplit,
    ) -> Result<InstalledExtension> {
        let manager = self.require_dependency(manager_name).await?;
        let streaming = self.require_dependency(STREAMING_FEE_MODULE).await?;
        let issuance = self.require_dependency(issuance_module_name).await?;
        let spec = DeploySpec::builder()
            .name(extension_name)
            .contract("FeeSplitExtension")
            .args(vec![
                manager.to_string(),
                streaming.to_string(),
                issuance.to_string(),
                split.operator_share.to_string(),
                split.operator_fee_recipient.to_string(),
            ])
            .build();
        self.install_extension(manager_name, spec).await
    }

    pub async fn deploy_gim_extension(
        &self,
        extension_name: &str,
        manager_name: &str,
    ) -> Result<InstalledExtension> {
        let manager = self.require_dependency(manager_name).await?;
        let module = self.require_dependency(GENERAL_INDEX_MODULE).await?;
        let spec = DeploySpec::builder()
            .name(extension_name)
            .contract("GIMExtension")
            .args(vec![manager.to_string(), module.to_string()])
            .build();
        self.install_extension(manager_name, spec).await
    }

    /// Development stand-in for an external contract that does not exist on
    /// the local network. The address is derived from the name.
    pub async fn ensure_mock_dependency(&self, name: &str, description: &str) -> Result<Address> {
        if let Some(address) = self.find_dependency(name).await? {
            return Ok(address);
        }
        ensure!(
            self.environment().is_development(),
            "dependency {name} is missing on {}, mocks are only written on development networks",
            self.store.network()
        );
        let mock = Address::from_word(keccak256(name.as_bytes()));
        self.store
            .save_contract_and_transaction(name, mock, "0x", description)
            .await?;
        info!(%name, address = %mock, "mocked dependency");
        Ok(mock)
    }

    pub async fn add_extension(
        &self,
        manager_name: &str,
        extension_name: &str,
    ) -> Result<Outcome> {
        let manager = self.require_dependency(manager_name).await?;
        let extension = self.require_dependency(extension_name).await?;
        let is_adapter = IBaseManager::isAdapterCall { adapter: extension };
        if read(&self.chain, manager, is_adapter).await? {
            debug!(%manager_name, %extension_name, "extension already added");
            return Ok(Outcome::Skipped);
        }
        let operator = read(&self.chain, manager, IBaseManager::operatorCall {}).await?;
        let call = PrivilegedCall::builder()
            .from(operator)
            .to(manager)
            .data(IBaseManager::addAdapterCall { adapter: extension }.abi_encode())
            .description(format!("Add {extension_name} on {manager_name}"))
            .contract_name(manager_name)
            .params(json!({ "adapter": extension }))
            .build();
        self.execute_or_defer(self.mode(Authority::Holder(operator)), call)
            .await
    }

    pub async fn set_operator(&self, manager_name: &str, new_operator: Address) -> Result<Outcome> {
        let manager = self.require_dependency(manager_name).await?;
        let current = read(&self.chain, manager, IBaseManager::operatorCall {}).await?;
        if current == new_operator {
            debug!(%manager_name, %new_operator, "operator already set");
            return Ok(Outcome::Skipped);
        }
        let call = PrivilegedCall::builder()
            .from(current)
            .to(manager)
            .data(IBaseManager::setOperatorCall { newOperator: new_operator }.abi_encode())
            .description(format!("{new_operator} set as operator on {manager_name}"))
            .contract_name(manager_name)
            .params(json!({ "newOperator": new_operator }))
            .build();
        self.execute_or_defer(self.mode(Authority::Holder(current)), call)
            .await
    }

    pub async fn add_approved_caller(
        &self,
        extension_name: &str,
        callers: Vec<Address>,
        statuses: Vec<bool>,
    ) -> Result<Outcome> {
        if callers.len() != statuses.len() {
            bail!(
                "{} callers but {} statuses for {extension_name}",
                callers.len(),
                statuses.len()
            )
        }
        let extension = self.require_dependency(extension_name).await?;
        let manager = read(&self.chain, extension, IBaseExtension::managerCall {}).await?;
        let operator = read(&self.chain, manager, IBaseManager::operatorCall {}).await?;
        let params = json!({ "callers": callers, "statuses": statuses });
        let call = PrivilegedCall::builder()
            .from(operator)
            .to(extension)
            .data(IBaseExtension::updateCallerStatusCall { callers, statuses }.abi_encode())
            .description(format!("{extension_name} caller statuses updated."))
            .contract_name(extension_name)
            .params(params)
            .build();
        self.execute_or_defer(self.mode(Authority::Holder(operator)), call)
            .await
    }

    /// Hand the SetToken over to the manager contract `manager_name`.
    pub async fn update_set_manager(
        &self,
        set_token_name: &str,
        manager_name: &str,
    ) -> Result<Outcome> {
        let set_token = self.require_dependency(set_token_name).await?;
        let new_manager = self.require_dependency(manager_name).await?;
        let current = read(&self.chain, set_token, ISetToken::managerCall {}).await?;
        if current == new_manager {
            debug!(%set_token_name, %manager_name, "manager already set");
            return Ok(Outcome::Skipped);
        }
        let call = PrivilegedCall::builder()
            .from(current)
            .to(set_token)
            .data(ISetToken::setManagerCall { manager: new_manager }.abi_encode())
            .description(format!("Set {manager_name} contract as {set_token_name} Manager"))
            .contract_name(set_token_name)
            .params(json!({ "newManager": new_manager }))
            .build();
        self.execute_or_defer(self.mode(Authority::Holder(current)), call)
            .await
    }

    /// Restrict `module_name` on the manager to the given extensions.
    pub async fn protect_module(
        &self,
        manager_name: &str,
        module_name: &str,
        extension_names: &[&str],
    ) -> Result<Outcome> {
        let manager = self.require_dependency(manager_name).await?;
        let module = self.require_dependency(module_name).await?;
        let mut extensions = Vec::with_capacity(extension_names.len());
        for name in extension_names {
            extensions.push(self.require_dependency(name).await?);
        }
        let protected = IBaseManager::protectedModulesCall { module };
        if read(&self.chain, manager, protected).await? {
            debug!(%manager_name, %module_name, "module already protected");
            return Ok(Outcome::Skipped);
        }
        let operator = read(&self.chain, manager, IBaseManager::operatorCall {}).await?;
        let params = json!({ "module": module, "adapters": extensions });
        let call = PrivilegedCall::builder()
            .from(operator)
            .to(manager)
            .data(
                IBaseManager::protectModuleCall {
                    module,
                    adapters: extensions,
                }
                .abi_encode(),
            )
            .description(format!("Protect {module_name} on {manager_name}"))
            .contract_name(manager_name)
            .params(params)
            .build();
        self.execute_or_defer(self.mode(Authority::Holder(operator)), call)
            .await
    }

    /// Register a module with the protocol controller.
    pub async fn enable_module_on_controller(
        &self,
        module_name: &str,
        skip_production_check: bool,
    ) -> Result<Outcome> {
        let module = self.require_dependency(module_name).await?;
        let controller = self.require_dependency(CONTROLLER).await?;
        if read(
            &self.chain,
            controller,
            IController::isSystemContractCall {
                contractAddress: module,
            },
        )
        .await?
        {
            debug!(%module_name, "module already enabled");
            return Ok(Outcome::Skipped);
        }
        let call = PrivilegedCall::builder()
            .from(self.deployer())
            .to(controller)
            .data(IController::addModuleCall { module }.abi_encode())
            .description(format!("Add {module_name} to Controller"))
            .contract_name(CONTROLLER)
            .params(json!({ "module": module }))
            .build();
        let mode = self.mode(Authority::Governance {
            skip_production_check,
        });
        self.execute_or_defer(mode, call).await
    }

    pub async fn initialize_general_index_module(&self, set_token_name: &str) -> Result<TxHash> {
        let module = self.require_dependency(GENERAL_INDEX_MODULE).await?;
        let set_token = self.require_dependency(set_token_name).await?;
        let data = IGeneralIndexModule::initializeCall {
            setToken: set_token,
        }
        .abi_encode();
        self.send_as_deployer(
            module,
            data.into(),
            &format!("Initialize GeneralIndexModule for {set_token_name}"),
        )
        .await
    }

    pub async fn initialize_debt_issuance_module(
        &self,
        set_token_name: &str,
        settings: DebtIssuanceSettings,
    ) -> Result<TxHash> {
        let module = self.require_dependency(DEBT_ISSUANCE_MODULE).await?;
        let set_token = self.require_dependency(set_token_name).await?;
        let data = IDebtIssuanceModule::initializeCall {
            setToken: set_token,
            maxManagerFee: MAX_MANAGER_FEE,
            managerIssueFee: settings.issue_fee,
            managerRedeemFee: settings.redeem_fee,
            feeRecipient: settings.fee_recipient,
            managerIssuanceHook: settings.issuance_hook,
        }
        .abi_encode();
        self.send_as_deployer(
            module,
            data.into(),
            &format!("Initialize DebtIssuanceModule for {set_token_name}"),
        )
        .await
    }

    pub async fn initialize_streaming_fee_module(
        &self,
        set_token_name: &str,
        fee_recipient: Address,
        fee: U256,
    ) -> Result<TxHash> {
        let module = self.require_dependency(STREAMING_FEE_MODULE).await?;
        let set_token = self.require_dependency(set_token_name).await?;
        let data = IStreamingFeeModule::initializeCall {
            setToken: set_token,
            settings: IStreamingFeeModule::FeeState {
                feeRecipient: fee_recipient,
                maxStreamingFeePercentage: MAX_STREAMING_FEE,
                streamingFeePercentage: fee,
                lastStreamingFeeTimestamp: U256::ZERO,
            },
        }
        .abi_encode();
        self.send_as_deployer(
            module,
            data.into(),
            &format!("Initialize StreamingFeeModule for {set_token_name}"),
        )
        .await
    }
}
