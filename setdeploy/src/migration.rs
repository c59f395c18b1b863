//! Migration of a SetToken from its legacy `BaseManager` to a
//! `DelegatedManager` created by the `DelegatedManagerFactory`.
//!
//! The flow has four steps, each signed by a multisig:
//!
//! 1. the legacy manager hands the SetToken to a transitional manager,
//! 2. the transitional manager creates the delegated manager,
//! 3. the transitional manager initializes it with the legacy fee settings,
//! 4. the transitional manager hands the SetToken to the delegated manager.
//!
//! On development networks the signers are impersonated and every step is
//! executed so the end state can be checked. Everywhere else each step is
//! written to the deferred log together with its target, signer and
//! parameters. The delegated manager does not exist yet when the deferred
//! calls are written, so its address is [`DELEGATED_MANAGER_PLACEHOLDER`] in
//! their calldata and has to be replaced by the executors.
//!
//! Each step reads the state it would change first and returns
//! [`Outcome::Skipped`] when it already holds, so an interrupted migration
//! resumes where it stopped. The delegated manager is recorded as
//! `{symbol}_DELEGATED_MANAGER` once the factory has created it.

use alloy::{
    primitives::{Address, Bytes, U256, address},
    sol_types::SolCall,
};
use anyhow::{Result, bail, ensure};
use serde_json::{Value, json};
use setdeploy_contract::{
    Chain, IBaseManager, IDelegatedManagerFactory, IFeeSplitExtension, IGlobalExtension,
    ISetToken, read,
};
use tracing::{debug, info};

use crate::{
    context::{DeployContext, Outcome, PrivilegedCall},
    policy::Authority,
};

pub const DELEGATED_MANAGER_FACTORY: &str = "DELEGATED_MANAGER_FACTORY";
pub const ISSUANCE_EXTENSION: &str = "ISSUANCE_EXTENSION";
pub const TRADE_EXTENSION: &str = "TRADE_EXTENSION";
pub const FEE_EXTENSION: &str = "FEE_EXTENSION";

pub const DELEGATED_MANAGER_PLACEHOLDER: Address =
    address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");

/// 100 ether.
const MULTISIG_FUNDING: u128 = 100_000_000_000_000_000_000;

/// SetTokens whose legacy `setManager` needs only the operator's signature.
const SINGLE_PARTY_UPGRADES: &[&str] = &["BED"];

pub struct ManagerMigrator<'a, C> {
    cx: &'a DeployContext<C>,
    factory: Address,
    issuance_extension: Address,
    trade_extension: Address,
    fee_extension: Address,
    single_party_upgrades: Vec<String>,
}

impl<'a, C: Chain> ManagerMigrator<'a, C> {
    pub async fn new(cx: &'a DeployContext<C>) -> Result<Self> {
        Ok(Self {
            cx,
            factory: cx.require_dependency(DELEGATED_MANAGER_FACTORY).await?,
            issuance_extension: cx.require_dependency(ISSUANCE_EXTENSION).await?,
            trade_extension: cx.require_dependency(TRADE_EXTENSION).await?,
            fee_extension: cx.require_dependency(FEE_EXTENSION).await?,
            single_party_upgrades: SINGLE_PARTY_UPGRADES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        })
    }

    /// Replace the dependency names of SetTokens that do not use a mutual
    /// upgrade for `setManager`.
    pub fn with_single_party_upgrades<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.single_party_upgrades = names.into_iter().map(Into::into).collect();
        self
    }

    fn is_development(&self) -> bool {
        self.cx.environment().is_development()
    }

    fn extensions(&self) -> Vec<Address> {
        vec![
            self.issuance_extension,
            self.trade_extension,
            self.fee_extension,
        ]
    }

    /// Unlock and fund the multisigs on development networks.
    pub async fn impersonate_multisigs(&self, multisigs: &[Address]) -> Result<()> {
        if !self.is_development() {
            return Ok(());
        }
        for multisig in multisigs {
            self.cx.chain.impersonate(*multisig).await?;
            self.cx
                .chain
                .fund(*multisig, U256::from(MULTISIG_FUNDING))
                .await?;
            info!(%multisig, "impersonating multisig");
        }
        Ok(())
    }

    /// Hand the SetToken from its legacy manager to the transitional manager.
    ///
    /// Skipped once the SetToken has left the legacy manager.
    pub async fn transfer_set_to_transitional_manager(
        &self,
        transitional_manager: Address,
        set_token: Address,
    ) -> Result<Outcome> {
        let chain = &self.cx.chain;
        let manager = read(chain, set_token, ISetToken::managerCall {}).await?;
        let symbol = read(chain, set_token, ISetToken::symbolCall {}).await?;
        if manager == transitional_manager
            || Some(manager) == self.recorded_delegated_manager(&symbol).await?
        {
            debug!(%symbol, %manager, "SetToken already left its legacy manager");
            return Ok(Outcome::Skipped);
        }
        let operator = read(chain, manager, IBaseManager::operatorCall {}).await?;
        let methodologist = read(chain, manager, IBaseManager::methodologistCall {}).await?;

        let data: Bytes = IBaseManager::setManagerCall {
            newManager: transitional_manager,
        }
        .abi_encode()
        .into();
        let description = format!(
            "{symbol}.BaseManager.setManager(): set {transitional_manager} as temporary SetToken manager"
        );
        let params = json!({ "newManager": transitional_manager });

        let outcome = self
            .execute_or_log(
                operator,
                manager,
                data.clone(),
                params.clone(),
                &description,
                "BaseManager",
            )
            .await?;

        // the second half of a mutual upgrade
        if self.is_development() && self.is_mutual_upgrade(set_token).await? {
            self.execute_or_log(
                methodologist,
                manager,
                data,
                params,
                &description,
                "BaseManager",
            )
            .await?;
        }
        Ok(outcome)
    }

    /// Create the delegated manager through the factory and record its
    /// address as `{symbol}_DELEGATED_MANAGER`.
    ///
    /// Skipped when the factory already holds a manager for the SetToken.
    pub async fn create_delegated_manager(
        &self,
        transitional_manager: Address,
        set_token: Address,
        owner: Address,
        methodologist: Address,
        operators: Vec<Address>,
    ) -> Result<Outcome> {
        let chain = &self.cx.chain;
        let symbol = read(chain, set_token, ISetToken::symbolCall {}).await?;
        if self.recorded_delegated_manager(&symbol).await?.is_some() {
            debug!(%symbol, "delegated manager already recorded");
            return Ok(Outcome::Skipped);
        }
        let pending = self.pending_manager(set_token).await?;
        if pending != Address::ZERO {
            info!(%symbol, manager = %pending, "delegated manager already created");
            self.record_delegated_manager(&symbol, pending).await?;
            return Ok(Outcome::Skipped);
        }

        let assets = read(chain, set_token, ISetToken::getComponentsCall {}).await?;
        let extensions = self.extensions();
        let params = json!({
            "setToken": set_token,
            "owner": owner,
            "methodologist": methodologist,
            "operators": operators,
            "assets": assets,
            "extensions": extensions,
        });
        let data = IDelegatedManagerFactory::createManagerCall {
            setToken: set_token,
            owner,
            methodologist,
            operators,
            assets,
            extensions,
        }
        .abi_encode();

        let outcome = self
            .execute_or_log(
                transitional_manager,
                self.factory,
                data.into(),
                params,
                &format!(
                    "{symbol}.DelegatedManagerFactory.createManager(): create new DelegatedManager"
                ),
                DELEGATED_MANAGER_FACTORY,
            )
            .await?;
        if let Outcome::Executed(_) = outcome {
            let created = self.pending_manager(set_token).await?;
            ensure!(
                created != Address::ZERO,
                "factory holds no manager for {symbol} after createManager"
            );
            self.record_delegated_manager(&symbol, created).await?;
        }
        Ok(outcome)
    }

    /// Initialize the delegated manager, carrying over the fee split and fee
    /// recipient of the legacy fee extension.
    ///
    /// Skipped when the recorded delegated manager is no longer pending on
    /// the factory.
    pub async fn initialize_manager(
        &self,
        transitional_manager: Address,
        legacy_fee_extension: Address,
        set_token: Address,
    ) -> Result<Outcome> {
        let chain = &self.cx.chain;
        let symbol = read(chain, set_token, ISetToken::symbolCall {}).await?;
        if self.recorded_delegated_manager(&symbol).await?.is_some() {
            let state = self.initialize_state(set_token).await?;
            if !state.isPending {
                debug!(%symbol, "delegated manager already initialized");
                return Ok(Outcome::Skipped);
            }
        }

        let owner_fee_recipient = self
            .owner_fee_recipient(legacy_fee_extension, transitional_manager)
            .await;
        let owner_fee_split = read(
            chain,
            legacy_fee_extension,
            IFeeSplitExtension::operatorFeeSplitCall {},
        )
        .await?;

        let delegated_manager = self.delegated_manager_address(set_token).await?;
        let bytecode = extension_initialization_bytecode(delegated_manager);
        let initialize_bytecode = vec![bytecode.clone(), bytecode.clone(), bytecode];
        let extensions = self.extensions();

        let params = json!({
            "setToken": set_token,
            "ownerFeeSplit": owner_fee_split,
            "ownerFeeRecipient": owner_fee_recipient,
            "extensions": extensions,
            "initializeBytecode": initialize_bytecode,
        });
        let data = IDelegatedManagerFactory::initializeCall {
            setToken: set_token,
            ownerFeeSplit: owner_fee_split,
            ownerFeeRecipient: owner_fee_recipient,
            extensions,
            initializeBytecode: initialize_bytecode,
        }
        .abi_encode();

        self.execute_or_log(
            transitional_manager,
            self.factory,
            data.into(),
            params,
            &format!(
                "{symbol}.DelegatedManagerFactory.initialize(): initialize new DelegatedManager"
            ),
            DELEGATED_MANAGER_FACTORY,
        )
        .await
    }

    /// Skipped once the SetToken is managed by `delegated_manager`.
    pub async fn transfer_set_to_delegated_manager(
        &self,
        transitional_manager: Address,
        delegated_manager: Address,
        set_token: Address,
    ) -> Result<Outcome> {
        let chain = &self.cx.chain;
        let symbol = read(chain, set_token, ISetToken::symbolCall {}).await?;
        let manager = read(chain, set_token, ISetToken::managerCall {}).await?;
        if manager == delegated_manager {
            debug!(%symbol, %manager, "SetToken already on its delegated manager");
            return Ok(Outcome::Skipped);
        }
        let data = ISetToken::setManagerCall {
            manager: delegated_manager,
        }
        .abi_encode();

        self.execute_or_log(
            transitional_manager,
            set_token,
            data.into(),
            json!({ "newManager": delegated_manager }),
            &format!(
                "{symbol}.SetToken.setManager(): set {delegated_manager} as final SetToken manager"
            ),
            "SetToken",
        )
        .await
    }

    /// The delegated manager created for `set_token`: the recorded one, else
    /// the one pending on the factory. Outside development networks
    /// [`DELEGATED_MANAGER_PLACEHOLDER`] stands in for a manager the deferred
    /// calls have not created yet.
    pub async fn delegated_manager_address(&self, set_token: Address) -> Result<Address> {
        let symbol = read(&self.cx.chain, set_token, ISetToken::symbolCall {}).await?;
        if let Some(recorded) = self.recorded_delegated_manager(&symbol).await? {
            return Ok(recorded);
        }
        let pending = self.pending_manager(set_token).await?;
        if pending != Address::ZERO {
            return Ok(pending);
        }
        if !self.is_development() {
            return Ok(DELEGATED_MANAGER_PLACEHOLDER);
        }
        bail!("no delegated manager created for {symbol}")
    }

    async fn recorded_delegated_manager(&self, symbol: &str) -> Result<Option<Address>> {
        Ok(self
            .cx
            .store
            .contract_address(&delegated_manager_name(symbol))
            .await?)
    }

    async fn record_delegated_manager(&self, symbol: &str, manager: Address) -> Result<()> {
        self.cx
            .store
            .save_address(&delegated_manager_name(symbol), manager)
            .await?;
        Ok(())
    }

    async fn initialize_state(
        &self,
        set_token: Address,
    ) -> Result<IDelegatedManagerFactory::initializeStateReturn> {
        Ok(read(
            &self.cx.chain,
            self.factory,
            IDelegatedManagerFactory::initializeStateCall {
                setToken: set_token,
            },
        )
        .await?)
    }

    /// Manager the factory created for `set_token` and has not initialized.
    async fn pending_manager(&self, set_token: Address) -> Result<Address> {
        Ok(self.initialize_state(set_token).await?.manager)
    }

    /// Not every fee extension exposes a recipient; the transitional manager
    /// (the operator) receives the fees then.
    async fn owner_fee_recipient(
        &self,
        fee_extension: Address,
        transitional_manager: Address,
    ) -> Address {
        match read(
            &self.cx.chain,
            fee_extension,
            IFeeSplitExtension::operatorFeeRecipientCall {},
        )
        .await
        {
            Ok(recipient) => recipient,
            Err(err) => {
                debug!(%err, %fee_extension, "no operator fee recipient");
                transitional_manager
            }
        }
    }

    async fn is_mutual_upgrade(&self, set_token: Address) -> Result<bool> {
        for name in &self.single_party_upgrades {
            if self.cx.find_dependency(name).await? == Some(set_token) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn execute_or_log(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
        params: Value,
        description: &str,
        contract_name: &str,
    ) -> Result<Outcome> {
        let call = PrivilegedCall::builder()
            .from(from)
            .to(to)
            .data(data)
            .description(description)
            .contract_name(contract_name)
            .params(params)
            .build();
        let outcome = self
            .cx
            .execute_or_defer(self.cx.mode(Authority::Impersonated(from)), call)
            .await?;
        debug!(?outcome, %description, "migration step");
        Ok(outcome)
    }
}

pub fn delegated_manager_name(symbol: &str) -> String {
    format!("{symbol}_DELEGATED_MANAGER")
}

/// Every default extension is initialized with `initializeExtension(manager)`.
fn extension_initialization_bytecode(delegated_manager: Address) -> Bytes {
    IGlobalExtension::initializeExtensionCall {
        delegatedManager: delegated_manager,
    }
    .abi_encode()
    .into()
}
