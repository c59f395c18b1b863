//! Deployment orchestration for Set protocol index tokens.
//!
//! Stages run against a [`DeployContext`]: they resolve addresses through the
//! [`Resolver`](resolver::Resolver), deploy through
//! [`DeployContext::deploy_once`], and send or defer privileged calls through
//! the [`ExecutionPolicy`](policy::ExecutionPolicy). Progress and results are
//! persisted in the per-network [`OutputStore`].

pub mod actions;
pub mod context;
pub mod deferred;
pub mod migration;
pub mod outputs;
pub mod policy;
pub mod recorder;
pub mod resolver;
pub mod scaffold;
pub mod stage;
pub mod stages;
pub mod verify;

pub use context::{DeployContext, Outcome, PrivilegedCall};
pub use outputs::{DeploymentOutputs, OutputStore, OutputsError, TransactionRecord};
pub use stage::{Pipeline, Stage, StageTracker};

#[cfg(test)]
pub(crate) mod test_utils {
    use std::{ops::Deref, path::Path};

    use alloy::primitives::{Address, address};
    use serde_json::json;
    use setdeploy_config::{DependencyTable, Environment, NetworkKey};
    use setdeploy_contract::{
        ArtifactStore,
        testing::{MockChain, ScratchDir},
    };

    use crate::{DeployContext, OutputStore};

    pub const DEPLOYER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

    pub fn scratch_dir() -> ScratchDir {
        ScratchDir::new("setdeploy").unwrap()
    }

    /// Write a build artifact for `name` whose constructor takes `inputs`.
    pub fn write_artifact(root: &Path, name: &str, inputs: &[&str]) {
        let dir = root.join(format!("contracts/{name}.sol"));
        std::fs::create_dir_all(&dir).unwrap();
        let inputs: Vec<_> = inputs
            .iter()
            .enumerate()
            .map(|(i, ty)| json!({ "name": format!("arg{i}"), "type": ty, "internalType": ty }))
            .collect();
        let artifact = json!({
            "contractName": name,
            "sourceName": format!("contracts/{name}.sol"),
            "abi": [{ "type": "constructor", "stateMutability": "nonpayable", "inputs": inputs }],
            "bytecode": "0x60806040",
            "linkReferences": {}
        });
        std::fs::write(dir.join(format!("{name}.json")), artifact.to_string()).unwrap();
    }

    /// A context over [`MockChain`] whose files live as long as it does.
    pub struct TestContext {
        cx: DeployContext<MockChain>,
        _dir: ScratchDir,
    }

    impl Deref for TestContext {
        type Target = DeployContext<MockChain>;

        fn deref(&self) -> &Self::Target {
            &self.cx
        }
    }

    pub fn context(env: Environment) -> TestContext {
        context_with(env, DependencyTable::default())
    }

    /// Context on network 1 with an empty outputs document.
    pub fn context_with(env: Environment, table: DependencyTable) -> TestContext {
        build(env, table, false)
    }

    /// Development network forced onto the production code path.
    pub fn testing_production_context(table: DependencyTable) -> TestContext {
        build(Environment::Development, table, true)
    }

    fn build(env: Environment, table: DependencyTable, testing_production: bool) -> TestContext {
        let dir = scratch_dir();
        let network = NetworkKey::new(1, env);
        let store = OutputStore::new(
            dir.join(format!("outputs/{network}.json")),
            network,
            table.human_friendly_name(1),
        );
        let cx = DeployContext::new(
            MockChain::new(DEPLOYER),
            store,
            table,
            ArtifactStore::new(dir.join("artifacts")),
            testing_production,
        );
        TestContext { cx, _dir: dir }
    }
}
