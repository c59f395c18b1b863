//! Decides whether a privileged call is sent now or deferred to a multisig.

use alloy::primitives::Address;
use setdeploy_config::Environment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Execute,
    Defer,
}

/// Who is entitled to make a privileged call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// The current on-chain holder of the role (operator, owner, manager).
    /// Only executed on development networks when the deployer holds it.
    Holder(Address),
    /// Protocol governance, e.g. the controller owner.
    Governance { skip_production_check: bool },
    /// An account the deployer can only act as by impersonating it on a
    /// development node.
    Impersonated(Address),
}

/// Execution settings of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub environment: Environment,
    /// Force the production code path on any network.
    pub testing_production: bool,
}

impl ExecutionPolicy {
    pub fn new(environment: Environment, testing_production: bool) -> Self {
        Self {
            environment,
            testing_production,
        }
    }

    pub fn resolve(&self, authority: Authority, deployer: Address) -> ExecutionMode {
        resolve_execution_mode(
            authority,
            deployer,
            self.environment,
            self.testing_production,
        )
    }
}

pub fn resolve_execution_mode(
    authority: Authority,
    deployer: Address,
    environment: Environment,
    testing_production: bool,
) -> ExecutionMode {
    let production = environment.is_production() || testing_production;
    let execute = match authority {
        Authority::Holder(holder) => {
            environment.is_development() && !testing_production && holder == deployer
        }
        Authority::Governance {
            skip_production_check,
        } => skip_production_check || !production,
        Authority::Impersonated(_) => environment.is_development() && !testing_production,
    };
    if execute {
        ExecutionMode::Execute
    } else {
        ExecutionMode::Defer
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;
    use ExecutionMode::*;

    const DEPLOYER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    const MULTISIG: Address = address!("1111111111111111111111111111111111111111");

    #[test]
    fn holder_executes_only_on_development() {
        assert_eq!(
            resolve_execution_mode(
                Authority::Holder(DEPLOYER),
                DEPLOYER,
                Environment::Development,
                false
            ),
            Execute
        );
        assert_eq!(
            resolve_execution_mode(
                Authority::Holder(MULTISIG),
                DEPLOYER,
                Environment::Development,
                false
            ),
            Defer
        );
        for env in [Environment::Staging, Environment::Production] {
            for holder in [DEPLOYER, MULTISIG] {
                assert_eq!(
                    resolve_execution_mode(Authority::Holder(holder), DEPLOYER, env, false),
                    Defer,
                    "{holder} on {env}"
                );
            }
        }
        assert_eq!(
            ExecutionPolicy::new(Environment::Staging, false)
                .resolve(Authority::Holder(DEPLOYER), DEPLOYER),
            Defer
        );
    }

    #[test]
    fn testing_production_defers_everything_but_skipped_governance() {
        let policy = ExecutionPolicy::new(Environment::Development, true);
        assert_eq!(policy.resolve(Authority::Holder(DEPLOYER), DEPLOYER), Defer);
        assert_eq!(
            policy.resolve(Authority::Impersonated(MULTISIG), DEPLOYER),
            Defer
        );
        assert_eq!(
            policy.resolve(
                Authority::Governance {
                    skip_production_check: false
                },
                DEPLOYER
            ),
            Defer
        );
        assert_eq!(
            policy.resolve(
                Authority::Governance {
                    skip_production_check: true
                },
                DEPLOYER
            ),
            Execute
        );
    }

    #[test]
    fn governance_and_impersonation() {
        let gov = Authority::Governance {
            skip_production_check: false,
        };
        let staging = ExecutionPolicy::new(Environment::Staging, false);
        let production = ExecutionPolicy::new(Environment::Production, false);
        let development = ExecutionPolicy::new(Environment::Development, false);

        assert_eq!(staging.resolve(gov, DEPLOYER), Execute);
        assert_eq!(production.resolve(gov, DEPLOYER), Defer);

        assert_eq!(
            development.resolve(Authority::Impersonated(MULTISIG), DEPLOYER),
            Execute
        );
        assert_eq!(
            staging.resolve(Authority::Impersonated(MULTISIG), DEPLOYER),
            Defer
        );
        assert_eq!(
            production.resolve(Authority::Impersonated(MULTISIG), DEPLOYER),
            Defer
        );
    }
}
