//! Source verification of recorded deployments on Etherscan-compatible
//! explorers.

use std::{collections::BTreeMap, time::Duration};

use alloy::{hex, primitives::Address};
use anyhow::Result;
use async_trait::async_trait;
use bon::Builder;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use setdeploy_contract::{ArtifactError, ArtifactStore, artifact::LinkReference};
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::outputs::{DeploymentRecord, OutputStore, TransactionRecord};

/// Explorers accept about five calls per second.
pub const RATE_LIMIT_DELAY: Duration = Duration::from_millis(250);

static USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, deployment: &DeploymentRecord) -> Result<()>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub verified: Vec<String>,
    pub failed: Vec<String>,
}

/// Submit every deployment that is not verified yet.
///
/// A failed submission is logged and the remaining ones are still tried.
/// The document is written once, after the last submission.
pub async fn verify_deployments<V>(
    store: &OutputStore,
    verifier: &V,
    delay: Duration,
) -> Result<VerificationReport>
where
    V: Verifier + ?Sized,
{
    let mut outputs = store.read().await?;
    let mut report = VerificationReport::default();
    info!(network = %store.network(), "verifying new deployments");

    for record in outputs.transactions.values_mut() {
        let TransactionRecord::Deployment(deployment) = record else {
            continue;
        };
        if deployment.verified {
            continue;
        }
        match verifier.verify(deployment).await {
            Ok(()) => {
                info!(name = %deployment.name, address = %deployment.contract_address, "verified");
                deployment.verified = true;
                report.verified.push(deployment.name.clone());
            }
            Err(err) => {
                error!(name = %deployment.name, err = format!("{err:#}"), "verification failed");
                report.failed.push(deployment.name.clone());
            }
        }
        sleep(delay).await;
    }

    store.write(&outputs).await?;
    Ok(report)
}

#[derive(Debug, thiserror::Error)]
pub enum EtherscanError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api status: {0}")]
    Status(StatusCode),

    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("verification rejected: {0}")]
    Rejected(String),

    #[error("verification {0} still pending after {1} polls")]
    Pending(String, u32),
}

#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct EtherscanConfig {
    pub api_url: Url,
    pub api_key: String,
    /// Fully qualified `{source}:{contract}` name to verify every deployment
    /// as, for contracts whose name shadows another one.
    pub contract: Option<String>,
    #[builder(default = Duration::from_secs(5))]
    pub poll_interval: Duration,
    #[builder(default = 20)]
    pub max_polls: u32,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Status {
    Verified,
    Pending,
    Submitted(String),
}

fn is_already_verified(text: &str) -> bool {
    text.contains("Already Verified") || text.contains("already verified")
}

/// Interpret a submission (`submitted == true`) or status response.
fn classify(res: ApiResponse, submitted: bool) -> Result<Status, EtherscanError> {
    if is_already_verified(&res.result) {
        return Ok(Status::Verified);
    }
    if res.status == "1" {
        return Ok(if submitted {
            Status::Submitted(res.result)
        } else {
            Status::Verified
        });
    }
    if res.result.starts_with("Pending in queue") {
        return Ok(Status::Pending);
    }
    Err(EtherscanError::Rejected(if res.message.is_empty() {
        res.result
    } else {
        format!("{}: {}", res.message, res.result)
    }))
}

/// Constructor arguments as recorded, back in their string form.
fn constructor_strings(args: &[Value]) -> Vec<String> {
    args.iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect()
}

/// Submits standard-json compiler input and polls until the explorer is done.
#[derive(Debug, Clone)]
pub struct EtherscanVerifier {
    config: EtherscanConfig,
    artifacts: ArtifactStore,
    client: reqwest::Client,
}

impl EtherscanVerifier {
    pub fn new(config: EtherscanConfig, artifacts: ArtifactStore) -> Result<Self, EtherscanError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            config,
            artifacts,
            client,
        })
    }

    fn artifact_name<'a>(&'a self, deployment: &'a DeploymentRecord) -> &'a str {
        match &self.config.contract {
            Some(fqn) => fqn.rsplit(':').next().unwrap_or(fqn),
            None => deployment.contract.as_deref().unwrap_or(&deployment.name),
        }
    }

    async fn submit(&self, deployment: &DeploymentRecord) -> Result<Status, EtherscanError> {
        let artifact = self
            .artifacts
            .artifact(self.artifact_name(deployment))
            .await?;
        let build_info = self.artifacts.build_info(&artifact).await?;

        let mut input = build_info.input.clone();
        if !deployment.libraries.is_empty() {
            let libraries = library_settings(&artifact.link_references, &deployment.libraries);
            if let Some(settings) = input.get_mut("settings").and_then(Value::as_object_mut) {
                settings.insert("libraries".into(), libraries);
            }
        }
        let args = constructor_strings(&deployment.constructor_args);
        let args = artifact.encode_constructor(&args)?;
        let contract_name = self
            .config
            .contract
            .clone()
            .unwrap_or_else(|| artifact.fully_qualified_name());

        let form = [
            ("apikey", self.config.api_key.clone()),
            ("module", "contract".to_string()),
            ("action", "verifysourcecode".to_string()),
            ("contractaddress", deployment.contract_address.to_string()),
            ("sourceCode", serde_json::to_string(&input)?),
            ("codeformat", "solidity-standard-json-input".to_string()),
            ("contractname", contract_name),
            ("compilerversion", format!("v{}", build_info.solc_long_version)),
            // sic
            ("constructorArguements", hex::encode(args)),
        ];
        debug!(name = %deployment.name, "submitting source");
        let res = self
            .client
            .post(self.config.api_url.clone())
            .form(&form)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(EtherscanError::Status(res.status()));
        }
        classify(res.json().await?, true)
    }

    async fn check(&self, guid: &str) -> Result<Status, EtherscanError> {
        let res = self
            .client
            .get(self.config.api_url.clone())
            .query(&[
                ("apikey", self.config.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(EtherscanError::Status(res.status()));
        }
        classify(res.json().await?, false)
    }
}

/// `settings.libraries` of the compiler input: source -> library -> address.
fn library_settings(
    link_references: &BTreeMap<String, BTreeMap<String, Vec<LinkReference>>>,
    libraries: &BTreeMap<String, Address>,
) -> Value {
    let mut settings = serde_json::Map::new();
    for (source, refs) in link_references {
        let mut entries = serde_json::Map::new();
        for library in refs.keys() {
            if let Some(address) = libraries.get(library) {
                entries.insert(library.clone(), address.to_string().into());
            }
        }
        if !entries.is_empty() {
            settings.insert(source.clone(), entries.into());
        }
    }
    settings.into()
}

#[async_trait]
impl Verifier for EtherscanVerifier {
    async fn verify(&self, deployment: &DeploymentRecord) -> Result<()> {
        let guid = match self.submit(deployment).await? {
            Status::Verified => return Ok(()),
            Status::Submitted(guid) => guid,
            Status::Pending => {
                return Err(EtherscanError::Rejected("no guid returned".into()).into());
            }
        };
        for _ in 0..self.config.max_polls {
            sleep(self.config.poll_interval).await;
            match self.check(&guid).await? {
                Status::Verified => return Ok(()),
                Status::Pending | Status::Submitted(_) => {
                    debug!(%guid, name = %deployment.name, "verification pending");
                }
            }
        }
        Err(EtherscanError::Pending(guid, self.config.max_polls).into())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use alloy::primitives::address;
    use anyhow::bail;
    use parking_lot::Mutex;
    use serde_json::json;

    use setdeploy_config::Environment;

    use super::*;
    use crate::{recorder::ContractDeployment, test_utils::context};

    struct Flaky {
        failing: HashSet<String>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Verifier for Flaky {
        async fn verify(&self, deployment: &DeploymentRecord) -> Result<()> {
            self.seen.lock().push(deployment.name.clone());
            if self.failing.contains(&deployment.name) {
                bail!("bytecode mismatch")
            }
            Ok(())
        }
    }

    fn response(status: &str, message: &str, result: &str) -> ApiResponse {
        ApiResponse {
            status: status.into(),
            message: message.into(),
            result: result.into(),
        }
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_run() {
        let cx = context(Environment::Staging);
        for (i, name) in ["A", "B", "C"].into_iter().enumerate() {
            cx.store
                .save_contract_deployment(
                    ContractDeployment::builder()
                        .name(name)
                        .contract_address(Address::with_last_byte(i as u8 + 1))
                        .transaction_id("0x01")
                        .description(format!("Deployed {name}"))
                        .build(),
                )
                .await
                .unwrap();
        }
        cx.store.save_transaction("0x02", "plain").await.unwrap();

        let verifier = Flaky {
            failing: HashSet::from(["B".to_string()]),
            seen: Mutex::new(Vec::new()),
        };
        let report = verify_deployments(&cx.store, &verifier, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(report.verified, ["A", "C"]);
        assert_eq!(report.failed, ["B"]);

        let outputs = cx.store.read().await.unwrap();
        let verified: Vec<_> = outputs
            .transactions
            .values()
            .filter_map(|r| match r {
                TransactionRecord::Deployment(d) => Some((d.name.as_str(), d.verified)),
                _ => None,
            })
            .collect();
        assert_eq!(verified, [("A", true), ("B", false), ("C", true)]);

        // only B is submitted again
        verify_deployments(&cx.store, &verifier, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(*verifier.seen.lock(), ["A", "B", "C", "B"]);
    }

    #[test]
    fn explorer_responses() {
        assert_eq!(
            classify(response("1", "OK", "guid123"), true).unwrap(),
            Status::Submitted("guid123".into())
        );
        assert_eq!(
            classify(response("0", "NOTOK", "Contract source code already verified"), true)
                .unwrap(),
            Status::Verified
        );
        assert_eq!(
            classify(response("0", "NOTOK", "Already Verified"), false).unwrap(),
            Status::Verified
        );
        assert_eq!(
            classify(response("0", "NOTOK", "Pending in queue"), false).unwrap(),
            Status::Pending
        );
        assert_eq!(
            classify(response("1", "OK", "Pass - Verified"), false).unwrap(),
            Status::Verified
        );
        assert!(matches!(
            classify(response("0", "NOTOK", "Fail - Unable to verify"), false),
            Err(EtherscanError::Rejected(_))
        ));
    }

    #[test]
    fn recorded_arguments_keep_their_string_form() {
        let args = [json!("0x1111111111111111111111111111111111111111"), json!(5), json!(true)];
        assert_eq!(
            constructor_strings(&args),
            ["0x1111111111111111111111111111111111111111", "5", "true"]
        );
    }

    #[test]
    fn libraries_go_under_their_source() {
        let refs = BTreeMap::from([(
            "contracts/lib/PreciseUnitMath.sol".to_string(),
            BTreeMap::from([(
                "PreciseUnitMath".to_string(),
                vec![LinkReference { start: 2, length: 20 }],
            )]),
        )]);
        let lib = address!("1111111111111111111111111111111111111111");
        let libraries = BTreeMap::from([("PreciseUnitMath".to_string(), lib)]);
        assert_eq!(
            library_settings(&refs, &libraries),
            json!({ "contracts/lib/PreciseUnitMath.sol": { "PreciseUnitMath": lib.to_string() } })
        );
    }
}
