//! Hardhat build artifacts: bytecode, library linking, constructor encoding
//! and the compiler input needed for source verification.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use alloy::{
    dyn_abi::{JsonAbiExt, Specifier},
    hex,
    json_abi::JsonAbi,
    primitives::{Address, Bytes},
};
use serde::{Deserialize, de::IgnoredAny};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact {0} not found under {1:?}")]
    NotFound(String, PathBuf),

    #[error("failed to read {0:?}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid artifact {0:?}: {1}")]
    Json(PathBuf, #[source] serde_json::Error),

    #[error("{contract} links against {library} but no address was given")]
    MissingLibrary { contract: String, library: String },

    #[error("invalid bytecode for {0}: {1}")]
    Bytecode(String, String),

    #[error("constructor of {contract} takes {expected} arguments, got {actual}")]
    ArgumentCount {
        contract: String,
        expected: usize,
        actual: usize,
    },

    #[error("constructor argument {index} of {contract}: {source}")]
    Argument {
        contract: String,
        index: usize,
        #[source]
        source: alloy::dyn_abi::Error,
    },

    #[error("no build info contains {0}")]
    BuildInfoNotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LinkReference {
    pub start: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: JsonAbi,
    pub bytecode: String,
    /// source file -> library name -> placeholder positions
    #[serde(default)]
    pub link_references: BTreeMap<String, BTreeMap<String, Vec<LinkReference>>>,
}

impl Artifact {
    /// `{source}:{contract}` as expected by verifiers.
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// Bytecode with every library placeholder replaced by its address.
    pub fn link(&self, libraries: &BTreeMap<String, Address>) -> Result<Bytes, ArtifactError> {
        let mut code = self
            .bytecode
            .strip_prefix("0x")
            .unwrap_or(&self.bytecode)
            .to_string();
        for refs in self.link_references.values() {
            for (library, positions) in refs {
                let address =
                    libraries
                        .get(library)
                        .ok_or_else(|| ArtifactError::MissingLibrary {
                            contract: self.contract_name.clone(),
                            library: library.clone(),
                        })?;
                let encoded = hex::encode(address);
                for pos in positions {
                    let start = pos.start * 2;
                    let end = start + pos.length * 2;
                    if pos.length != 20 || end > code.len() {
                        return Err(ArtifactError::Bytecode(
                            self.contract_name.clone(),
                            format!("bad link reference for {library} at {}", pos.start),
                        ));
                    }
                    code.replace_range(start..end, &encoded);
                }
            }
        }
        hex::decode(&code)
            .map(Bytes::from)
            .map_err(|e| ArtifactError::Bytecode(self.contract_name.clone(), e.to_string()))
    }

    /// ABI encoded constructor arguments, parsed from their string form
    /// (`"0x…"`, `"100"`, `"[0x…,0x…]"`, `"true"`).
    pub fn encode_constructor(&self, args: &[String]) -> Result<Vec<u8>, ArtifactError> {
        let expected = self.abi.constructor().map(|c| c.inputs.len()).unwrap_or(0);
        if expected != args.len() {
            return Err(ArtifactError::ArgumentCount {
                contract: self.contract_name.clone(),
                expected,
                actual: args.len(),
            });
        }
        let Some(constructor) = self.abi.constructor() else {
            return Ok(Vec::new());
        };
        let argument_error = |index, source| ArtifactError::Argument {
            contract: self.contract_name.clone(),
            index,
            source,
        };
        let mut values = Vec::with_capacity(args.len());
        for (index, (param, arg)) in constructor.inputs.iter().zip(args).enumerate() {
            let ty = param.resolve().map_err(|e| argument_error(index, e))?;
            values.push(ty.coerce_str(arg).map_err(|e| argument_error(index, e))?);
        }
        constructor
            .abi_encode_input(&values)
            .map_err(|e| argument_error(0, e))
    }

    /// Linked bytecode followed by the encoded constructor arguments.
    pub fn creation_code(
        &self,
        libraries: &BTreeMap<String, Address>,
        args: &[String],
    ) -> Result<Bytes, ArtifactError> {
        let mut code = self.link(libraries)?.to_vec();
        code.extend(self.encode_constructor(args)?);
        Ok(code.into())
    }
}

/// Compiler input of one compilation job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub solc_long_version: String,
    pub input: serde_json::Value,
    #[serde(default)]
    output: BuildOutput,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BuildOutput {
    #[serde(default)]
    contracts: BTreeMap<String, BTreeMap<String, IgnoredAny>>,
}

impl BuildInfo {
    pub fn contains(&self, source_name: &str, contract_name: &str) -> bool {
        self.output
            .contracts
            .get(source_name)
            .is_some_and(|c| c.contains_key(contract_name))
    }
}

/// A Hardhat `artifacts/` directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load `<name>.sol/<name>.json` from anywhere below the root.
    pub async fn artifact(&self, name: &str) -> Result<Artifact, ArtifactError> {
        let file_name = format!("{name}.json");
        let path = find_artifact(&self.root, &file_name)
            .await
            .map_err(|e| ArtifactError::Io(self.root.clone(), e))?
            .ok_or_else(|| ArtifactError::NotFound(name.to_string(), self.root.clone()))?;
        read_json(&path).await
    }

    /// Find the compilation job that produced `artifact`.
    pub async fn build_info(&self, artifact: &Artifact) -> Result<BuildInfo, ArtifactError> {
        let dir = self.root.join("build-info");
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| ArtifactError::Io(dir.clone(), e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ArtifactError::Io(dir.clone(), e))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let info: BuildInfo = read_json(&path).await?;
            if info.contains(&artifact.source_name, &artifact.contract_name) {
                return Ok(info);
            }
        }
        Err(ArtifactError::BuildInfoNotFound(
            artifact.fully_qualified_name(),
        ))
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ArtifactError::Io(path.into(), e))?;
    serde_json::from_slice(&bytes).map_err(|e| ArtifactError::Json(path.into(), e))
}

/// Walk `root` for `<name>.sol/<file_name>`, skipping `build-info/`.
async fn find_artifact(root: &Path, file_name: &str) -> std::io::Result<Option<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                if path.file_name().is_none_or(|n| n != "build-info") {
                    pending.push(path);
                }
            } else if path.file_name().is_some_and(|n| n == file_name)
                && dir.extension().is_some_and(|ext| ext == "sol")
            {
                return Ok(Some(path));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use alloy::{
        primitives::{U256, address},
        sol_types::SolValue,
    };
    use serde_json::json;

    use super::*;
    use crate::testing::ScratchDir;

    const PLACEHOLDER: &str = "__$0123456789abcdef0123456789abcdef01$__";

    fn scratch_dir() -> ScratchDir {
        ScratchDir::new("setdeploy-artifacts").unwrap()
    }

    fn manager_artifact() -> serde_json::Value {
        json!({
            "contractName": "BaseManager",
            "sourceName": "contracts/manager/BaseManager.sol",
            "abi": [{
                "type": "constructor",
                "stateMutability": "nonpayable",
                "inputs": [
                    { "name": "operator", "type": "address", "internalType": "address" },
                    { "name": "fee", "type": "uint256", "internalType": "uint256" }
                ]
            }],
            "bytecode": format!("0x6080{PLACEHOLDER}00"),
            "linkReferences": {
                "contracts/lib/PreciseUnitMath.sol": {
                    "PreciseUnitMath": [{ "start": 2, "length": 20 }]
                }
            }
        })
    }

    #[tokio::test]
    async fn links_and_encodes_constructor() {
        let root = scratch_dir();
        let dir = root.join("contracts/manager/BaseManager.sol");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("BaseManager.json"),
            manager_artifact().to_string(),
        )
        .unwrap();
        std::fs::write(dir.join("BaseManager.dbg.json"), "{}").unwrap();

        let store = ArtifactStore::new(root.path());
        let artifact = store.artifact("BaseManager").await.unwrap();
        assert_eq!(
            artifact.fully_qualified_name(),
            "contracts/manager/BaseManager.sol:BaseManager"
        );

        let library = address!("1111111111111111111111111111111111111111");
        let operator = address!("2222222222222222222222222222222222222222");

        assert!(matches!(
            artifact.link(&BTreeMap::new()),
            Err(ArtifactError::MissingLibrary { .. })
        ));

        let libraries = BTreeMap::from([("PreciseUnitMath".to_string(), library)]);
        let code = artifact
            .creation_code(&libraries, &[operator.to_string(), "5".to_string()])
            .unwrap();

        let mut expected = vec![0x60, 0x80];
        expected.extend_from_slice(library.as_slice());
        expected.push(0x00);
        expected.extend((operator, U256::from(5)).abi_encode_params());
        assert_eq!(code.to_vec(), expected);

        assert!(matches!(
            artifact.encode_constructor(&[operator.to_string()]),
            Err(ArtifactError::ArgumentCount { expected: 2, actual: 1, .. })
        ));
        assert!(matches!(
            store.artifact("Missing").await,
            Err(ArtifactError::NotFound(..))
        ));

    }

    #[tokio::test]
    async fn finds_build_info_for_artifact() {
        let root = scratch_dir();
        let dir = root.join("contracts/manager/BaseManager.sol");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("BaseManager.json"),
            manager_artifact().to_string(),
        )
        .unwrap();
        std::fs::create_dir_all(root.join("build-info")).unwrap();
        std::fs::write(
            root.join("build-info/aaaa.json"),
            json!({
                "solcLongVersion": "0.6.10+commit.00c0fcaf",
                "input": { "language": "Solidity" },
                "output": { "contracts": { "contracts/Other.sol": { "Other": {} } } }
            })
            .to_string(),
        )
        .unwrap();
        std::fs::write(
            root.join("build-info/bbbb.json"),
            json!({
                "solcLongVersion": "0.6.10+commit.00c0fcaf",
                "input": { "language": "Solidity", "sources": {} },
                "output": {
                    "contracts": { "contracts/manager/BaseManager.sol": { "BaseManager": {} } }
                }
            })
            .to_string(),
        )
        .unwrap();

        let store = ArtifactStore::new(root.path());
        let artifact = store.artifact("BaseManager").await.unwrap();
        let info = store.build_info(&artifact).await.unwrap();
        assert_eq!(info.solc_long_version, "0.6.10+commit.00c0fcaf");
        assert!(info.input.get("sources").is_some());

    }
}
