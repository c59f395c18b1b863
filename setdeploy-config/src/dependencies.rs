//! Static dependency table: externally deployed contracts and well-known
//! accounts, keyed by name and network id.
//!
//! ```toml
//! [human-friendly-names]
//! 1 = "mainnet"
//!
//! [dependencies.USDC]
//! 1 = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"
//!
//! [dependencies.BED.1]
//! staging = "0x2aF1dF3AB0ab157e1E2Ad8F88A7D04fbea0c7dc6"
//! production = "0x2aF1dF3AB0ab157e1E2Ad8F88A7D04fbea0c7dc6"
//! ```
//!
//! An empty string means "unset".

use std::{collections::BTreeMap, path::Path};

use alloy::primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{ConfigError, Environment, read_toml};

/// An address that may be left blank in the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DependencyAddress(pub Option<Address>);

impl Serialize for DependencyAddress {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(a) => s.serialize_str(&a.to_checksum(None)),
            None => s.serialize_str(""),
        }
    }
}

impl<'de> Deserialize<'de> for DependencyAddress {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        if s.is_empty() {
            return Ok(Self(None));
        }
        s.parse::<Address>()
            .map(|a| Self(Some(a)))
            .map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyEntry {
    /// One address for every environment of the network.
    Address(DependencyAddress),
    /// Addresses keyed by environment name.
    PerEnvironment(BTreeMap<String, DependencyAddress>),
}

/// Result of a static table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticLookup {
    Resolved(Address),
    /// A per-environment entry exists but has no address for the environment.
    /// Callers must not fall back to deployed addresses.
    Unset,
    /// No usable static entry; callers fall back to deployed addresses.
    Missing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DependencyTable {
    #[serde(default)]
    human_friendly_names: BTreeMap<String, String>,
    #[serde(default)]
    dependencies: BTreeMap<String, BTreeMap<String, DependencyEntry>>,
}

impl DependencyTable {
    pub async fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        read_toml(path).await
    }

    pub fn human_friendly_name(&self, network_id: u64) -> Option<&str> {
        self.human_friendly_names
            .get(&network_id.to_string())
            .map(String::as_str)
    }

    pub fn lookup(&self, name: &str, network_id: u64, environment: Environment) -> StaticLookup {
        let Some(entry) = self
            .dependencies
            .get(name)
            .and_then(|networks| networks.get(&network_id.to_string()))
        else {
            return StaticLookup::Missing;
        };
        match entry {
            DependencyEntry::Address(DependencyAddress(Some(a))) => StaticLookup::Resolved(*a),
            DependencyEntry::Address(DependencyAddress(None)) => StaticLookup::Missing,
            DependencyEntry::PerEnvironment(variants) => {
                match variants.get(environment.dependency_variant().as_str()) {
                    Some(DependencyAddress(Some(a))) => StaticLookup::Resolved(*a),
                    _ => StaticLookup::Unset,
                }
            }
        }
    }

    pub fn with_network_name<S: Into<String>>(mut self, network_id: u64, name: S) -> Self {
        self.human_friendly_names
            .insert(network_id.to_string(), name.into());
        self
    }

    pub fn with_address<S: Into<String>>(
        mut self,
        name: S,
        network_id: u64,
        address: Option<Address>,
    ) -> Self {
        self.dependencies.entry(name.into()).or_default().insert(
            network_id.to_string(),
            DependencyEntry::Address(DependencyAddress(address)),
        );
        self
    }

    pub fn with_variants<S, I>(mut self, name: S, network_id: u64, variants: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = (Environment, Option<Address>)>,
    {
        let variants = variants
            .into_iter()
            .map(|(env, a)| (env.as_str().to_string(), DependencyAddress(a)))
            .collect();
        self.dependencies.entry(name.into()).or_default().insert(
            network_id.to_string(),
            DependencyEntry::PerEnvironment(variants),
        );
        self
    }
}
