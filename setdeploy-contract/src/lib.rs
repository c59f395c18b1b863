//! Set protocol contract bindings and chain access for the deployment tooling.

pub mod artifact;
pub mod chain;
pub mod provider;
mod sol_types;

#[cfg(any(test, feature = "test"))]
pub mod testing;

use alloy::signers::local::LocalSignerError;
use url::Url;

pub use artifact::{Artifact, ArtifactError, ArtifactStore, BuildInfo};
pub use chain::{Chain, ChainError, Deployed, RpcChain, read};
use provider::{HttpProviderWithWallet, build_provider};
pub use sol_types::*;

/// Connect to `url` with the deployer key.
pub fn connect(
    private_key: &str,
    url: Url,
) -> Result<RpcChain<HttpProviderWithWallet>, LocalSignerError> {
    let provider = build_provider(private_key, url)?;
    Ok(RpcChain::new(provider))
}
