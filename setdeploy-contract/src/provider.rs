//! Helper functions to build Ethereum [providers](https://docs.rs/alloy/latest/alloy/providers/trait.Provider.html)

use alloy::{
    network::{Ethereum, EthereumWallet},
    providers::{
        ProviderBuilder, RootProvider,
        fillers::{FillProvider, JoinFill, WalletFiller},
        utils::JoinedRecommendedFillers,
    },
    signers::local::{LocalSignerError, PrivateKeySigner},
};
use url::Url;

/// Type alias that connects to providers with recommended fillers and wallet
/// use `<HttpProviderWithWallet as WalletProvider>::default_signer_address(&provider)` to get
/// the deployer address
pub type HttpProviderWithWallet = FillProvider<
    JoinFill<JoinedRecommendedFillers, WalletFiller<EthereumWallet>>,
    RootProvider,
    Ethereum,
>;

/// Build a local signer from a hex encoded private key (with or without `0x`)
pub fn build_signer(private_key: &str) -> Result<PrivateKeySigner, LocalSignerError> {
    private_key.trim().parse()
}

/// a handy thin wrapper around wallet builder and provider builder that directly
/// returns an instantiated `Provider` with default fillers with wallet, ready to send tx
pub fn build_provider(
    private_key: &str,
    url: Url,
) -> Result<HttpProviderWithWallet, LocalSignerError> {
    let signer = build_signer(private_key)?;
    let wallet = EthereumWallet::from(signer);
    Ok(ProviderBuilder::new().wallet(wallet).connect_http(url))
}

#[cfg(test)]
mod tests {
    use alloy::{primitives::address, providers::WalletProvider};

    use super::*;

    // first account of the default hardhat/anvil mnemonic
    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn provider_signs_with_private_key() {
        let provider = build_provider(KEY, "http://127.0.0.1:8545".parse().unwrap()).unwrap();
        assert_eq!(
            provider.default_signer_address(),
            address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
        assert!(build_signer("not a key").is_err());
    }
}
