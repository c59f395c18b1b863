//! Chain access used by the deployment engine.
//!
//! [`Chain`] is the seam between deployment logic and the node: everything the
//! scripts do on chain goes through raw calldata, so contracts stay opaque.

use alloy::{
    contract::RawCallBuilder,
    network::{ReceiptResponse, TransactionBuilder},
    primitives::{Address, Bytes, TxHash, U256},
    providers::{PendingTransactionBuilder, PendingTransactionError, Provider, WalletProvider},
    rpc::types::TransactionRequest,
    sol_types::SolCall,
    transports::TransportError,
};
use async_trait::async_trait;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(#[from] TransportError),

    #[error("transaction error: {0}")]
    Pending(#[from] PendingTransactionError),

    #[error("contract error: {0}")]
    Contract(#[from] alloy::contract::Error),

    #[error("failed to decode call output: {0}")]
    Abi(#[from] alloy::sol_types::Error),

    #[error("transaction {0} reverted")]
    Reverted(TxHash),

    #[error("call reverted: {0}")]
    CallReverted(String),
}

/// A contract created on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployed {
    pub address: Address,
    pub tx_hash: TxHash,
}

#[async_trait]
pub trait Chain: Send + Sync {
    /// Account of the local deployer key.
    fn deployer(&self) -> Address;

    /// Read-only call.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError>;

    /// Send a transaction and wait until it is mined.
    ///
    /// Senders other than the deployer must have been unlocked with
    /// [`Chain::impersonate`] first.
    async fn send(&self, from: Address, to: Address, data: Bytes) -> Result<TxHash, ChainError>;

    /// Deploy creation code (linked bytecode followed by constructor args).
    async fn deploy(&self, name: &str, code: Bytes) -> Result<Deployed, ChainError>;

    /// Unlock `account` on a development node.
    async fn impersonate(&self, account: Address) -> Result<(), ChainError>;

    /// Transfer `amount` wei from the deployer to `account`.
    async fn fund(&self, account: Address, amount: U256) -> Result<TxHash, ChainError>;
}

/// Call a view function and decode its return value.
pub async fn read<C, T>(chain: &C, to: Address, call: T) -> Result<T::Return, ChainError>
where
    C: Chain + ?Sized,
    T: SolCall + Send,
{
    let output = chain.call(to, call.abi_encode().into()).await?;
    Ok(T::abi_decode_returns(&output)?)
}

/// Hash of a mined transaction, or [`ChainError::Reverted`].
fn succeeded<R: ReceiptResponse>(receipt: &R) -> Result<TxHash, ChainError> {
    let tx_hash = receipt.transaction_hash();
    if !receipt.status() {
        return Err(ChainError::Reverted(tx_hash));
    }
    Ok(tx_hash)
}

/// [`Chain`] backed by an alloy provider with a wallet.
#[derive(Debug, Clone)]
pub struct RpcChain<P> {
    provider: P,
    deployer: Address,
}

impl<P: Provider + WalletProvider> RpcChain<P> {
    pub fn new(provider: P) -> Self {
        let deployer = provider.default_signer_address();
        Self { provider, deployer }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

#[async_trait]
impl<P> Chain for RpcChain<P>
where
    P: Provider + WalletProvider,
{
    fn deployer(&self) -> Address {
        self.deployer
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let tx = TransactionRequest::default().with_to(to).with_input(data);
        Ok(self.provider.call(tx).await?)
    }

    async fn send(&self, from: Address, to: Address, data: Bytes) -> Result<TxHash, ChainError> {
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(data);
        let pending = if from == self.deployer {
            self.provider.send_transaction(tx).await?
        } else {
            // signed by the node for unlocked accounts
            let hash: TxHash = self
                .provider
                .raw_request("eth_sendTransaction".into(), (tx,))
                .await?;
            PendingTransactionBuilder::new(self.provider.root().clone(), hash)
        };
        debug!(tx_hash = %pending.tx_hash(), %from, %to, "waiting for tx to be mined");
        let receipt = pending.get_receipt().await?;
        let tx_hash = succeeded(&receipt)?;
        info!(%receipt.gas_used, %tx_hash, "tx mined");
        Ok(tx_hash)
    }

    async fn deploy(&self, name: &str, code: Bytes) -> Result<Deployed, ChainError> {
        info!(%name, "deploying");
        let pending = RawCallBuilder::new_raw_deploy(&self.provider, code)
            .send()
            .await?;
        let receipt = pending.get_receipt().await?;
        let tx_hash = succeeded(&receipt)?;
        let address = receipt
            .contract_address
            .ok_or(alloy::contract::Error::ContractNotDeployed)?;
        info!(%name, %address, %tx_hash, gas_used = receipt.gas_used, "deployed");
        Ok(Deployed { address, tx_hash })
    }

    async fn impersonate(&self, account: Address) -> Result<(), ChainError> {
        let _: serde_json::Value = self
            .provider
            .raw_request("hardhat_impersonateAccount".into(), (account,))
            .await?;
        debug!(%account, "impersonating");
        Ok(())
    }

    async fn fund(&self, account: Address, amount: U256) -> Result<TxHash, ChainError> {
        let tx = TransactionRequest::default()
            .with_to(account)
            .with_value(amount);
        let receipt = self.provider.send_transaction(tx).await?.get_receipt().await?;
        let tx_hash = succeeded(&receipt)?;
        info!(%account, %amount, %tx_hash, "funded account");
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use alloy::rpc::types::TransactionReceipt;
    use serde_json::json;

    use super::*;

    fn receipt(status: &str) -> TransactionReceipt {
        serde_json::from_value(json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "transactionIndex": "0x0",
            "blockHash": format!("0x{}", "cd".repeat(32)),
            "blockNumber": "0x1",
            "from": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
            "to": "0x1111111111111111111111111111111111111111",
            "cumulativeGasUsed": "0x5208",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x3b9aca00",
            "contractAddress": null,
            "logs": [],
            "logsBloom": format!("0x{}", "0".repeat(512)),
            "type": "0x2",
            "status": status
        }))
        .unwrap()
    }

    #[test]
    fn reverted_receipts_are_errors() {
        let hash = TxHash::repeat_byte(0xab);
        assert_eq!(succeeded(&receipt("0x1")).unwrap(), hash);
        assert!(matches!(
            succeeded(&receipt("0x0")),
            Err(ChainError::Reverted(h)) if h == hash
        ));
    }
}
