//! In-memory [`Chain`] and scratch directories for tests.

use std::{
    collections::{HashMap, HashSet},
    ops::Deref,
    path::{Path, PathBuf},
};

use alloy::{
    primitives::{Address, Bytes, TxHash, U256, keccak256},
    sol_types::SolCall,
};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::chain::{Chain, ChainError, Deployed};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub tx_hash: TxHash,
}

impl SentTransaction {
    /// Decode the calldata as `C`, if the selector matches.
    pub fn decode<C: SolCall>(&self) -> Option<C> {
        C::abi_decode(&self.data).ok()
    }
}

type CallKey = (Address, [u8; 4]);

#[derive(Debug, Default)]
struct State {
    responses: HashMap<CallKey, Bytes>,
    /// Responses replaced once a transaction with the key is sent.
    effects: HashMap<CallKey, Vec<(CallKey, Bytes)>>,
    sent: Vec<SentTransaction>,
    deployed: Vec<(String, Address, Bytes)>,
    unlocked: HashSet<Address>,
    funded: Vec<(Address, U256)>,
    nonce: u64,
}

impl State {
    fn next_hash(&mut self) -> TxHash {
        self.nonce += 1;
        keccak256(self.nonce.to_be_bytes())
    }
}

/// Answers view calls from canned responses and records every transaction.
///
/// Calls without a canned response revert. State changes caused by a
/// transaction are modelled with [`MockChain::respond_after`].
#[derive(Debug)]
pub struct MockChain {
    deployer: Address,
    state: Mutex<State>,
}

impl MockChain {
    pub fn new(deployer: Address) -> Self {
        Self {
            deployer,
            state: Mutex::new(State::default()),
        }
    }

    /// Answer calls of `C` on `to` with the ABI encoded `output`.
    pub fn respond<C: SolCall>(&self, to: Address, output: impl Into<Bytes>) {
        self.state
            .lock()
            .responses
            .insert((to, C::SELECTOR), output.into());
    }

    /// Once a transaction calling `S` on `to` is sent, answer calls of `C` on
    /// `target` with `output`.
    pub fn respond_after<S: SolCall, C: SolCall>(
        &self,
        to: Address,
        target: Address,
        output: impl Into<Bytes>,
    ) {
        self.state
            .lock()
            .effects
            .entry((to, S::SELECTOR))
            .or_default()
            .push(((target, C::SELECTOR), output.into()));
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.state.lock().sent.clone()
    }

    /// Name, address and creation code of every deployment, in order.
    pub fn deployed(&self) -> Vec<(String, Address, Bytes)> {
        self.state.lock().deployed.clone()
    }

    pub fn is_unlocked(&self, account: Address) -> bool {
        self.state.lock().unlocked.contains(&account)
    }

    pub fn funded(&self) -> Vec<(Address, U256)> {
        self.state.lock().funded.clone()
    }
}

#[async_trait]
impl Chain for MockChain {
    fn deployer(&self) -> Address {
        self.deployer
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| ChainError::CallReverted("calldata too short".into()))?;
        self.state
            .lock()
            .responses
            .get(&(to, selector))
            .cloned()
            .ok_or_else(|| {
                ChainError::CallReverted(format!(
                    "no response for 0x{} on {to}",
                    alloy::hex::encode(selector)
                ))
            })
    }

    async fn send(&self, from: Address, to: Address, data: Bytes) -> Result<TxHash, ChainError> {
        let mut state = self.state.lock();
        if from != self.deployer && !state.unlocked.contains(&from) {
            return Err(ChainError::CallReverted(format!("sender {from} is locked")));
        }
        let tx_hash = state.next_hash();
        if let Some(selector) = data.get(..4).and_then(|s| <[u8; 4]>::try_from(s).ok()) {
            let changes = state.effects.get(&(to, selector)).cloned().unwrap_or_default();
            state.responses.extend(changes);
        }
        state.sent.push(SentTransaction {
            from,
            to,
            data,
            tx_hash,
        });
        Ok(tx_hash)
    }

    async fn deploy(&self, name: &str, code: Bytes) -> Result<Deployed, ChainError> {
        let mut state = self.state.lock();
        let address = self.deployer.create(state.nonce);
        let tx_hash = state.next_hash();
        state.deployed.push((name.to_string(), address, code));
        Ok(Deployed { address, tx_hash })
    }

    async fn impersonate(&self, account: Address) -> Result<(), ChainError> {
        self.state.lock().unlocked.insert(account);
        Ok(())
    }

    async fn fund(&self, account: Address, amount: U256) -> Result<TxHash, ChainError> {
        let mut state = self.state.lock();
        state.funded.push((account, amount));
        Ok(state.next_hash())
    }
}

/// A fresh directory below the system temp dir, removed on drop.
#[derive(Debug)]
pub struct ScratchDir(PathBuf);

impl ScratchDir {
    pub fn new(prefix: &str) -> std::io::Result<Self> {
        let dir = std::env::temp_dir().join(format!("{prefix}-{:016x}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir)?;
        Ok(Self(dir))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Deref for ScratchDir {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for ScratchDir {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}
