//! Synthetic Merkle-Patricia proofs and an in-memory chain.
//!
//! Node bytes are filler: the witness builders only care about shape, and the
//! digest backend never looks inside the trie.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, PoisonError,
    },
};

use async_trait::async_trait;
use zkcred_chain::{ChainProofFetcher, FetchError};
use zkcred_circuit::mapping_storage_key;
use zkcred_common::{AccountProof, Address, Balance, BlockHeader, Bytes32, StorageSlotProof};

/// `depth` nodes: `depth - 1` inner nodes of `node_len` bytes and a leaf of `leaf_len`.
pub fn trie_nodes(depth: usize, node_len: usize, leaf_len: usize, seed: u8) -> Vec<Vec<u8>> {
    (0..depth)
        .map(|i| {
            let len = if i + 1 == depth { leaf_len } else { node_len };
            let fill = seed.wrapping_add(i as u8);
            let mut node = vec![fill; len];
            if let Some(first) = node.first_mut() {
                *first = 0xf8;
            }
            node
        })
        .collect()
}

/// Account proof of `contract` carrying one storage proof per `(key, value)`.
pub fn storage_account_proof(
    contract: Address,
    block_number: u64,
    storage_hash: Bytes32,
    slots: &[(Bytes32, Balance)],
) -> AccountProof {
    AccountProof {
        address: contract,
        block_number,
        balance: Balance::zero(),
        nonce: 1,
        code_hash: Bytes32([0xc0; 32]),
        storage_hash,
        account_proof: trie_nodes(8, 532, 104, 0x10),
        storage_proofs: slots
            .iter()
            .enumerate()
            .map(|(i, (key, value))| StorageSlotProof {
                key: *key,
                value: value.clone(),
                proof: trie_nodes(5, 532, 69, 0x40 + i as u8),
            })
            .collect(),
    }
}

/// `balances[wallet] = balance` in `contract` at mapping slot `slot`.
pub fn token_balance_proof(
    contract: Address,
    slot: Bytes32,
    wallet: Address,
    balance: Balance,
    block_number: u64,
) -> AccountProof {
    let key = mapping_storage_key(&wallet, &slot);
    storage_account_proof(contract, block_number, Bytes32([0x33; 32]), &[(key, balance)])
}

pub fn native_balance_proof(wallet: Address, balance: Balance, block_number: u64) -> AccountProof {
    AccountProof {
        address: wallet,
        block_number,
        balance,
        nonce: 12,
        code_hash: Bytes32([0xc5; 32]),
        storage_hash: Bytes32([0x56; 32]),
        account_proof: trie_nodes(9, 532, 110, 0x20),
        storage_proofs: Vec::new(),
    }
}

#[derive(Default)]
struct ChainState {
    blocks: HashMap<u64, BlockHeader>,
    accounts: HashMap<(u64, Address), AccountProof>,
}

/// In-memory [`ChainProofFetcher`] with injectable transient failures.
#[derive(Default)]
pub struct FixtureChain {
    state: Mutex<ChainState>,
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl FixtureChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block(self, chain_id: u64, header: BlockHeader) -> Self {
        self.lock().blocks.insert(chain_id, header);
        self
    }

    /// Serve `proof` for its own address on `chain_id`.
    pub fn with_account(self, chain_id: u64, proof: AccountProof) -> Self {
        self.lock().accounts.insert((chain_id, proof.address), proof);
        self
    }

    /// Fail the next `n` calls with an RPC error.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, chain_id: u64) -> Result<(), FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(FetchError::Rpc {
                chain_id,
                message: "connection reset".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChainProofFetcher for FixtureChain {
    async fn get_block(&self, chain_id: u64) -> Result<BlockHeader, FetchError> {
        self.enter(chain_id)?;
        self.lock()
            .blocks
            .get(&chain_id)
            .cloned()
            .ok_or(FetchError::UnknownChain(chain_id))
    }

    async fn get_proof(
        &self,
        chain_id: u64,
        address: Address,
        storage_keys: &[Bytes32],
        block_number: u64,
    ) -> Result<AccountProof, FetchError> {
        self.enter(chain_id)?;
        let state = self.lock();
        let account = state
            .accounts
            .get(&(chain_id, address))
            .ok_or_else(|| FetchError::Incomplete {
                chain_id,
                message: format!("no account {address}"),
            })?;
        if account.block_number != block_number {
            return Err(FetchError::Incomplete {
                chain_id,
                message: format!("block {block_number} is not available"),
            });
        }

        // Keys that were never written prove to zero, as eth_getProof reports them.
        let storage_proofs = storage_keys
            .iter()
            .map(|key| {
                account.storage_proof(key).cloned().unwrap_or(StorageSlotProof {
                    key: *key,
                    value: Balance::zero(),
                    proof: Vec::new(),
                })
            })
            .collect();
        Ok(AccountProof {
            storage_proofs,
            ..account.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trie_nodes_split_into_inner_and_leaf() {
        let nodes = trie_nodes(3, 532, 69, 1);
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].len(), 532);
        assert_eq!(nodes[2].len(), 69);
    }

    #[tokio::test]
    async fn serves_requested_keys_in_order() {
        let contract = Address([0x0d; 20]);
        let wallet = Address([0xaa; 20]);
        let slot = Bytes32::from_u64(0);
        let chain = FixtureChain::new().with_account(
            1,
            token_balance_proof(contract, slot, wallet, Balance::from(10_000u64), 100),
        );

        let missing = Bytes32([0x01; 32]);
        let held = mapping_storage_key(&wallet, &slot);
        let proof = chain.get_proof(1, contract, &[missing, held], 100).await.unwrap();
        assert_eq!(proof.storage_proofs[0].value, Balance::zero());
        assert_eq!(proof.storage_proofs[1].value, Balance::from(10_000u64));

        assert!(chain.get_proof(1, contract, &[held], 99).await.is_err());
    }

    #[tokio::test]
    async fn injected_failures_are_transient() {
        let chain = FixtureChain::new().with_block(
            1,
            BlockHeader {
                number: 5,
                state_root: Bytes32::ZERO,
            },
        );
        chain.fail_next(1);
        let err = chain.get_block(1).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(chain.get_block(1).await.unwrap().number, 5);
        assert_eq!(chain.calls(), 2);
    }
}
