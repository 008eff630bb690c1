//! `ethers` JSON-RPC implementation of [`ChainProofFetcher`].

use std::{collections::HashMap, env};

use async_trait::async_trait;
use ethers::{
    providers::{Http, Middleware, Provider},
    types::{BlockId, BlockNumber, StorageProof, H160, H256, U256},
};
use tracing::debug;
use zkcred_common::{AccountProof, Address, Balance, BlockHeader, Bytes32, StorageSlotProof};

use crate::{ChainProofFetcher, FetchError};

/// Prefix of the per-chain endpoint variables, e.g. `ZKCRED_RPC_URL_8453`.
pub const RPC_URL_ENV_PREFIX: &str = "ZKCRED_RPC_URL_";

/// One HTTP provider per configured chain id.
#[derive(Clone, Debug, Default)]
pub struct EthersProofFetcher {
    providers: HashMap<u64, Provider<Http>>,
}

impl EthersProofFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, chain_id: u64, rpc_url: &str) -> Result<Self, FetchError> {
        let provider = Provider::<Http>::try_from(rpc_url).map_err(|e| FetchError::Rpc {
            chain_id,
            message: format!("invalid RPC url: {e}"),
        })?;
        self.providers.insert(chain_id, provider);
        Ok(self)
    }

    /// Pick up every `ZKCRED_RPC_URL_<CHAIN_ID>` variable.
    pub fn from_env() -> Result<Self, FetchError> {
        let mut fetcher = Self::new();
        for (key, url) in env::vars() {
            let Some(chain_id) = key
                .strip_prefix(RPC_URL_ENV_PREFIX)
                .and_then(|id| id.parse::<u64>().ok())
            else {
                continue;
            };
            fetcher = fetcher.with_endpoint(chain_id, &url)?;
        }
        Ok(fetcher)
    }

    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.providers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn provider(&self, chain_id: u64) -> Result<&Provider<Http>, FetchError> {
        self.providers
            .get(&chain_id)
            .ok_or(FetchError::UnknownChain(chain_id))
    }
}

#[async_trait]
impl ChainProofFetcher for EthersProofFetcher {
    async fn get_block(&self, chain_id: u64) -> Result<BlockHeader, FetchError> {
        let block = self
            .provider(chain_id)?
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| rpc_error(chain_id, e))?
            .ok_or_else(|| incomplete(chain_id, "latest block not found"))?;
        let number = block
            .number
            .ok_or_else(|| incomplete(chain_id, "latest block is pending"))?
            .as_u64();
        debug!(chain_id, number, "fetched block");
        Ok(BlockHeader {
            number,
            state_root: Bytes32(block.state_root.0),
        })
    }

    async fn get_proof(
        &self,
        chain_id: u64,
        address: Address,
        storage_keys: &[Bytes32],
        block_number: u64,
    ) -> Result<AccountProof, FetchError> {
        let locations = storage_keys.iter().map(|k| H256(k.0)).collect();
        let response = self
            .provider(chain_id)?
            .get_proof(
                H160(address.0),
                locations,
                Some(BlockId::Number(BlockNumber::Number(block_number.into()))),
            )
            .await
            .map_err(|e| rpc_error(chain_id, e))?;
        debug!(
            chain_id,
            block_number,
            account_nodes = response.account_proof.len(),
            storage_proofs = response.storage_proof.len(),
            "fetched proof"
        );

        Ok(AccountProof {
            address,
            block_number,
            balance: balance(response.balance),
            nonce: response.nonce.as_u64(),
            code_hash: Bytes32(response.code_hash.0),
            storage_hash: Bytes32(response.storage_hash.0),
            account_proof: response.account_proof.iter().map(|n| n.to_vec()).collect(),
            storage_proofs: storage_proofs(chain_id, storage_keys, response.storage_proof)?,
        })
    }
}

/// Pair each requested key with the proof the node returned for it. The node
/// answers in request order and echoes the key; a mismatch means the response
/// cannot be trusted for the slot we asked about.
fn storage_proofs(
    chain_id: u64,
    keys: &[Bytes32],
    proofs: Vec<StorageProof>,
) -> Result<Vec<StorageSlotProof>, FetchError> {
    if proofs.len() != keys.len() {
        return Err(incomplete(chain_id, "storage proof count does not match keys"));
    }
    keys.iter()
        .zip(proofs)
        .map(|(key, p)| {
            if p.key != U256::from_big_endian(&key.0) {
                return Err(FetchError::Incomplete {
                    chain_id,
                    message: format!(
                        "storage proof for {:?} returned where {key} was requested",
                        p.key
                    ),
                });
            }
            Ok(StorageSlotProof {
                key: *key,
                value: balance(p.value),
                proof: p.proof.iter().map(|n| n.to_vec()).collect(),
            })
        })
        .collect()
}

fn balance(value: U256) -> Balance {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    Balance::from_be_bytes(&buf)
}

fn rpc_error(chain_id: u64, err: impl std::fmt::Display) -> FetchError {
    FetchError::Rpc {
        chain_id,
        message: err.to_string(),
    }
}

fn incomplete(chain_id: u64, message: &str) -> FetchError {
    FetchError::Incomplete {
        chain_id,
        message: message.to_string(),
    }
}
