//! Chain state for witness building.
//!
//! [`ChainProofFetcher`] is the seam between the credential pipeline and an
//! Ethereum JSON-RPC endpoint. Reads are idempotent, so [`RetryingFetcher`]
//! may repeat them under a bounded [`RetryPolicy`].

mod retry;
mod rpc;

pub use retry::{RetryPolicy, RetryingFetcher};
pub use rpc::EthersProofFetcher;

use async_trait::async_trait;
use thiserror::Error;
use zkcred_common::{AccountProof, Address, BlockHeader, Bytes32, CredentialError};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no RPC endpoint configured for chain {0}")]
    UnknownChain(u64),

    #[error("chain {chain_id} RPC failed: {message}")]
    Rpc { chain_id: u64, message: String },

    #[error("chain {chain_id} returned incomplete data: {message}")]
    Incomplete { chain_id: u64, message: String },
}

impl FetchError {
    /// Transport failures may clear up; configuration and shape problems will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Rpc { .. })
    }
}

impl From<FetchError> for CredentialError {
    fn from(err: FetchError) -> Self {
        CredentialError::DataUnavailable(err.to_string())
    }
}

#[async_trait]
pub trait ChainProofFetcher: Send + Sync {
    /// Latest block number and state root.
    async fn get_block(&self, chain_id: u64) -> Result<BlockHeader, FetchError>;

    /// `eth_getProof` for `address` and `storage_keys` at `block_number`.
    async fn get_proof(
        &self,
        chain_id: u64,
        address: Address,
        storage_keys: &[Bytes32],
        block_number: u64,
    ) -> Result<AccountProof, FetchError>;
}

#[async_trait]
impl<T: ChainProofFetcher + ?Sized> ChainProofFetcher for std::sync::Arc<T> {
    async fn get_block(&self, chain_id: u64) -> Result<BlockHeader, FetchError> {
        (**self).get_block(chain_id).await
    }

    async fn get_proof(
        &self,
        chain_id: u64,
        address: Address,
        storage_keys: &[Bytes32],
        block_number: u64,
    ) -> Result<AccountProof, FetchError> {
        (**self)
            .get_proof(chain_id, address, storage_keys, block_number)
            .await
    }
}
