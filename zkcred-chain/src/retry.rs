use std::{env, future::Future, time::Duration};

use async_trait::async_trait;
use tracing::warn;
use zkcred_common::{AccountProof, Address, BlockHeader, Bytes32};

use crate::{ChainProofFetcher, FetchError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_MS: u64 = 500;

/// Bounded attempts with a fixed pause between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// `ZKCRED_FETCH_MAX_ATTEMPTS` and `ZKCRED_FETCH_BACKOFF_MS`; unset or
    /// unparsable values keep the defaults.
    pub fn from_env() -> Self {
        let max_attempts = env::var("ZKCRED_FETCH_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let backoff_ms = env::var("ZKCRED_FETCH_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BACKOFF_MS);
        Self::new(max_attempts, Duration::from_millis(backoff_ms))
    }

    pub async fn run<T, Op, Fut>(&self, what: &str, mut op: Op) -> Result<T, FetchError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "{what} failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Wraps another fetcher and retries transient failures.
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

#[async_trait]
impl<F: ChainProofFetcher> ChainProofFetcher for RetryingFetcher<F> {
    async fn get_block(&self, chain_id: u64) -> Result<BlockHeader, FetchError> {
        let inner = &self.inner;
        self.policy
            .run("get_block", move || inner.get_block(chain_id))
            .await
    }

    async fn get_proof(
        &self,
        chain_id: u64,
        address: Address,
        storage_keys: &[Bytes32],
        block_number: u64,
    ) -> Result<AccountProof, FetchError> {
        let inner = &self.inner;
        self.policy
            .run("get_proof", move || {
                inner.get_proof(chain_id, address, storage_keys, block_number)
            })
            .await
    }
}
