use std::{env, path::PathBuf, sync::Arc};

use zkcred_chain::{ChainProofFetcher, EthersProofFetcher, RetryPolicy, RetryingFetcher};
use zkcred_common::{ArtifactCache, CredentialError, CredentialResult, FsArtifactSource};
use zkcred_prover::{BbBackend, BbConfig, ProvingBackend};

pub const CIRCUITS_DIR_ENV: &str = "ZKCRED_CIRCUITS_DIR";
pub const DEFAULT_CIRCUITS_DIR: &str = "circuits";

/// Environment-derived settings for a production context.
#[derive(Clone, Debug)]
pub struct ContextConfig {
    pub circuits_dir: PathBuf,
    pub retry: RetryPolicy,
    pub bb: BbConfig,
}

impl ContextConfig {
    pub fn from_env() -> Self {
        Self {
            circuits_dir: env::var_os(CIRCUITS_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CIRCUITS_DIR)),
            retry: RetryPolicy::from_env(),
            bb: BbConfig::from_env(),
        }
    }
}

/// The artifact cache, proving engine and chain access one deployment uses.
pub struct VerificationContext {
    cache: ArtifactCache,
    backend: Arc<dyn ProvingBackend>,
    fetcher: Option<Arc<dyn ChainProofFetcher>>,
}

impl VerificationContext {
    pub fn new(cache: ArtifactCache, backend: Arc<dyn ProvingBackend>) -> Self {
        Self {
            cache,
            backend,
            fetcher: None,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ChainProofFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Filesystem artifacts, the `nargo`/`bb` backend and one retrying RPC
    /// fetcher over every `ZKCRED_RPC_URL_<CHAIN_ID>` endpoint.
    pub fn from_config(config: &ContextConfig) -> CredentialResult<Self> {
        let cache = ArtifactCache::new(Arc::new(FsArtifactSource::new(&config.circuits_dir)));
        let backend = Arc::new(BbBackend::new(config.bb.clone()));
        let rpc = EthersProofFetcher::from_env()?;
        let fetcher = Arc::new(RetryingFetcher::new(rpc, config.retry));
        Ok(Self::new(cache, backend).with_fetcher(fetcher))
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn backend(&self) -> &dyn ProvingBackend {
        self.backend.as_ref()
    }

    pub fn fetcher(&self) -> CredentialResult<&dyn ChainProofFetcher> {
        self.fetcher
            .as_deref()
            .ok_or_else(|| CredentialError::DataUnavailable("no chain fetcher configured".into()))
    }
}

impl std::fmt::Debug for VerificationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationContext")
            .field("cache", &self.cache)
            .field("backend", &self.backend.name())
            .field("fetcher", &self.fetcher.is_some())
            .finish()
    }
}
