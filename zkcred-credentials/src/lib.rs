// zkcred/zkcred-credentials/src/lib.rs

//! Issuing, reverifying and selecting anonymous credentials.
//!
//! Everything runs against an explicitly constructed [`VerificationContext`]
//! that owns the circuit artifact cache, the proving backend and the chain
//! fetcher. There is no process-wide state.

mod context;
mod matcher;
mod pipeline;
mod store;

pub use context::{ContextConfig, VerificationContext, DEFAULT_CIRCUITS_DIR};
pub use matcher::{select, select_all};
pub use pipeline::{
    create_credential, issue_credential, prepare, prove_credential, reverify_credential,
    verify_bundle, NewCredential, PreparedProof, ProofRequest,
};
pub use store::{
    CredentialStore, InMemoryCredentialStore, SledCredentialStore, CREDENTIAL_DB_ENV,
    DEFAULT_CREDENTIAL_DB_PATH,
};
