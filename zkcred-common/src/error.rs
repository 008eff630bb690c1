//! Error taxonomy shared by every zkcred crate.

use thiserror::Error;

/// Aggregated error type for the credential pipeline.
///
/// Verification reports a rejected proof as `Ok(false)`; only credential
/// creation turns that into [`CredentialError::ProofRejected`]. "No usable
/// credential" is an `Option::None` from the matcher.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Chain data could not be fetched or is too shallow to use. Retryable.
    #[error("chain data unavailable: {0}")]
    DataUnavailable(String),

    /// A witness field exceeds its declared maximum.
    #[error("{field} exceeds declared maximum: {actual} > {max}")]
    ShapeViolation {
        field: String,
        max: usize,
        actual: usize,
    },

    /// Signature recovery failed or the signer is not the proven wallet.
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// Caller supplied inputs that cannot describe a valid credential.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Circuit program or verification key could not be loaded.
    #[error("artifact error: {0}")]
    Artifact(String),

    /// The external proving engine failed.
    #[error("proving backend error: {0}")]
    Backend(String),

    /// The proof is well formed but the verifier refused it.
    #[error("proof rejected for {0}")]
    ProofRejected(String),

    /// Proof bytes or public inputs are structurally wrong for the claimed circuit.
    #[error("malformed proof: {0}")]
    MalformedProof(String),

    /// The persistence boundary failed.
    #[error("credential store error: {0}")]
    Store(String),
}

impl CredentialError {
    pub fn shape(field: impl Into<String>, max: usize, actual: usize) -> Self {
        CredentialError::ShapeViolation {
            field: field.into(),
            max,
            actual,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CredentialError::DataUnavailable(_))
    }
}

impl From<serde_json::Error> for CredentialError {
    fn from(err: serde_json::Error) -> Self {
        CredentialError::InvalidInput(err.to_string())
    }
}

impl From<anyhow::Error> for CredentialError {
    fn from(err: anyhow::Error) -> Self {
        CredentialError::InvalidInput(format!("{err:#}"))
    }
}

pub type CredentialResult<T> = Result<T, CredentialError>;
