// zkcred/zkcred-verifier/src/lib.rs

use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};
use zkcred_circuit::lookup;
use zkcred_common::{CircuitId, CredentialError, ProofBundle, VerificationKey};

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("{circuit} expects {expected} public inputs, got {actual}")]
    WrongInputCount {
        circuit: CircuitId,
        expected: usize,
        actual: usize,
    },

    #[error("verification key belongs to {actual}, proof claims {expected}")]
    KeyMismatch {
        expected: CircuitId,
        actual: CircuitId,
    },

    #[error("proof bytes are empty")]
    EmptyProof,

    #[error("public input {index} is not a decimal field element: '{value}'")]
    NotDecimal { index: usize, value: String },

    #[error("unsupported circuit: {0}")]
    UnknownCircuit(String),

    #[error("verifier backend failed: {0}")]
    Backend(String),
}

impl From<VerifyError> for CredentialError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Backend(msg) => CredentialError::Backend(msg),
            other => CredentialError::MalformedProof(other.to_string()),
        }
    }
}

/// The engine half that checks proofs. Implementations return `Ok(false)` for
/// a well-formed proof that does not verify.
#[async_trait]
pub trait VerifyingBackend: Send + Sync {
    async fn verify(
        &self,
        vk: &VerificationKey,
        proof: &[u8],
        public_inputs: &[String],
    ) -> Result<bool, VerifyError>;
}

/// Reject inputs that are structurally wrong for the claimed circuit.
pub fn check_well_formed(vk: &VerificationKey, bundle: &ProofBundle) -> Result<(), VerifyError> {
    let claimed = bundle.circuit_id();
    if vk.circuit != claimed {
        return Err(VerifyError::KeyMismatch {
            expected: claimed,
            actual: vk.circuit.clone(),
        });
    }
    let circuit = lookup(&claimed).map_err(|e| VerifyError::UnknownCircuit(e.to_string()))?;
    let expected = circuit.shape.public_input_count();
    if bundle.public_inputs.len() != expected {
        return Err(VerifyError::WrongInputCount {
            circuit: claimed,
            expected,
            actual: bundle.public_inputs.len(),
        });
    }
    if bundle.proof.is_empty() {
        return Err(VerifyError::EmptyProof);
    }
    if let Some((index, value)) = bundle
        .public_inputs
        .iter()
        .enumerate()
        .find(|(_, v)| v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(VerifyError::NotDecimal {
            index,
            value: value.clone(),
        });
    }
    Ok(())
}

/// Verify `bundle` against `vk`.
///
/// `Ok(false)` means the proof is well formed but does not verify; any error
/// means the inputs could not be checked at all.
pub async fn verify_proof<B: VerifyingBackend + ?Sized>(
    backend: &B,
    vk: &VerificationKey,
    bundle: &ProofBundle,
) -> Result<bool, VerifyError> {
    check_well_formed(vk, bundle)?;

    let started = Instant::now();
    let valid = backend
        .verify(vk, &bundle.proof, &bundle.public_inputs)
        .await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if valid {
        info!(circuit = %vk.circuit, elapsed_ms, "proof verified");
    } else {
        warn!(circuit = %vk.circuit, elapsed_ms, "proof rejected");
    }
    Ok(valid)
}
