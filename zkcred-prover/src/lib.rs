// zkcred/zkcred-prover/src/lib.rs

mod bb;

pub use bb::{BbBackend, BbConfig, ToolRuntime};

use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use zkcred_circuit::{lookup, Witness};
use zkcred_common::{
    ArtifactCache, CircuitArtifacts, CircuitId, CredentialError, CredentialResult, ProofBundle,
};
use zkcred_verifier::VerifyingBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("{0} is not available: {1}")]
    Runtime(String, String),

    #[error("unexpected prover output: {0}")]
    Output(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<BackendError> for CredentialError {
    fn from(err: BackendError) -> Self {
        CredentialError::Backend(err.to_string())
    }
}

/// A witness the engine has executed, ready to be proven.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolvedWitness {
    pub circuit: CircuitId,
    /// Engine-specific encoding of the full solved witness.
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawProof {
    pub proof: Vec<u8>,
    pub public_inputs: Vec<String>,
}

/// The engine half that produces proofs. Proving is not cancellable: dropping
/// the future stops waiting but the engine may keep running.
#[async_trait]
pub trait ProvingBackend: VerifyingBackend {
    fn name(&self) -> &str;

    async fn solve_witness(
        &self,
        artifacts: &CircuitArtifacts,
        witness: &Witness,
    ) -> Result<SolvedWitness, BackendError>;

    async fn prove(
        &self,
        artifacts: &CircuitArtifacts,
        solved: &SolvedWitness,
    ) -> Result<RawProof, BackendError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProofStage {
    LoadingArtifacts,
    SolvingWitness,
    Proving,
    Done,
}

#[derive(Clone, Debug)]
pub struct GeneratedProof {
    pub bundle: ProofBundle,
    pub elapsed: Duration,
}

/// Prove `witness` with the artifacts of its circuit, reporting each stage.
///
/// The backend's public inputs must match the ones the witness declares, so a
/// proof over anything other than what was built is never returned.
pub async fn generate_proof(
    cache: &ArtifactCache,
    backend: &dyn ProvingBackend,
    witness: &Witness,
    on_stage: &mut (dyn FnMut(ProofStage) + Send),
) -> CredentialResult<GeneratedProof> {
    let started = Instant::now();
    let circuit = lookup(witness.circuit())?;
    circuit.shape.check(witness)?;
    let expected_inputs = circuit.public_inputs(witness)?;

    on_stage(ProofStage::LoadingArtifacts);
    let artifacts = cache.get(witness.circuit()).await?;

    on_stage(ProofStage::SolvingWitness);
    let solved = backend.solve_witness(&artifacts, witness).await?;
    info!(
        circuit = %witness.circuit(),
        backend = backend.name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "witness solved"
    );

    on_stage(ProofStage::Proving);
    let raw = backend.prove(&artifacts, &solved).await?;
    if raw.public_inputs != expected_inputs {
        return Err(CredentialError::Backend(format!(
            "{} returned public inputs that differ from the witness",
            backend.name()
        )));
    }

    on_stage(ProofStage::Done);
    let elapsed = started.elapsed();
    info!(
        circuit = %witness.circuit(),
        backend = backend.name(),
        proof_bytes = raw.proof.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "proof generated"
    );
    Ok(GeneratedProof {
        bundle: ProofBundle::new(witness.circuit(), raw.proof, raw.public_inputs),
        elapsed,
    })
}

/// Decode concatenated 32-byte big-endian field elements to decimal strings.
pub fn decode_field_elements(bytes: &[u8]) -> Result<Vec<String>, BackendError> {
    if bytes.len() % 32 != 0 {
        return Err(BackendError::Output(format!(
            "public inputs are {} bytes, not a multiple of 32",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks(32)
        .map(|chunk| num_bigint::BigUint::from_bytes_be(chunk).to_str_radix(10))
        .collect())
}

/// Encode decimal field elements as concatenated 32-byte big-endian words.
pub fn encode_field_elements(elements: &[String]) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::with_capacity(elements.len() * 32);
    for element in elements {
        let value = num_bigint::BigUint::parse_bytes(element.as_bytes(), 10)
            .ok_or_else(|| BackendError::Output(format!("'{element}' is not decimal")))?;
        let bytes = value.to_bytes_be();
        if bytes.len() > 32 {
            return Err(BackendError::Output(format!("'{element}' exceeds 32 bytes")));
        }
        out.extend(std::iter::repeat(0u8).take(32 - bytes.len()));
        out.extend_from_slice(&bytes);
    }
    Ok(out)
}
