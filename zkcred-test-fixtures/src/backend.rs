//! A proving backend whose proofs are keyed digests.
//!
//! The "proof" is blake3 keyed by the verification key's hash over the circuit
//! id and every public input, so changing any input or using another key makes
//! verification return `false`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use zkcred_circuit::{lookup, Witness};
use zkcred_common::{CircuitArtifacts, VerificationKey};
use zkcred_prover::{BackendError, ProvingBackend, RawProof, SolvedWitness};
use zkcred_verifier::{VerifyError, VerifyingBackend};

const PROOF_TAG: &[u8] = b"zkcred-digest-proof-v1:";

#[derive(Debug, Default)]
pub struct DigestBackend {
    solves: AtomicUsize,
    proofs: AtomicUsize,
    verifies: AtomicUsize,
    skew_outputs: AtomicBool,
}

impl DigestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `prove` report a balance different from the witness.
    pub fn skew_outputs(&self, skew: bool) {
        self.skew_outputs.store(skew, Ordering::SeqCst);
    }

    pub fn solve_calls(&self) -> usize {
        self.solves.load(Ordering::SeqCst)
    }

    pub fn prove_calls(&self) -> usize {
        self.proofs.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verifies.load(Ordering::SeqCst)
    }

    pub fn proof_for(vk: &VerificationKey, public_inputs: &[String]) -> Vec<u8> {
        let key = *blake3::hash(&vk.bytes).as_bytes();
        let mut hasher = blake3::Hasher::new_keyed(&key);
        hasher.update(vk.circuit.to_string().as_bytes());
        for input in public_inputs {
            hasher.update(input.as_bytes());
            hasher.update(&[0]);
        }
        let mut proof = PROOF_TAG.to_vec();
        proof.extend_from_slice(hasher.finalize().as_bytes());
        proof
    }
}

#[async_trait]
impl ProvingBackend for DigestBackend {
    fn name(&self) -> &str {
        "digest"
    }

    async fn solve_witness(
        &self,
        artifacts: &CircuitArtifacts,
        witness: &Witness,
    ) -> Result<SolvedWitness, BackendError> {
        self.solves.fetch_add(1, Ordering::SeqCst);
        if &artifacts.circuit != witness.circuit() {
            return Err(BackendError::Output(format!(
                "artifacts for {} cannot solve a {} witness",
                artifacts.circuit,
                witness.circuit()
            )));
        }
        let inputs = lookup(witness.circuit())
            .and_then(|circuit| circuit.public_inputs(witness))
            .map_err(|e| BackendError::Output(e.to_string()))?;
        let bytes = serde_json::to_vec(&inputs).map_err(|e| BackendError::Output(e.to_string()))?;
        Ok(SolvedWitness {
            circuit: artifacts.circuit.clone(),
            bytes,
        })
    }

    async fn prove(
        &self,
        artifacts: &CircuitArtifacts,
        solved: &SolvedWitness,
    ) -> Result<RawProof, BackendError> {
        self.proofs.fetch_add(1, Ordering::SeqCst);
        let mut public_inputs: Vec<String> =
            serde_json::from_slice(&solved.bytes).map_err(|e| BackendError::Output(e.to_string()))?;
        if self.skew_outputs.load(Ordering::SeqCst) {
            if let Some(first) = public_inputs.first_mut() {
                first.push('0');
            }
        }
        Ok(RawProof {
            proof: Self::proof_for(&artifacts.vk, &public_inputs),
            public_inputs,
        })
    }
}

#[async_trait]
impl VerifyingBackend for DigestBackend {
    async fn verify(
        &self,
        vk: &VerificationKey,
        proof: &[u8],
        public_inputs: &[String],
    ) -> Result<bool, VerifyError> {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        Ok(proof == Self::proof_for(vk, public_inputs).as_slice())
    }
}
