//! Deterministic keys, chain state, circuit artifacts and a digest-based
//! proving backend shared by the zkcred test suites.

mod backend;
mod chain;

pub use backend::DigestBackend;
pub use chain::{
    native_balance_proof, storage_account_proof, token_balance_proof, trie_nodes, FixtureChain,
};

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use k256::{ecdsa::SigningKey, elliptic_curve::sec1::ToEncodedPoint};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tempfile::TempDir;
use zkcred_circuit::{hash_message, keccak256, CredentialMessage};
use zkcred_common::{
    artifacts::write_circuit_artifacts, current_circuit, Address, ArtifactCache, CircuitId,
    CredentialType, FsArtifactSource,
};

/// A wallet with a deterministic secp256k1 key.
#[derive(Clone)]
pub struct Holder {
    key: SigningKey,
    address: Address,
}

impl Holder {
    pub fn from_seed(seed: u64) -> Self {
        let key = SigningKey::random(&mut ChaCha20Rng::seed_from_u64(seed));
        let point = key.verifying_key().to_encoded_point(false);
        let digest = keccak256(&point.as_bytes()[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&digest[12..]);
        Self {
            key,
            address: Address(address),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// `personal_sign` over `message`: 65 bytes `r || s || v` with `v` in {27, 28}.
    pub fn sign(&self, message: &str) -> Result<Vec<u8>> {
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(hash_message(message).as_bytes())
            .context("failed to sign message")?;
        let mut out = signature.to_bytes().to_vec();
        out.push(recovery_id.to_byte() + 27);
        Ok(out)
    }

    /// Canonical form of `message` and the holder's signature over it.
    pub fn sign_credential_message(&self, message: &CredentialMessage) -> Result<(String, Vec<u8>)> {
        let canonical = message.canonical()?;
        let signature = self.sign(&canonical)?;
        Ok((canonical, signature))
    }
}

impl std::fmt::Debug for Holder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Holder").field("address", &self.address).finish()
    }
}

/// Verification key bytes the fixtures ship for `circuit`.
pub fn fixture_vk_bytes(circuit: &CircuitId) -> Vec<u8> {
    format!("zkcred-fixture-vk:{circuit}").into_bytes()
}

fn fixture_program(circuit: &CircuitId) -> Vec<u8> {
    serde_json::json!({
        "name": circuit.credential_type.slug(),
        "version": circuit.version,
        "bytecode": "",
    })
    .to_string()
    .into_bytes()
}

/// Write manifests, programs and keys for every current circuit under `root`.
pub fn write_fixture_artifacts(root: &Path) -> Result<()> {
    for ty in CredentialType::ALL {
        let circuit = current_circuit(ty);
        write_circuit_artifacts(root, &circuit, &fixture_program(&circuit), &fixture_vk_bytes(&circuit))
            .with_context(|| format!("failed to write artifacts for {circuit}"))?;
    }
    Ok(())
}

/// Temporary artifact root populated by [`write_fixture_artifacts`].
pub struct ArtifactDir {
    dir: TempDir,
}

impl ArtifactDir {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create artifact dir")?;
        write_fixture_artifacts(dir.path())?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A fresh, empty cache over this directory.
    pub fn cache(&self) -> ArtifactCache {
        ArtifactCache::new(Arc::new(FsArtifactSource::new(self.path())))
    }
}
