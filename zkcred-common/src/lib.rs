//! Shared types for the zkcred credential pipeline: credential records and
//! requirements, the canonical message encoder, circuit artifacts and the
//! error taxonomy every other crate converts into.

pub mod artifacts;
pub mod canonical;
pub mod chain;
pub mod credential;
pub mod error;
pub mod types;

pub use artifacts::{
    ArtifactCache, ArtifactFile, ArtifactManifest, ArtifactSource, CircuitArtifacts,
    FsArtifactSource, VerificationKey,
};
pub use canonical::{canonical_json, to_canonical_string};
pub use chain::{AccountProof, BlockHeader, StorageSlotProof};
pub use credential::{
    Credential, CredentialMetadata, CredentialRequirement, FarcasterFidMetadata, FidRequirement,
    NativeBalanceMetadata, NativeRequirement, ProofBundle, TokenBalanceMetadata,
    TokenRequirement, CREDENTIAL_TTL_DAYS,
};
pub use error::{CredentialError, CredentialResult};
pub use types::{decode_hex, encode_hex, Address, Balance, Bytes32, CircuitId, CredentialType};

/// Version of every circuit this workspace currently ships.
pub const CURRENT_CIRCUIT_VERSION: &str = "0.1.0";

pub fn current_circuit(credential_type: CredentialType) -> CircuitId {
    CircuitId::new(credential_type, CURRENT_CIRCUIT_VERSION)
}
