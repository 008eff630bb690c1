// zkcred/zkcred-circuit/src/lib.rs

//! Circuit-side contracts of the credential pipeline: how a signed message and
//! a Merkle-Patricia proof become a fixed-shape witness, and how the public
//! outputs of a proof decode back into credential metadata.

pub mod binder;
pub mod format;
pub mod public_data;
pub mod registry;
pub mod shape;
pub mod witness;

pub use binder::{
    bind_message, hash_message, keccak256, mapping_storage_key, recover_public_key, BoundMessage,
    CredentialMessage,
};
pub use format::{format_hex_array, format_proof, FormattedProof};
pub use public_data::PUBLIC_INPUT_COUNT;
pub use registry::{circuit_for, lookup, CredentialCircuit};
pub use shape::{shape_for, Pad, ProofShape, WitnessShape};
pub use witness::{ProofTarget, Witness, WitnessInputs, WitnessValue};
