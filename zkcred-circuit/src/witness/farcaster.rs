use zkcred_common::{Address, Bytes32, CredentialError, CredentialResult, CredentialType};

use super::{
    balance_value, root_value, scalar_value, u64_value, ProofTarget, Witness, WitnessInputs,
    WitnessValue,
};
use crate::{
    binder::mapping_storage_key,
    format::format_proof,
    shape::FARCASTER_FID_SHAPE,
};

/// Farcaster ID Registry on OP Mainnet.
pub const ID_REGISTRY_ADDRESS: Address = Address([
    0x00, 0x00, 0x00, 0x00, 0xfc, 0x6c, 0x5f, 0x01, 0xfc, 0x30, 0x15, 0x19, 0x99, 0x38, 0x7b,
    0xb9, 0x9a, 0x9f, 0x48, 0x9b,
]);
pub const FARCASTER_CHAIN_ID: u64 = 10;
/// Declaration slot of `idOf`.
pub const ID_REGISTRY_ID_OF_SLOT: u64 = 2;

/// Farcaster FID: a storage proof of `idOf[wallet]` in the ID registry.
pub fn build_farcaster_fid_witness(inputs: &WitnessInputs) -> CredentialResult<Witness> {
    if inputs.circuit.credential_type != CredentialType::FarcasterFid {
        return Err(CredentialError::InvalidInput(format!(
            "{} is not the farcaster fid circuit",
            inputs.circuit
        )));
    }
    let ProofTarget::Storage { contract, slot } = &inputs.target else {
        return Err(CredentialError::InvalidInput(
            "fids are proven from registry storage".into(),
        ));
    };
    if &inputs.proof.address != contract {
        return Err(CredentialError::InvalidInput(format!(
            "proof is for {} but registry is {}",
            inputs.proof.address, contract
        )));
    }
    if inputs.claimed.is_some() {
        return Err(CredentialError::InvalidInput(
            "a fid is disclosed as proven".into(),
        ));
    }
    inputs.check_block()?;

    let key = mapping_storage_key(&inputs.wallet, slot);
    let storage = inputs.proof.storage_proof(&key).ok_or_else(|| {
        CredentialError::DataUnavailable(format!("no storage proof for key {key}"))
    })?;
    let fid_bytes = storage.value.to_be_bytes();
    if fid_bytes.is_empty() {
        return Err(CredentialError::InvalidInput(format!(
            "{} has no registered fid",
            inputs.wallet
        )));
    }
    if fid_bytes.len() > 8 {
        return Err(CredentialError::InvalidInput(format!(
            "fid {} does not fit in 64 bits",
            storage.value
        )));
    }
    let proof = format_proof("storage", &storage.proof, &FARCASTER_FID_SHAPE.proof)?;

    let mut witness = Witness::new(inputs.circuit.clone());
    inputs.push_signature(&mut witness)?;
    witness
        .push("storage_hash", root_value("storage_hash", &inputs.proof.storage_hash)?)
        .push("storage_nodes", WitnessValue::Rows(proof.nodes))
        .push("storage_leaf", WitnessValue::Bytes(proof.leaf))
        .push("storage_depth", WitnessValue::Integer(proof.depth))
        .push("storage_value", balance_value("storage_value", &storage.value)?)
        .push("fid", balance_value("fid", &storage.value)?)
        .push("chain_id", u64_value(inputs.chain_id))
        .push("block_number", u64_value(inputs.block.number))
        .push("id_registry_address", scalar_value("id_registry_address", contract.as_bytes())?)
        .push("id_slot", scalar_value("id_slot", slot.as_bytes())?);
    Ok(witness)
}

/// Default proof target for the registry on OP Mainnet.
pub fn default_registry_target() -> ProofTarget {
    ProofTarget::Storage {
        contract: ID_REGISTRY_ADDRESS,
        slot: Bytes32::from_u64(ID_REGISTRY_ID_OF_SLOT),
    }
}
