use zkcred_common::{CredentialError, CredentialResult, CredentialType};

use super::{
    balance_value, root_value, scalar_value, u64_value, ProofTarget, Witness, WitnessInputs,
    WitnessValue,
};
use crate::{
    binder::mapping_storage_key,
    format::format_proof,
    shape::TOKEN_BALANCE_SHAPE,
};

/// ERC20 and ERC721 balances: a storage proof of `balances[wallet]` in the token contract.
pub fn build_token_balance_witness(inputs: &WitnessInputs) -> CredentialResult<Witness> {
    if !matches!(
        inputs.circuit.credential_type,
        CredentialType::Erc20Balance | CredentialType::Erc721Balance
    ) {
        return Err(CredentialError::InvalidInput(format!(
            "{} is not a token balance circuit",
            inputs.circuit
        )));
    }
    let ProofTarget::Storage { contract, slot } = &inputs.target else {
        return Err(CredentialError::InvalidInput(
            "token balances are proven from contract storage".into(),
        ));
    };
    if &inputs.proof.address != contract {
        return Err(CredentialError::InvalidInput(format!(
            "proof is for {} but token is {}",
            inputs.proof.address, contract
        )));
    }
    inputs.check_block()?;

    let key = mapping_storage_key(&inputs.wallet, slot);
    let storage = inputs.proof.storage_proof(&key).ok_or_else(|| {
        CredentialError::DataUnavailable(format!("no storage proof for key {key}"))
    })?;
    if storage.value.to_be_bytes().is_empty() {
        return Err(CredentialError::InvalidInput(format!(
            "{} holds no balance of {}",
            inputs.wallet, contract
        )));
    }
    let disclosed = inputs.disclosed(&storage.value)?;
    let proof = format_proof("storage", &storage.proof, &TOKEN_BALANCE_SHAPE.proof)?;

    let mut witness = Witness::new(inputs.circuit.clone());
    inputs.push_signature(&mut witness)?;
    witness
        .push("storage_hash", root_value("storage_hash", &inputs.proof.storage_hash)?)
        .push("storage_nodes", WitnessValue::Rows(proof.nodes))
        .push("storage_leaf", WitnessValue::Bytes(proof.leaf))
        .push("storage_depth", WitnessValue::Integer(proof.depth))
        .push("storage_value", balance_value("storage_value", &storage.value)?)
        .push("balance", balance_value("balance", &disclosed)?)
        .push("chain_id", u64_value(inputs.chain_id))
        .push("block_number", u64_value(inputs.block.number))
        .push("token_address", scalar_value("token_address", contract.as_bytes())?)
        .push("balance_slot", scalar_value("balance_slot", slot.as_bytes())?);
    Ok(witness)
}
