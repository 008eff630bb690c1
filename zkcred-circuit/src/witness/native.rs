use zkcred_common::{Address, Bytes32, CredentialError, CredentialResult, CredentialType};

use super::{
    balance_value, root_value, scalar_value, u64_value, ProofTarget, Witness, WitnessInputs,
    WitnessValue,
};
use crate::{
    format::format_proof,
    shape::NATIVE_BALANCE_SHAPE,
};

/// Native balance: the wallet's account proven against the block state root.
/// The zero address and slot fill the contract columns of the public layout.
pub fn build_native_balance_witness(inputs: &WitnessInputs) -> CredentialResult<Witness> {
    if inputs.circuit.credential_type != CredentialType::NativeBalance {
        return Err(CredentialError::InvalidInput(format!(
            "{} is not the native balance circuit",
            inputs.circuit
        )));
    }
    if inputs.target != ProofTarget::Account {
        return Err(CredentialError::InvalidInput(
            "native balances are proven from the account trie".into(),
        ));
    }
    if inputs.proof.address != inputs.wallet {
        return Err(CredentialError::InvalidInput(format!(
            "account proof is for {} but wallet is {}",
            inputs.proof.address, inputs.wallet
        )));
    }
    inputs.check_block()?;

    let actual = &inputs.proof.balance;
    if actual.to_be_bytes().is_empty() {
        return Err(CredentialError::InvalidInput(format!(
            "{} has no native balance",
            inputs.wallet
        )));
    }
    let disclosed = inputs.disclosed(actual)?;
    let proof = format_proof("account", &inputs.proof.account_proof, &NATIVE_BALANCE_SHAPE.proof)?;

    let mut witness = Witness::new(inputs.circuit.clone());
    inputs.push_signature(&mut witness)?;
    witness
        .push("state_root", root_value("state_root", &inputs.block.state_root)?)
        .push("account_nodes", WitnessValue::Rows(proof.nodes))
        .push("account_leaf", WitnessValue::Bytes(proof.leaf))
        .push("account_depth", WitnessValue::Integer(proof.depth))
        .push("account_balance", balance_value("account_balance", actual)?)
        .push("balance", balance_value("balance", &disclosed)?)
        .push("chain_id", u64_value(inputs.chain_id))
        .push("block_number", u64_value(inputs.block.number))
        .push("token_address", scalar_value("token_address", Address::ZERO.as_bytes())?)
        .push("balance_slot", scalar_value("balance_slot", Bytes32::ZERO.as_bytes())?);
    Ok(witness)
}
