// zkcred/zkcred-circuit/src/witness/mod.rs

mod farcaster;
mod native;
mod token;

pub use farcaster::{
    build_farcaster_fid_witness, default_registry_target, FARCASTER_CHAIN_ID, ID_REGISTRY_ADDRESS,
    ID_REGISTRY_ID_OF_SLOT,
};
pub use native::build_native_balance_witness;
pub use token::build_token_balance_witness;

use std::collections::BTreeMap;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use zkcred_common::{
    decode_hex, AccountProof, Address, Balance, BlockHeader, Bytes32, CircuitId,
    CredentialError, CredentialResult,
};

use crate::{
    binder::BoundMessage,
    format::{format_bytes, scalar_bytes, u64_bytes},
    shape::{FieldKind, Pad, WitnessShape},
};

/// One circuit input value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WitnessValue {
    Integer(u64),
    /// One `0x`-prefixed byte per element.
    Bytes(Vec<String>),
    Rows(Vec<Vec<String>>),
}

/// Complete, fixed-shape input for one proof. Ephemeral; never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Witness {
    circuit: CircuitId,
    fields: Vec<(&'static str, WitnessValue)>,
}

impl Witness {
    pub fn new(circuit: CircuitId) -> Self {
        Self {
            circuit,
            fields: Vec::new(),
        }
    }

    pub fn push(&mut self, name: &'static str, value: WitnessValue) -> &mut Self {
        self.fields.push((name, value));
        self
    }

    pub fn circuit(&self) -> &CircuitId {
        &self.circuit
    }

    pub fn fields(&self) -> &[(&'static str, WitnessValue)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&WitnessValue> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// Public inputs as decimal strings, in `shape.public_layout` order.
    ///
    /// A scalar contributes one element holding its whole 32-byte value; any
    /// other byte array contributes one element per byte.
    pub fn public_inputs(&self, shape: &WitnessShape) -> CredentialResult<Vec<String>> {
        let mut out = Vec::with_capacity(shape.public_input_count());
        for name in shape.public_layout {
            let value = self.get(name).ok_or_else(|| {
                CredentialError::InvalidInput(format!("witness is missing public field '{name}'"))
            })?;
            let scalar = matches!(shape.field(name).map(|f| f.kind), Some(FieldKind::Scalar));
            match value {
                WitnessValue::Integer(n) => out.push(n.to_string()),
                WitnessValue::Bytes(items) if scalar => out.push(decimal_from_bytes(items)?),
                WitnessValue::Bytes(items) => {
                    for item in items {
                        out.push(decimal_from_bytes(std::slice::from_ref(item))?);
                    }
                }
                WitnessValue::Rows(_) => {
                    return Err(CredentialError::InvalidInput(format!(
                        "'{name}' cannot be a public input"
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Render as the prover's `Prover.toml` input file.
    pub fn to_prover_toml(&self) -> CredentialResult<String> {
        toml::to_string(&self.as_map())
            .map_err(|e| CredentialError::InvalidInput(format!("failed to render witness: {e}")))
    }

    pub fn to_json(&self) -> CredentialResult<serde_json::Value> {
        Ok(serde_json::to_value(self.as_map())?)
    }

    fn as_map(&self) -> BTreeMap<&'static str, &WitnessValue> {
        self.fields.iter().map(|(n, v)| (*n, v)).collect()
    }
}

/// Big-endian value of a run of single-byte elements, in decimal.
fn decimal_from_bytes(items: &[String]) -> CredentialResult<String> {
    let mut bytes = Vec::with_capacity(items.len());
    for item in items {
        bytes.extend(decode_hex(item)?);
    }
    Ok(BigUint::from_bytes_be(&bytes).to_str_radix(10))
}

/// Which key a proof is taken for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProofTarget {
    /// `mapping(address => uint)` entry for the wallet in `contract` at `slot`.
    Storage { contract: Address, slot: Bytes32 },
    /// The wallet's own account in the state trie.
    Account,
}

/// Everything a witness builder consumes.
#[derive(Clone, Debug)]
pub struct WitnessInputs {
    pub circuit: CircuitId,
    pub bound: BoundMessage,
    pub wallet: Address,
    pub chain_id: u64,
    pub block: BlockHeader,
    pub target: ProofTarget,
    pub proof: AccountProof,
    /// Disclose this instead of the proven value; must not exceed it.
    pub claimed: Option<Balance>,
}

impl WitnessInputs {
    /// Signature fields shared by every circuit, pushed in declaration order.
    fn push_signature(&self, witness: &mut Witness) -> CredentialResult<()> {
        if self.bound.signer != self.wallet {
            return Err(CredentialError::SignatureInvalid(format!(
                "message signed by {} but proof is for {}",
                self.bound.signer, self.wallet
            )));
        }
        witness
            .push(
                "signature",
                WitnessValue::Bytes(format_bytes("signature", &self.bound.signature, 64, Pad::Left)?),
            )
            .push(
                "message_hash",
                WitnessValue::Bytes(format_bytes(
                    "message_hash",
                    self.bound.message_hash.as_bytes(),
                    32,
                    Pad::Left,
                )?),
            )
            .push(
                "pub_key_x",
                WitnessValue::Bytes(format_bytes("pub_key_x", self.bound.pub_key_x.as_bytes(), 32, Pad::Left)?),
            )
            .push(
                "pub_key_y",
                WitnessValue::Bytes(format_bytes("pub_key_y", self.bound.pub_key_y.as_bytes(), 32, Pad::Left)?),
            );
        Ok(())
    }

    fn check_block(&self) -> CredentialResult<()> {
        if self.proof.block_number != self.block.number {
            return Err(CredentialError::InvalidInput(format!(
                "proof taken at block {} but block {} was fetched",
                self.proof.block_number, self.block.number
            )));
        }
        Ok(())
    }

    /// The value to disclose: `claimed` if given, else `actual`.
    fn disclosed(&self, actual: &Balance) -> CredentialResult<Balance> {
        match &self.claimed {
            Some(claimed) if claimed > actual => Err(CredentialError::InvalidInput(format!(
                "claimed {claimed} exceeds proven {actual}"
            ))),
            Some(claimed) => Ok(claimed.clone()),
            None => Ok(actual.clone()),
        }
    }
}

fn scalar_value(field: &str, bytes: &[u8]) -> CredentialResult<WitnessValue> {
    scalar_bytes(field, bytes).map(WitnessValue::Bytes)
}

fn u64_value(value: u64) -> WitnessValue {
    WitnessValue::Bytes(u64_bytes(value))
}

fn balance_value(field: &str, balance: &Balance) -> CredentialResult<WitnessValue> {
    scalar_value(field, &balance.to_be_bytes())
}

fn root_value(field: &str, root: &Bytes32) -> CredentialResult<WitnessValue> {
    format_bytes(field, root.as_bytes(), 32, Pad::Left).map(WitnessValue::Bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::TOKEN_BALANCE_SHAPE;

    #[test]
    fn public_inputs_flatten_in_layout_order() {
        let mut witness = Witness::new(CircuitId::new(
            zkcred_common::CredentialType::Erc20Balance,
            "0.1.0",
        ));
        witness
            .push("storage_hash", root_value("storage_hash", &Bytes32([0xff; 32])).unwrap())
            .push("balance", u64_value(10_000))
            .push("chain_id", u64_value(1))
            .push("block_number", u64_value(7))
            .push("token_address", u64_value(0))
            .push("balance_slot", u64_value(3));

        let inputs = witness.public_inputs(&TOKEN_BALANCE_SHAPE).unwrap();
        assert_eq!(inputs.len(), 37);
        assert_eq!(&inputs[..5], &["10000", "1", "7", "0", "3"]);
        assert!(inputs[5..].iter().all(|b| b == "255"));
    }

    #[test]
    fn wide_scalars_fold_into_one_input() {
        let mut witness = Witness::new(CircuitId::new(
            zkcred_common::CredentialType::Erc20Balance,
            "0.1.0",
        ));
        witness
            .push("storage_hash", root_value("storage_hash", &Bytes32::ZERO).unwrap())
            .push(
                "balance",
                balance_value("balance", &Balance::from_be_bytes(&[0xff; 32])).unwrap(),
            )
            .push("chain_id", u64_value(u64::MAX))
            .push("block_number", u64_value(0))
            .push("token_address", scalar_value("token_address", &[0xff; 20]).unwrap())
            .push("balance_slot", u64_value(0));

        let inputs = witness.public_inputs(&TOKEN_BALANCE_SHAPE).unwrap();
        assert_eq!(inputs.len(), 37);
        assert_eq!(inputs[0], BigUint::from_bytes_be(&[0xff; 32]).to_str_radix(10));
        assert_eq!(inputs[1], u64::MAX.to_string());
        assert_eq!(inputs[3], BigUint::from_bytes_be(&[0xff; 20]).to_str_radix(10));
    }

    #[test]
    fn witness_renders_as_prover_toml() {
        let mut witness = Witness::new(CircuitId::new(
            zkcred_common::CredentialType::NativeBalance,
            "0.1.0",
        ));
        witness
            .push("account_depth", WitnessValue::Integer(4))
            .push("leaf", WitnessValue::Bytes(vec!["0x01".into(), "0x00".into()]))
            .push("nodes", WitnessValue::Rows(vec![vec!["0x02".into()]]));
        let toml = witness.to_prover_toml().unwrap();
        assert!(toml.contains("account_depth = 4"));
        assert!(toml.contains(r#"leaf = ["0x01", "0x00"]"#));
        assert!(toml.contains(r#"nodes = [["0x02"]]"#));

        let json = witness.to_json().unwrap();
        assert_eq!(json["leaf"][0], "0x01");
    }
}
