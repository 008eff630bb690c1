// zkcred/zkcred-circuit/src/shape.rs

use serde::Serialize;
use zkcred_common::{CredentialError, CredentialResult, CredentialType};

use crate::{
    format::SCALAR_LEN,
    witness::{Witness, WitnessValue},
};

/// Side on which a fixed-length array is filled with zero bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pad {
    /// Numbers and hashes: zeros go in front, value stays right-aligned.
    Left,
    /// Opaque blobs such as trie nodes: zeros trail the content.
    Right,
}

/// Declared maxima for one kind of Merkle-Patricia proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProofShape {
    pub max_nodes: usize,
    pub max_node_len: usize,
    pub max_leaf_len: usize,
}

pub const STORAGE_PROOF_SHAPE: ProofShape = ProofShape {
    max_nodes: 7,
    max_node_len: 532,
    max_leaf_len: 69,
};

pub const ACCOUNT_PROOF_SHAPE: ProofShape = ProofShape {
    max_nodes: 10,
    max_node_len: 532,
    max_leaf_len: 142,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// 32 single-byte elements, big-endian, zeros in front. Public as one element.
    Scalar,
    /// A small integer (node counts).
    Integer,
    Bytes { len: usize, pad: Pad },
    Rows { rows: usize, len: usize, pad: Pad },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FieldShape {
    pub name: &'static str,
    #[serde(flatten)]
    pub kind: FieldKind,
}

const fn scalar(name: &'static str) -> FieldShape {
    FieldShape {
        name,
        kind: FieldKind::Scalar,
    }
}

const fn bytes(name: &'static str, len: usize, pad: Pad) -> FieldShape {
    FieldShape {
        name,
        kind: FieldKind::Bytes { len, pad },
    }
}

const fn rows(name: &'static str, rows: usize, len: usize) -> FieldShape {
    FieldShape {
        name,
        kind: FieldKind::Rows {
            rows,
            len,
            pad: Pad::Right,
        },
    }
}

const fn integer(name: &'static str) -> FieldShape {
    FieldShape {
        name,
        kind: FieldKind::Integer,
    }
}

/// Input contract for one compiled circuit: fields in declaration order and
/// the order in which the public ones are emitted as public inputs.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct WitnessShape {
    pub proof: ProofShape,
    pub fields: &'static [FieldShape],
    pub public_layout: &'static [&'static str],
}

pub const SIGNATURE_LEN: usize = 64;
pub const HASH_LEN: usize = 32;
pub const COORDINATE_LEN: usize = 32;
pub const ROOT_LEN: usize = 32;

const TOKEN_BALANCE_FIELDS: &[FieldShape] = &[
    bytes("signature", SIGNATURE_LEN, Pad::Left),
    bytes("message_hash", HASH_LEN, Pad::Left),
    bytes("pub_key_x", COORDINATE_LEN, Pad::Left),
    bytes("pub_key_y", COORDINATE_LEN, Pad::Left),
    bytes("storage_hash", ROOT_LEN, Pad::Left),
    rows(
        "storage_nodes",
        STORAGE_PROOF_SHAPE.max_nodes,
        STORAGE_PROOF_SHAPE.max_node_len,
    ),
    bytes("storage_leaf", STORAGE_PROOF_SHAPE.max_leaf_len, Pad::Right),
    integer("storage_depth"),
    scalar("storage_value"),
    scalar("balance"),
    scalar("chain_id"),
    scalar("block_number"),
    scalar("token_address"),
    scalar("balance_slot"),
];

const NATIVE_BALANCE_FIELDS: &[FieldShape] = &[
    bytes("signature", SIGNATURE_LEN, Pad::Left),
    bytes("message_hash", HASH_LEN, Pad::Left),
    bytes("pub_key_x", COORDINATE_LEN, Pad::Left),
    bytes("pub_key_y", COORDINATE_LEN, Pad::Left),
    bytes("state_root", ROOT_LEN, Pad::Left),
    rows(
        "account_nodes",
        ACCOUNT_PROOF_SHAPE.max_nodes,
        ACCOUNT_PROOF_SHAPE.max_node_len,
    ),
    bytes("account_leaf", ACCOUNT_PROOF_SHAPE.max_leaf_len, Pad::Right),
    integer("account_depth"),
    scalar("account_balance"),
    scalar("balance"),
    scalar("chain_id"),
    scalar("block_number"),
    scalar("token_address"),
    scalar("balance_slot"),
];

const FARCASTER_FID_FIELDS: &[FieldShape] = &[
    bytes("signature", SIGNATURE_LEN, Pad::Left),
    bytes("message_hash", HASH_LEN, Pad::Left),
    bytes("pub_key_x", COORDINATE_LEN, Pad::Left),
    bytes("pub_key_y", COORDINATE_LEN, Pad::Left),
    bytes("storage_hash", ROOT_LEN, Pad::Left),
    rows(
        "storage_nodes",
        STORAGE_PROOF_SHAPE.max_nodes,
        STORAGE_PROOF_SHAPE.max_node_len,
    ),
    bytes("storage_leaf", STORAGE_PROOF_SHAPE.max_leaf_len, Pad::Right),
    integer("storage_depth"),
    scalar("storage_value"),
    scalar("fid"),
    scalar("chain_id"),
    scalar("block_number"),
    scalar("id_registry_address"),
    scalar("id_slot"),
];

pub const TOKEN_BALANCE_SHAPE: WitnessShape = WitnessShape {
    proof: STORAGE_PROOF_SHAPE,
    fields: TOKEN_BALANCE_FIELDS,
    public_layout: &[
        "balance",
        "chain_id",
        "block_number",
        "token_address",
        "balance_slot",
        "storage_hash",
    ],
};

pub const NATIVE_BALANCE_SHAPE: WitnessShape = WitnessShape {
    proof: ACCOUNT_PROOF_SHAPE,
    fields: NATIVE_BALANCE_FIELDS,
    public_layout: &[
        "balance",
        "chain_id",
        "block_number",
        "token_address",
        "balance_slot",
        "state_root",
    ],
};

pub const FARCASTER_FID_SHAPE: WitnessShape = WitnessShape {
    proof: STORAGE_PROOF_SHAPE,
    fields: FARCASTER_FID_FIELDS,
    public_layout: &[
        "fid",
        "chain_id",
        "block_number",
        "id_registry_address",
        "id_slot",
        "storage_hash",
    ],
};

pub fn shape_for(credential_type: CredentialType) -> &'static WitnessShape {
    match credential_type {
        CredentialType::Erc20Balance | CredentialType::Erc721Balance => &TOKEN_BALANCE_SHAPE,
        CredentialType::NativeBalance => &NATIVE_BALANCE_SHAPE,
        CredentialType::FarcasterFid => &FARCASTER_FID_SHAPE,
    }
}

impl FieldKind {
    /// Number of public-input elements this field contributes when public.
    pub fn public_width(&self) -> usize {
        match self {
            FieldKind::Scalar | FieldKind::Integer => 1,
            FieldKind::Bytes { len, .. } => *len,
            FieldKind::Rows { rows, len, .. } => rows * len,
        }
    }
}

impl WitnessShape {
    pub fn field(&self, name: &str) -> Option<&FieldShape> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn public_input_count(&self) -> usize {
        self.public_layout
            .iter()
            .filter_map(|name| self.field(name))
            .map(|f| f.kind.public_width())
            .sum()
    }

    /// Confirm a witness carries exactly the declared fields at their declared widths.
    pub fn check(&self, witness: &Witness) -> CredentialResult<()> {
        if witness.fields().len() != self.fields.len() {
            return Err(CredentialError::InvalidInput(format!(
                "witness has {} fields, circuit declares {}",
                witness.fields().len(),
                self.fields.len()
            )));
        }
        for (declared, (name, value)) in self.fields.iter().zip(witness.fields()) {
            if declared.name != *name {
                return Err(CredentialError::InvalidInput(format!(
                    "witness field '{name}' where '{}' was declared",
                    declared.name
                )));
            }
            check_value(declared, value)?;
        }
        Ok(())
    }
}

fn check_value(declared: &FieldShape, value: &WitnessValue) -> CredentialResult<()> {
    let name = declared.name;
    match (&declared.kind, value) {
        (FieldKind::Integer, WitnessValue::Integer(_)) => Ok(()),
        (FieldKind::Scalar, WitnessValue::Bytes(items)) => exact(name, SCALAR_LEN, items.len()),
        (FieldKind::Bytes { len, .. }, WitnessValue::Bytes(items)) => exact(name, *len, items.len()),
        (FieldKind::Rows { rows, len, .. }, WitnessValue::Rows(items)) => {
            exact(name, *rows, items.len())?;
            items
                .iter()
                .try_for_each(|row| exact(name, *len, row.len()))
        }
        _ => Err(CredentialError::InvalidInput(format!(
            "witness field '{name}' has the wrong kind"
        ))),
    }
}

fn exact(name: &str, expected: usize, actual: usize) -> CredentialResult<()> {
    if actual > expected {
        return Err(CredentialError::shape(name, expected, actual));
    }
    if actual < expected {
        return Err(CredentialError::InvalidInput(format!(
            "{name} is {actual} elements wide, expected {expected}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_layout_emits_thirty_seven_inputs() {
        for ty in CredentialType::ALL {
            assert_eq!(shape_for(ty).public_input_count(), 37, "{ty}");
        }
    }

    #[test]
    fn layout_names_are_declared_fields() {
        for ty in CredentialType::ALL {
            let shape = shape_for(ty);
            for name in shape.public_layout {
                assert!(shape.field(name).is_some(), "{ty}: {name}");
            }
        }
    }

    #[test]
    fn shape_table_serializes() {
        let json = serde_json::to_value(&TOKEN_BALANCE_SHAPE).unwrap();
        assert_eq!(json["proof"]["max_nodes"], 7);
        assert_eq!(json["fields"][5]["kind"], "rows");
        assert_eq!(json["fields"][5]["len"], 532);
        assert_eq!(json["fields"][6]["pad"], "right");
    }
}
