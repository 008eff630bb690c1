//! Byte-level formatting of witness values.
//!
//! Circuits take every byte as its own `0x`-prefixed element. Anything longer
//! than its declared width is refused; nothing is ever truncated.

use zkcred_common::{decode_hex, CredentialError, CredentialResult};

use crate::shape::{Pad, ProofShape};

pub fn byte_element(byte: u8) -> String {
    format!("0x{byte:02x}")
}

/// Split a hex string into single-byte elements padded to `len`.
pub fn format_hex_array(hex: &str, len: usize, pad: Pad) -> CredentialResult<Vec<String>> {
    let bytes = decode_hex(hex)?;
    format_bytes("hex input", &bytes, len, pad)
}

pub fn format_bytes(field: &str, bytes: &[u8], len: usize, pad: Pad) -> CredentialResult<Vec<String>> {
    if bytes.len() > len {
        return Err(CredentialError::shape(field, len, bytes.len()));
    }
    let fill = std::iter::repeat(byte_element(0)).take(len - bytes.len());
    let content = bytes.iter().copied().map(byte_element);
    Ok(match pad {
        Pad::Left => fill.chain(content).collect(),
        Pad::Right => content.chain(fill).collect(),
    })
}

/// Width of every scalar input (balances, ids, addresses, slots).
pub const SCALAR_LEN: usize = 32;

/// A big-endian scalar as 32 single-byte elements, zeros in front.
pub fn scalar_bytes(field: &str, bytes: &[u8]) -> CredentialResult<Vec<String>> {
    format_bytes(field, bytes, SCALAR_LEN, Pad::Left)
}

pub fn u64_bytes(value: u64) -> Vec<String> {
    let mut out = vec![byte_element(0); SCALAR_LEN - 8];
    out.extend(value.to_be_bytes().into_iter().map(byte_element));
    out
}

/// A trie proof laid out for the circuit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormattedProof {
    pub nodes: Vec<Vec<String>>,
    pub leaf: Vec<String>,
    /// Node count of the unpadded proof, leaf included.
    pub depth: u64,
}

/// Split a proof into inner nodes and leaf, padding each to `shape`.
///
/// `label` prefixes field names in shape errors, e.g. `storage` gives
/// `storage_nodes` and `storage_leaf`.
pub fn format_proof(label: &str, proof: &[Vec<u8>], shape: &ProofShape) -> CredentialResult<FormattedProof> {
    let (leaf, inner) = proof.split_last().ok_or_else(|| {
        CredentialError::DataUnavailable(format!("{label} proof has no nodes"))
    })?;

    let nodes_field = format!("{label}_nodes");
    if inner.len() > shape.max_nodes {
        return Err(CredentialError::shape(nodes_field, shape.max_nodes, inner.len()));
    }

    let mut nodes = inner
        .iter()
        .map(|node| format_bytes(&nodes_field, node, shape.max_node_len, Pad::Right))
        .collect::<CredentialResult<Vec<_>>>()?;
    let empty = vec![byte_element(0); shape.max_node_len];
    nodes.resize(shape.max_nodes, empty);

    let leaf = format_bytes(&format!("{label}_leaf"), leaf, shape.max_leaf_len, Pad::Right)?;

    Ok(FormattedProof {
        nodes,
        leaf,
        depth: proof.len() as u64,
    })
}
