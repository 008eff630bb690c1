//! Chain state as returned by `eth_getBlockByNumber` and `eth_getProof`,
//! reduced to the parts the witness builders consume.

use serde::{Deserialize, Serialize};

use crate::types::{hex_bytes, Address, Balance, Bytes32};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub state_root: Bytes32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSlotProof {
    pub key: Bytes32,
    pub value: Balance,
    /// Trie nodes from the storage root down to the leaf, RLP encoded.
    #[serde(with = "hex_nodes")]
    pub proof: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProof {
    pub address: Address,
    pub block_number: u64,
    pub balance: Balance,
    pub nonce: u64,
    pub code_hash: Bytes32,
    pub storage_hash: Bytes32,
    #[serde(with = "hex_nodes")]
    pub account_proof: Vec<Vec<u8>>,
    pub storage_proofs: Vec<StorageSlotProof>,
}

impl AccountProof {
    pub fn storage_proof(&self, key: &Bytes32) -> Option<&StorageSlotProof> {
        self.storage_proofs.iter().find(|p| &p.key == key)
    }
}

mod hex_nodes {
    use serde::{de, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    use crate::types::{decode_hex, encode_hex};

    pub fn serialize<S: Serializer>(nodes: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(nodes.len()))?;
        for node in nodes {
            seq.serialize_element(&encode_hex(node))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|node| decode_hex(node).map_err(de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_serialize_as_hex_strings() {
        let proof = StorageSlotProof {
            key: Bytes32::from_u64(2),
            value: Balance::from(7u64),
            proof: vec![vec![0xf8, 0x51], vec![0xe2]],
        };
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["proof"][0], "0xf851");
        assert_eq!(json["value"], "7");
        let back: StorageSlotProof = serde_json::from_value(json).unwrap();
        assert_eq!(back, proof);
    }
}
