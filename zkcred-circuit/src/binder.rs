// zkcred/zkcred-circuit/src/binder.rs

use k256::{
    ecdsa::{RecoveryId, Signature, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
};
use serde::Serialize;
use sha3::{Digest, Keccak256};
use zkcred_common::{
    to_canonical_string, Address, Bytes32, CircuitId, CredentialError, CredentialResult,
    CredentialType,
};

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// EIP-191 personal-message hash, the digest wallets sign for `personal_sign`.
pub fn hash_message(message: &str) -> Bytes32 {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()).as_bytes());
    hasher.update(message.as_bytes());
    Bytes32(hasher.finalize().into())
}

/// Storage key of `mapping(address => _)` entry `owner` declared at `slot`.
pub fn mapping_storage_key(owner: &Address, slot: &Bytes32) -> Bytes32 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(owner.to_word().as_bytes());
    preimage[32..].copy_from_slice(slot.as_bytes());
    Bytes32(keccak256(&preimage))
}

pub fn address_from_coordinates(x: &Bytes32, y: &Bytes32) -> Address {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(x.as_bytes());
    preimage[32..].copy_from_slice(y.as_bytes());
    let digest = keccak256(&preimage);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&digest[12..]);
    Address(addr)
}

/// What a holder signs before proving: the circuit and the chain state the
/// proof will be taken against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialMessage {
    pub credential_type: CredentialType,
    pub version: String,
    pub chain_id: u64,
    pub block_number: u64,
    /// Contract whose storage is proven; the zero address for account proofs.
    pub contract: Address,
    pub root: Bytes32,
}

impl CredentialMessage {
    pub fn new(
        circuit: &CircuitId,
        chain_id: u64,
        block_number: u64,
        contract: Address,
        root: Bytes32,
    ) -> Self {
        Self {
            credential_type: circuit.credential_type,
            version: circuit.version.clone(),
            chain_id,
            block_number,
            contract,
            root,
        }
    }

    pub fn canonical(&self) -> CredentialResult<String> {
        to_canonical_string(self)
    }
}

/// A signed message with the signer's key recovered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundMessage {
    pub message: String,
    pub message_hash: Bytes32,
    /// Low-s `r || s`.
    pub signature: [u8; 64],
    pub pub_key_x: Bytes32,
    pub pub_key_y: Bytes32,
    pub signer: Address,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveredKey {
    pub signature: [u8; 64],
    pub x: Bytes32,
    pub y: Bytes32,
}

/// Hash `message` and recover who signed it.
pub fn bind_message(message: &str, signature: &[u8]) -> CredentialResult<BoundMessage> {
    let message_hash = hash_message(message);
    let recovered = recover_public_key(&message_hash, signature)?;
    Ok(BoundMessage {
        message: message.to_owned(),
        signer: address_from_coordinates(&recovered.x, &recovered.y),
        message_hash,
        signature: recovered.signature,
        pub_key_x: recovered.x,
        pub_key_y: recovered.y,
    })
}

/// Recover the public key from a 65-byte `r || s || v` signature over `hash`.
pub fn recover_public_key(hash: &Bytes32, signature: &[u8]) -> CredentialResult<RecoveredKey> {
    if signature.len() != 65 {
        return Err(CredentialError::SignatureInvalid(format!(
            "expected 65 signature bytes, got {}",
            signature.len()
        )));
    }
    let v = signature[64];
    let parity = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => {
            return Err(CredentialError::SignatureInvalid(format!(
                "unsupported recovery byte {other}"
            )))
        }
    };
    let mut recovery_id = RecoveryId::from_byte(parity)
        .ok_or_else(|| CredentialError::SignatureInvalid("bad recovery id".into()))?;

    let mut sig = Signature::from_slice(&signature[..64])
        .map_err(|e| CredentialError::SignatureInvalid(e.to_string()))?;
    // Flipping s to the low half mirrors the point, so the parity bit flips too.
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let key = VerifyingKey::recover_from_prehash(hash.as_bytes(), &sig, recovery_id)
        .map_err(|e| CredentialError::SignatureInvalid(e.to_string()))?;
    let point = key.to_encoded_point(false);
    let (x, y) = match (point.x(), point.y()) {
        (Some(x), Some(y)) => (Bytes32::from_slice(x)?, Bytes32::from_slice(y)?),
        _ => {
            return Err(CredentialError::SignatureInvalid(
                "recovered key is the identity".into(),
            ))
        }
    };

    let mut rs = [0u8; 64];
    rs.copy_from_slice(&sig.to_bytes());
    Ok(RecoveredKey { signature: rs, x, y })
}
