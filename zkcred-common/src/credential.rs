// zkcred/zkcred-common/src/credential.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{hex_bytes, Address, Balance, Bytes32, CircuitId, CredentialType};

/// Credentials stop satisfying requirements this many days after verification.
pub const CREDENTIAL_TTL_DAYS: i64 = 7;

pub fn credential_ttl() -> Duration {
    Duration::days(CREDENTIAL_TTL_DAYS)
}

/// Public facts proven by an ERC20 or ERC721 balance credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalanceMetadata {
    pub chain_id: u64,
    pub token_address: Address,
    pub balance: Balance,
    pub block_number: u64,
    pub balance_slot: Bytes32,
    pub storage_hash: Bytes32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeBalanceMetadata {
    pub chain_id: u64,
    pub balance: Balance,
    pub block_number: u64,
    pub state_root: Bytes32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarcasterFidMetadata {
    pub fid: u64,
    pub chain_id: u64,
    pub block_number: u64,
    pub id_registry_address: Address,
    pub id_slot: Bytes32,
    pub storage_hash: Bytes32,
}

/// Typed public data of a credential; the variant is the credential type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "metadata")]
pub enum CredentialMetadata {
    #[serde(rename = "ERC20_BALANCE")]
    Erc20Balance(TokenBalanceMetadata),
    #[serde(rename = "ERC721_BALANCE")]
    Erc721Balance(TokenBalanceMetadata),
    #[serde(rename = "NATIVE_BALANCE")]
    NativeBalance(NativeBalanceMetadata),
    #[serde(rename = "FARCASTER_FID")]
    FarcasterFid(FarcasterFidMetadata),
}

impl CredentialMetadata {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            CredentialMetadata::Erc20Balance(_) => CredentialType::Erc20Balance,
            CredentialMetadata::Erc721Balance(_) => CredentialType::Erc721Balance,
            CredentialMetadata::NativeBalance(_) => CredentialType::NativeBalance,
            CredentialMetadata::FarcasterFid(_) => CredentialType::FarcasterFid,
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            CredentialMetadata::Erc20Balance(m) | CredentialMetadata::Erc721Balance(m) => m.chain_id,
            CredentialMetadata::NativeBalance(m) => m.chain_id,
            CredentialMetadata::FarcasterFid(m) => m.chain_id,
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            CredentialMetadata::Erc20Balance(m) | CredentialMetadata::Erc721Balance(m) => {
                m.block_number
            }
            CredentialMetadata::NativeBalance(m) => m.block_number,
            CredentialMetadata::FarcasterFid(m) => m.block_number,
        }
    }

    /// The quantity an action indirectly discloses: the balance, or the fid.
    pub fn disclosed_amount(&self) -> Balance {
        match self {
            CredentialMetadata::Erc20Balance(m) | CredentialMetadata::Erc721Balance(m) => {
                m.balance.clone()
            }
            CredentialMetadata::NativeBalance(m) => m.balance.clone(),
            CredentialMetadata::FarcasterFid(m) => Balance::from(m.fid),
        }
    }
}

/// Proof bytes and public inputs exactly as the verifier accepted them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    pub credential_type: CredentialType,
    pub version: String,
    #[serde(with = "hex_bytes")]
    pub proof: Vec<u8>,
    /// Decimal-string field elements in circuit output order.
    pub public_inputs: Vec<String>,
}

impl ProofBundle {
    pub fn new(circuit: &CircuitId, proof: Vec<u8>, public_inputs: Vec<String>) -> Self {
        Self {
            credential_type: circuit.credential_type,
            version: circuit.version.clone(),
            proof,
            public_inputs,
        }
    }

    pub fn circuit_id(&self) -> CircuitId {
        CircuitId::new(self.credential_type, self.version.clone())
    }
}

/// One accepted proof's public record. Never mutated after creation apart from
/// the store linking a newer reverification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub version: String,
    pub metadata: CredentialMetadata,
    #[serde(with = "hex_bytes")]
    pub proof: Vec<u8>,
    pub public_inputs: Vec<String>,
    pub verified_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverified_id: Option<String>,
}

impl Credential {
    pub fn credential_type(&self) -> CredentialType {
        self.metadata.credential_type()
    }

    pub fn circuit_id(&self) -> CircuitId {
        CircuitId::new(self.credential_type(), self.version.clone())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.verified_at + credential_ttl()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.verified_at > credential_ttl()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequirement {
    pub chain_id: u64,
    pub token_address: Address,
    pub minimum_balance: Balance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeRequirement {
    /// `0` accepts a credential from any chain.
    pub chain_id: u64,
    pub minimum_balance: Balance,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FidRequirement {
    pub fid: u64,
}

/// Threshold an action demands before it is permitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CredentialRequirement {
    #[serde(rename = "ERC20_BALANCE")]
    Erc20Balance(TokenRequirement),
    #[serde(rename = "ERC721_BALANCE")]
    Erc721Balance(TokenRequirement),
    #[serde(rename = "NATIVE_BALANCE")]
    NativeBalance(NativeRequirement),
    #[serde(rename = "FARCASTER_FID")]
    FarcasterFid(FidRequirement),
}

impl CredentialRequirement {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            CredentialRequirement::Erc20Balance(_) => CredentialType::Erc20Balance,
            CredentialRequirement::Erc721Balance(_) => CredentialType::Erc721Balance,
            CredentialRequirement::NativeBalance(_) => CredentialType::NativeBalance,
            CredentialRequirement::FarcasterFid(_) => CredentialType::FarcasterFid,
        }
    }
}
