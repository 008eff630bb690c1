// zkcred/zkcred-common/src/types.rs

use std::{fmt, str::FromStr};

use num_bigint::BigUint;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CredentialError;

/// Closed set of credential kinds. Each tag fixes the witness shape, the
/// public-input layout and the requirement shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CredentialType {
    #[serde(rename = "ERC20_BALANCE")]
    Erc20Balance,
    #[serde(rename = "ERC721_BALANCE")]
    Erc721Balance,
    #[serde(rename = "NATIVE_BALANCE")]
    NativeBalance,
    #[serde(rename = "FARCASTER_FID")]
    FarcasterFid,
}

impl CredentialType {
    pub const ALL: [CredentialType; 4] = [
        CredentialType::Erc20Balance,
        CredentialType::Erc721Balance,
        CredentialType::NativeBalance,
        CredentialType::FarcasterFid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::Erc20Balance => "ERC20_BALANCE",
            CredentialType::Erc721Balance => "ERC721_BALANCE",
            CredentialType::NativeBalance => "NATIVE_BALANCE",
            CredentialType::FarcasterFid => "FARCASTER_FID",
        }
    }

    /// Directory name used for this type's circuit artifacts.
    pub fn slug(&self) -> &'static str {
        match self {
            CredentialType::Erc20Balance => "erc20-balance",
            CredentialType::Erc721Balance => "erc721-balance",
            CredentialType::NativeBalance => "native-balance",
            CredentialType::FarcasterFid => "farcaster-fid",
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialType {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CredentialType::ALL
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(s) || ty.slug() == s)
            .ok_or_else(|| CredentialError::InvalidInput(format!("unknown credential type '{s}'")))
    }
}

/// Names one compiled circuit: a credential type at a specific version.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircuitId {
    pub credential_type: CredentialType,
    pub version: String,
}

impl CircuitId {
    pub fn new(credential_type: CredentialType, version: impl Into<String>) -> Self {
        Self {
            credential_type,
            version: version.into(),
        }
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.credential_type, self.version)
    }
}

/// Strip an optional `0x` prefix and decode, left-padding odd-length input with a zero nibble.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, CredentialError> {
    let stripped = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    let decoded = if stripped.len() % 2 == 1 {
        hex::decode(format!("0{stripped}"))
    } else {
        hex::decode(stripped)
    };
    decoded.map_err(|e| CredentialError::InvalidInput(format!("invalid hex '{input}': {e}")))
}

pub fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

macro_rules! fixed_hex_type {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, CredentialError> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| {
                    CredentialError::InvalidInput(format!(
                        "{} expects {} bytes, got {}",
                        stringify!($name),
                        $len,
                        bytes.len()
                    ))
                })?;
                Ok(Self(arr))
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl FromStr for $name {
            type Err = CredentialError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_slice(&decode_hex(s)?)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&encode_hex(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

fixed_hex_type!(
    /// 20-byte Ethereum account or contract address.
    Address,
    20
);

fixed_hex_type!(
    /// 32-byte word: trie roots, storage slots and keys, hashes.
    Bytes32,
    32
);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    /// Left-pad into a 32-byte word, the way addresses are laid out in storage keys.
    pub fn to_word(&self) -> Bytes32 {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        Bytes32(word)
    }
}

impl Bytes32 {
    pub const ZERO: Bytes32 = Bytes32([0u8; 32]);

    pub fn from_u64(value: u64) -> Self {
        let mut word = [0u8; 32];
        word[24..].copy_from_slice(&value.to_be_bytes());
        Bytes32(word)
    }
}

/// Arbitrary-precision token amount. Serialized as a decimal string so values
/// above 2^53 survive JSON consumers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Balance(pub BigUint);

impl Balance {
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Big-endian bytes without leading zeros; empty for zero.
    pub fn to_be_bytes(&self) -> Vec<u8> {
        if self.0 == BigUint::default() {
            Vec::new()
        } else {
            self.0.to_bytes_be()
        }
    }
}

impl From<u64> for Balance {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<BigUint> for Balance {
    fn from(value: BigUint) -> Self {
        Self(value)
    }
}

impl FromStr for Balance {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CredentialError::InvalidInput(format!(
                "'{s}' is not a decimal integer"
            )));
        }
        BigUint::parse_bytes(s.as_bytes(), 10)
            .map(Balance)
            .ok_or_else(|| CredentialError::InvalidInput(format!("'{s}' is not a decimal integer")))
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Balance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_str_radix(10))
    }
}

impl<'de> Deserialize<'de> for Balance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Serde helper for byte vectors carried as `0x` hex strings.
pub mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::decode_hex(&s).map_err(de::Error::custom)
    }
}
