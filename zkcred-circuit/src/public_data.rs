// zkcred/zkcred-circuit/src/public_data.rs

use num_bigint::BigUint;
use zkcred_common::{
    Address, Balance, Bytes32, CredentialError, CredentialMetadata, CredentialResult,
    FarcasterFidMetadata, NativeBalanceMetadata, TokenBalanceMetadata,
};

/// Element count of every public-input layout.
pub const PUBLIC_INPUT_COUNT: usize = 37;

const VALUE: usize = 0;
const CHAIN_ID: usize = 1;
const BLOCK_NUMBER: usize = 2;
const CONTRACT: usize = 3;
const SLOT: usize = 4;
const ROOT: usize = 5;

/// The layout shared by every circuit, before it is given type-specific meaning.
struct RawPublicData {
    value: Balance,
    chain_id: u64,
    block_number: u64,
    contract: Address,
    slot: Bytes32,
    root: Bytes32,
}

fn parse_raw(inputs: &[String]) -> CredentialResult<RawPublicData> {
    if inputs.len() != PUBLIC_INPUT_COUNT {
        return Err(malformed(format!(
            "expected {PUBLIC_INPUT_COUNT} public inputs, got {}",
            inputs.len()
        )));
    }
    let mut root = [0u8; 32];
    for (i, element) in inputs[ROOT..].iter().enumerate() {
        let byte = parse_u64("root byte", element)?;
        root[i] = u8::try_from(byte)
            .map_err(|_| malformed(format!("root byte {i} is {element}, not a byte")))?;
    }
    Ok(RawPublicData {
        value: Balance::from(parse_decimal(&inputs[VALUE])?),
        chain_id: parse_u64("chain id", &inputs[CHAIN_ID])?,
        block_number: parse_u64("block number", &inputs[BLOCK_NUMBER])?,
        contract: Address::from_slice(&word(&inputs[CONTRACT], 20)?)
            .map_err(|e| malformed(e.to_string()))?,
        slot: Bytes32::from_slice(&word(&inputs[SLOT], 32)?)
            .map_err(|e| malformed(e.to_string()))?,
        root: Bytes32(root),
    })
}

pub fn parse_erc20_balance(inputs: &[String]) -> CredentialResult<CredentialMetadata> {
    parse_token(inputs).map(CredentialMetadata::Erc20Balance)
}

pub fn parse_erc721_balance(inputs: &[String]) -> CredentialResult<CredentialMetadata> {
    parse_token(inputs).map(CredentialMetadata::Erc721Balance)
}

fn parse_token(inputs: &[String]) -> CredentialResult<TokenBalanceMetadata> {
    let raw = parse_raw(inputs)?;
    Ok(TokenBalanceMetadata {
        chain_id: raw.chain_id,
        token_address: raw.contract,
        balance: raw.value,
        block_number: raw.block_number,
        balance_slot: raw.slot,
        storage_hash: raw.root,
    })
}

pub fn parse_native_balance(inputs: &[String]) -> CredentialResult<CredentialMetadata> {
    let raw = parse_raw(inputs)?;
    if raw.contract != Address::ZERO || raw.slot != Bytes32::ZERO {
        return Err(malformed(
            "native balance outputs carry a contract or slot".into(),
        ));
    }
    Ok(CredentialMetadata::NativeBalance(NativeBalanceMetadata {
        chain_id: raw.chain_id,
        balance: raw.value,
        block_number: raw.block_number,
        state_root: raw.root,
    }))
}

pub fn parse_farcaster_fid(inputs: &[String]) -> CredentialResult<CredentialMetadata> {
    let raw = parse_raw(inputs)?;
    Ok(CredentialMetadata::FarcasterFid(FarcasterFidMetadata {
        fid: fit_u64("fid", raw.value.as_biguint())?,
        chain_id: raw.chain_id,
        block_number: raw.block_number,
        id_registry_address: raw.contract,
        id_slot: raw.slot,
        storage_hash: raw.root,
    }))
}

fn malformed(msg: String) -> CredentialError {
    CredentialError::MalformedProof(msg)
}

pub fn parse_decimal(element: &str) -> CredentialResult<BigUint> {
    if element.is_empty() || !element.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(format!("'{element}' is not a decimal field element")));
    }
    BigUint::parse_bytes(element.as_bytes(), 10)
        .ok_or_else(|| malformed(format!("'{element}' is not a decimal field element")))
}

fn parse_u64(label: &str, element: &str) -> CredentialResult<u64> {
    fit_u64(label, &parse_decimal(element)?)
}

fn fit_u64(label: &str, value: &BigUint) -> CredentialResult<u64> {
    match value.to_u64_digits().as_slice() {
        [] => Ok(0),
        [n] => Ok(*n),
        _ => Err(malformed(format!("{label} {value} does not fit in 64 bits"))),
    }
}

/// Big-endian bytes of `element`, left-padded to `width`.
fn word(element: &str, width: usize) -> CredentialResult<Vec<u8>> {
    let value = parse_decimal(element)?;
    let bytes = if value.bits() == 0 {
        Vec::new()
    } else {
        value.to_bytes_be()
    };
    if bytes.len() > width {
        return Err(malformed(format!(
            "{element} is wider than {width} bytes"
        )));
    }
    let mut out = vec![0u8; width - bytes.len()];
    out.extend_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(value: &str, contract: &str) -> Vec<String> {
        let mut v = vec![
            value.to_string(),
            "8453".into(),
            "22000000".into(),
            contract.to_string(),
            "0".into(),
        ];
        v.extend((0..32).map(|i| i.to_string()));
        v
    }

    #[test]
    fn token_layout_decodes_in_order() {
        let CredentialMetadata::Erc20Balance(meta) =
            parse_erc20_balance(&layout("123456789012345678901234567890", "255")).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(meta.balance.to_string(), "123456789012345678901234567890");
        assert_eq!(meta.chain_id, 8453);
        assert_eq!(meta.block_number, 22_000_000);
        assert_eq!(meta.token_address.0[19], 0xff);
        assert_eq!(meta.storage_hash.0[31], 31);
    }

    #[test]
    fn wrong_counts_and_encodings_are_malformed() {
        let mut short = layout("1", "0");
        short.pop();
        assert!(matches!(
            parse_erc20_balance(&short),
            Err(CredentialError::MalformedProof(_))
        ));

        let mut hexed = layout("1", "0");
        hexed[0] = "0x01".into();
        assert!(parse_erc20_balance(&hexed).is_err());

        let mut wide_byte = layout("1", "0");
        wide_byte[10] = "256".into();
        assert!(parse_erc20_balance(&wide_byte).is_err());

        let mut huge_chain = layout("1", "0");
        huge_chain[1] = "18446744073709551616".into();
        assert!(parse_erc20_balance(&huge_chain).is_err());

        let wide_address = layout("1", "1461501637330902918203684832716283019655932542976");
        assert!(parse_erc20_balance(&wide_address).is_err());
    }

    #[test]
    fn native_layout_requires_empty_contract_columns() {
        assert!(parse_native_balance(&layout("5", "0")).is_ok());
        assert!(parse_native_balance(&layout("5", "7")).is_err());
    }

    #[test]
    fn fid_must_fit_u64() {
        let CredentialMetadata::FarcasterFid(meta) = parse_farcaster_fid(&layout("1234", "9")).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(meta.fid, 1234);
        assert!(parse_farcaster_fid(&layout("18446744073709551616", "9")).is_err());
    }
}
