//! Picking the credential that satisfies a requirement while disclosing the least.

use chrono::{DateTime, Utc};
use zkcred_common::{Credential, CredentialMetadata, CredentialRequirement};

/// Every unexpired credential satisfying `requirement`, smallest disclosed
/// amount first. Ties keep their input order.
pub fn select_all<'a>(
    credentials: &'a [Credential],
    requirement: &CredentialRequirement,
    now: DateTime<Utc>,
) -> Vec<&'a Credential> {
    let mut survivors: Vec<&Credential> = credentials
        .iter()
        .filter(|c| c.credential_type() == requirement.credential_type())
        .filter(|c| !c.is_expired(now))
        .filter(|c| satisfies(&c.metadata, requirement))
        .collect();
    survivors.sort_by_key(|c| c.metadata.disclosed_amount());
    survivors
}

/// The least revealing usable credential, or `None` if nothing qualifies.
pub fn select<'a>(
    credentials: &'a [Credential],
    requirement: &CredentialRequirement,
    now: DateTime<Utc>,
) -> Option<&'a Credential> {
    select_all(credentials, requirement, now).into_iter().next()
}

fn satisfies(metadata: &CredentialMetadata, requirement: &CredentialRequirement) -> bool {
    use CredentialMetadata as M;
    use CredentialRequirement as R;

    match (metadata, requirement) {
        (M::Erc20Balance(m), R::Erc20Balance(r)) | (M::Erc721Balance(m), R::Erc721Balance(r)) => {
            m.chain_id == r.chain_id
                && m.token_address == r.token_address
                && m.balance >= r.minimum_balance
        }
        (M::NativeBalance(m), R::NativeBalance(r)) => {
            (r.chain_id == 0 || m.chain_id == r.chain_id) && m.balance >= r.minimum_balance
        }
        (M::FarcasterFid(m), R::FarcasterFid(r)) => m.fid >= r.fid,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use zkcred_common::{
        Address, Bytes32, FarcasterFidMetadata, FidRequirement, NativeBalanceMetadata,
        NativeRequirement, TokenBalanceMetadata, TokenRequirement,
    };

    use super::*;

    const TOKEN: Address = Address([0x0d; 20]);

    fn credential(id: &str, metadata: CredentialMetadata, age: Duration, now: DateTime<Utc>) -> Credential {
        Credential {
            id: id.into(),
            version: "0.1.0".into(),
            metadata,
            proof: vec![1],
            public_inputs: Vec::new(),
            verified_at: now - age,
            vault_id: None,
            parent_id: None,
            reverified_id: None,
        }
    }

    fn erc20(id: &str, balance: u64, age: Duration, now: DateTime<Utc>) -> Credential {
        credential(
            id,
            CredentialMetadata::Erc20Balance(TokenBalanceMetadata {
                chain_id: 8453,
                token_address: TOKEN,
                balance: balance.into(),
                block_number: 100,
                balance_slot: Bytes32::ZERO,
                storage_hash: Bytes32::ZERO,
            }),
            age,
            now,
        )
    }

    fn native(id: &str, chain_id: u64, balance: u64, now: DateTime<Utc>) -> Credential {
        credential(
            id,
            CredentialMetadata::NativeBalance(NativeBalanceMetadata {
                chain_id,
                balance: balance.into(),
                block_number: 100,
                state_root: Bytes32::ZERO,
            }),
            Duration::hours(1),
            now,
        )
    }

    fn fid(id: &str, fid: u64, now: DateTime<Utc>) -> Credential {
        credential(
            id,
            CredentialMetadata::FarcasterFid(FarcasterFidMetadata {
                fid,
                chain_id: 10,
                block_number: 100,
                id_registry_address: Address::ZERO,
                id_slot: Bytes32::ZERO,
                storage_hash: Bytes32::ZERO,
            }),
            Duration::hours(1),
            now,
        )
    }

    fn token_requirement(minimum: u64) -> CredentialRequirement {
        CredentialRequirement::Erc20Balance(TokenRequirement {
            chain_id: 8453,
            token_address: TOKEN,
            minimum_balance: minimum.into(),
        })
    }

    #[test]
    fn smallest_sufficient_balance_wins() {
        let now = Utc::now();
        let creds = vec![
            erc20("big", 50_000, Duration::days(1), now),
            erc20("small", 10_000, Duration::days(1), now),
        ];
        let chosen = select(&creds, &token_requirement(5_000), now).unwrap();
        assert_eq!(chosen.id, "small");
        let ids: Vec<_> = select_all(&creds, &token_requirement(5_000), now)
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, ["small", "big"]);
    }

    #[test]
    fn expired_credentials_are_skipped() {
        let now = Utc::now();
        let creds = vec![erc20("old", 10_000, Duration::days(8), now)];
        assert!(select(&creds, &token_requirement(5_000), now).is_none());

        let creds = vec![erc20("recent", 10_000, Duration::days(6), now)];
        assert_eq!(select(&creds, &token_requirement(5_000), now).unwrap().id, "recent");
    }

    #[test]
    fn nothing_qualifies() {
        let now = Utc::now();
        assert!(select(&[], &token_requirement(1), now).is_none());
        let creds = vec![
            erc20("a", 100, Duration::days(1), now),
            erc20("b", 4_999, Duration::days(1), now),
        ];
        assert!(select(&creds, &token_requirement(5_000), now).is_none());
    }

    #[test]
    fn type_chain_and_token_must_match() {
        let now = Utc::now();
        let mut other_token = erc20("other", 10_000, Duration::days(1), now);
        if let CredentialMetadata::Erc20Balance(m) = &mut other_token.metadata {
            m.token_address = Address([0x0e; 20]);
        }
        let creds = vec![other_token, native("eth", 8453, 10_000, now)];
        assert!(select(&creds, &token_requirement(1), now).is_none());
    }

    #[test]
    fn native_chain_zero_is_a_wildcard() {
        let now = Utc::now();
        let creds = vec![native("base", 8453, 30, now), native("mainnet", 1, 20, now)];
        let any = CredentialRequirement::NativeBalance(NativeRequirement {
            chain_id: 0,
            minimum_balance: 10u64.into(),
        });
        assert_eq!(select(&creds, &any, now).unwrap().id, "mainnet");

        let base_only = CredentialRequirement::NativeBalance(NativeRequirement {
            chain_id: 8453,
            minimum_balance: 10u64.into(),
        });
        assert_eq!(select(&creds, &base_only, now).unwrap().id, "base");
    }

    #[test]
    fn fid_threshold_prefers_lowest_qualifying_fid() {
        let now = Utc::now();
        let creds = vec![fid("late", 900_000, now), fid("early", 3, now), fid("mid", 5_000, now)];
        let requirement = CredentialRequirement::FarcasterFid(FidRequirement { fid: 1_000 });
        assert_eq!(select(&creds, &requirement, now).unwrap().id, "mid");
    }
}
