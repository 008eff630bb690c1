use std::{sync::Arc, time::Duration};

use chrono::Utc;
use zkcred_chain::{RetryPolicy, RetryingFetcher};
use zkcred_circuit::witness::{FARCASTER_CHAIN_ID, ID_REGISTRY_ADDRESS, ID_REGISTRY_ID_OF_SLOT};
use zkcred_common::{
    Address, Balance, BlockHeader, Bytes32, CredentialError, CredentialMetadata,
    CredentialRequirement, CredentialType, TokenRequirement,
};
use zkcred_credentials::{
    create_credential, issue_credential, prepare, prove_credential, reverify_credential, select,
    verify_bundle, CredentialStore, InMemoryCredentialStore, NewCredential, PreparedProof,
    ProofRequest, VerificationContext,
};
use zkcred_prover::ProofStage;
use zkcred_test_fixtures::{
    native_balance_proof, token_balance_proof, ArtifactDir, DigestBackend, FixtureChain, Holder,
};

const TOKEN: Address = Address([0x0d; 20]);
const CHAIN_ID: u64 = 8453;
const BLOCK: u64 = 22_000_000;
const STATE_ROOT: Bytes32 = Bytes32([0x5a; 32]);
const TOKEN_BALANCE: u64 = 50_000;
const NATIVE_BALANCE: u64 = 3_000_000_000;
const FID: u64 = 1_234;

struct TestEnv {
    artifacts: ArtifactDir,
    holder: Holder,
    backend: Arc<DigestBackend>,
    chain: Arc<FixtureChain>,
    ctx: VerificationContext,
    store: InMemoryCredentialStore,
}

fn header() -> BlockHeader {
    BlockHeader {
        number: BLOCK,
        state_root: STATE_ROOT,
    }
}

fn test_env() -> TestEnv {
    let holder = Holder::from_seed(42);
    let wallet = holder.address();
    let chain = Arc::new(
        FixtureChain::new()
            .with_block(CHAIN_ID, header())
            .with_block(FARCASTER_CHAIN_ID, header())
            .with_account(
                CHAIN_ID,
                token_balance_proof(TOKEN, Bytes32::ZERO, wallet, TOKEN_BALANCE.into(), BLOCK),
            )
            .with_account(CHAIN_ID, native_balance_proof(wallet, NATIVE_BALANCE.into(), BLOCK))
            .with_account(
                FARCASTER_CHAIN_ID,
                token_balance_proof(
                    ID_REGISTRY_ADDRESS,
                    Bytes32::from_u64(ID_REGISTRY_ID_OF_SLOT),
                    wallet,
                    FID.into(),
                    BLOCK,
                ),
            ),
    );
    let backend = Arc::new(DigestBackend::new());
    let artifacts = ArtifactDir::new().unwrap();
    let ctx = VerificationContext::new(artifacts.cache(), backend.clone()).with_fetcher(chain.clone());
    TestEnv {
        artifacts,
        holder,
        backend,
        chain,
        ctx,
        store: InMemoryCredentialStore::new(),
    }
}

fn token_request(env: &TestEnv) -> ProofRequest {
    ProofRequest::token(
        CredentialType::Erc20Balance,
        env.holder.address(),
        CHAIN_ID,
        TOKEN,
        Bytes32::ZERO,
    )
}

fn sign(env: &TestEnv, prepared: &PreparedProof) -> Vec<u8> {
    env.holder.sign(&prepared.message).unwrap()
}

#[tokio::test]
async fn erc20_credential_end_to_end() {
    let env = test_env();
    let prepared = prepare(&env.ctx, token_request(&env)).await.unwrap();
    assert!(prepared.message.contains(r#""credentialType":"ERC20_BALANCE""#));

    let mut stages = Vec::new();
    let credential = issue_credential(
        &env.ctx,
        &env.store,
        &prepared,
        &sign(&env, &prepared),
        Some("vault-1".into()),
        &mut |stage| stages.push(stage),
    )
    .await
    .unwrap();

    assert_eq!(
        stages,
        [
            ProofStage::LoadingArtifacts,
            ProofStage::SolvingWitness,
            ProofStage::Proving,
            ProofStage::Done
        ]
    );
    let CredentialMetadata::Erc20Balance(meta) = &credential.metadata else {
        panic!("unexpected metadata {:?}", credential.metadata);
    };
    assert_eq!(meta.balance, Balance::from(TOKEN_BALANCE));
    assert_eq!(meta.chain_id, CHAIN_ID);
    assert_eq!(meta.token_address, TOKEN);
    assert_eq!(meta.block_number, BLOCK);
    assert_eq!(meta.storage_hash, prepared.proof.storage_hash);
    assert_eq!(credential.vault_id.as_deref(), Some("vault-1"));
    assert_eq!(env.store.get(&credential.id).unwrap(), Some(credential.clone()));
    assert_eq!(env.backend.prove_calls(), 1);
    assert!(env.ctx.cache().is_loaded(&prepared.circuit));
}

#[tokio::test]
async fn native_and_fid_credentials_decode_their_metadata() {
    let env = test_env();

    let prepared = prepare(&env.ctx, ProofRequest::native(env.holder.address(), CHAIN_ID))
        .await
        .unwrap();
    let native = issue_credential(&env.ctx, &env.store, &prepared, &sign(&env, &prepared), None, &mut |_| {})
        .await
        .unwrap();
    let CredentialMetadata::NativeBalance(meta) = &native.metadata else {
        panic!("unexpected metadata {:?}", native.metadata);
    };
    assert_eq!(meta.balance, Balance::from(NATIVE_BALANCE));
    assert_eq!(meta.state_root, STATE_ROOT);

    let prepared = prepare(&env.ctx, ProofRequest::farcaster(env.holder.address()))
        .await
        .unwrap();
    let fid = issue_credential(&env.ctx, &env.store, &prepared, &sign(&env, &prepared), None, &mut |_| {})
        .await
        .unwrap();
    let CredentialMetadata::FarcasterFid(meta) = &fid.metadata else {
        panic!("unexpected metadata {:?}", fid.metadata);
    };
    assert_eq!(meta.fid, FID);
    assert_eq!(meta.chain_id, FARCASTER_CHAIN_ID);
    assert_eq!(meta.id_registry_address, ID_REGISTRY_ADDRESS);
}

#[tokio::test]
async fn holders_may_disclose_less_but_never_more() {
    let env = test_env();

    let prepared = prepare(&env.ctx, token_request(&env).claiming(10_000u64.into()))
        .await
        .unwrap();
    let credential = issue_credential(&env.ctx, &env.store, &prepared, &sign(&env, &prepared), None, &mut |_| {})
        .await
        .unwrap();
    assert_eq!(credential.metadata.disclosed_amount(), Balance::from(10_000u64));

    let prepared = prepare(&env.ctx, token_request(&env).claiming(50_001u64.into()))
        .await
        .unwrap();
    let err = prove_credential(&env.ctx, &prepared, &sign(&env, &prepared), &mut |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::InvalidInput(_)), "{err}");
    assert_eq!(env.backend.prove_calls(), 1);

    let err = prepare(&env.ctx, ProofRequest::farcaster(env.holder.address()).claiming(1u64.into()))
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::InvalidInput(_)));
}

#[tokio::test]
async fn foreign_signatures_fail_before_proving() {
    let env = test_env();
    let prepared = prepare(&env.ctx, token_request(&env)).await.unwrap();
    let stranger = Holder::from_seed(99).sign(&prepared.message).unwrap();

    let err = prove_credential(&env.ctx, &prepared, &stranger, &mut |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::SignatureInvalid(_)), "{err}");

    let mut truncated = sign(&env, &prepared);
    truncated.pop();
    let err = prove_credential(&env.ctx, &prepared, &truncated, &mut |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::SignatureInvalid(_)));
    assert_eq!(env.backend.solve_calls(), 0);
}

#[tokio::test]
async fn tampered_public_inputs_verify_false() {
    let env = test_env();
    let prepared = prepare(&env.ctx, token_request(&env)).await.unwrap();
    let generated = prove_credential(&env.ctx, &prepared, &sign(&env, &prepared), &mut |_| {})
        .await
        .unwrap();
    assert!(verify_bundle(&env.ctx, &generated.bundle).await.unwrap());

    for index in [0, 1, 2, 3, 4, 5, 36] {
        let mut tampered = generated.bundle.clone();
        tampered.public_inputs[index].push('1');
        assert!(
            !verify_bundle(&env.ctx, &tampered).await.unwrap(),
            "input {index} was not bound"
        );
    }

    let mut tampered = generated.bundle.clone();
    tampered.public_inputs[0] = "1".into();
    let err = create_credential(&env.ctx, &env.store, tampered.into())
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::ProofRejected(_)), "{err}");
    assert!(env.store.list().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_bundles_are_errors_not_rejections() {
    let env = test_env();
    let prepared = prepare(&env.ctx, token_request(&env)).await.unwrap();
    let generated = prove_credential(&env.ctx, &prepared, &sign(&env, &prepared), &mut |_| {})
        .await
        .unwrap();

    let mut short = generated.bundle.clone();
    short.public_inputs.pop();
    assert!(matches!(
        verify_bundle(&env.ctx, &short).await,
        Err(CredentialError::MalformedProof(_))
    ));

    let mut unknown = generated.bundle.clone();
    unknown.version = "9.9.9".into();
    assert!(matches!(
        verify_bundle(&env.ctx, &unknown).await,
        Err(CredentialError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn backend_outputs_must_match_the_witness() {
    let env = test_env();
    env.backend.skew_outputs(true);
    let prepared = prepare(&env.ctx, token_request(&env)).await.unwrap();
    let err = prove_credential(&env.ctx, &prepared, &sign(&env, &prepared), &mut |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::Backend(_)), "{err}");
}

#[tokio::test]
async fn reverification_links_parent_and_child() {
    let env = test_env();
    let prepared = prepare(&env.ctx, token_request(&env)).await.unwrap();
    let signature = sign(&env, &prepared);
    let parent = issue_credential(&env.ctx, &env.store, &prepared, &signature, Some("vault-7".into()), &mut |_| {})
        .await
        .unwrap();

    let fresh = prove_credential(&env.ctx, &prepared, &signature, &mut |_| {})
        .await
        .unwrap();
    let child = reverify_credential(&env.ctx, &env.store, &parent.id, fresh.bundle.clone())
        .await
        .unwrap();
    assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
    assert_eq!(child.vault_id.as_deref(), Some("vault-7"));
    let parent = env.store.get(&parent.id).unwrap().unwrap();
    assert_eq!(parent.reverified_id.as_deref(), Some(child.id.as_str()));

    // A parent is reverified once.
    let err = reverify_credential(&env.ctx, &env.store, &parent.id, fresh.bundle.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::InvalidInput(_)), "{err}");
    assert_eq!(env.store.list().unwrap().len(), 2);

    let fid = prepare(&env.ctx, ProofRequest::farcaster(env.holder.address()))
        .await
        .unwrap();
    let fid_proof = prove_credential(&env.ctx, &fid, &sign(&env, &fid), &mut |_| {})
        .await
        .unwrap();
    let err = create_credential(
        &env.ctx,
        &env.store,
        NewCredential {
            bundle: fid_proof.bundle,
            parent_id: Some(child.id.clone()),
            vault_id: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CredentialError::InvalidInput(_)), "{err}");
}

#[tokio::test]
async fn concurrent_reverifications_store_one_child() {
    let env = test_env();
    let prepared = prepare(&env.ctx, token_request(&env)).await.unwrap();
    let signature = sign(&env, &prepared);
    let parent = issue_credential(&env.ctx, &env.store, &prepared, &signature, None, &mut |_| {})
        .await
        .unwrap();
    let fresh = prove_credential(&env.ctx, &prepared, &signature, &mut |_| {})
        .await
        .unwrap();

    // Cold cache so both calls suspend on artifact loading after the parent check.
    let ctx = VerificationContext::new(env.artifacts.cache(), env.backend.clone())
        .with_fetcher(env.chain.clone());
    let (a, b) = tokio::join!(
        reverify_credential(&ctx, &env.store, &parent.id, fresh.bundle.clone()),
        reverify_credential(&ctx, &env.store, &parent.id, fresh.bundle.clone()),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let winner = a.or(b).unwrap();

    let stored = env.store.list().unwrap();
    assert_eq!(stored.len(), 2);
    let children: Vec<_> = stored.iter().filter(|c| c.parent_id.is_some()).collect();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, winner.id);
    let parent = env.store.get(&parent.id).unwrap().unwrap();
    assert_eq!(parent.reverified_id.as_deref(), Some(winner.id.as_str()));
}

#[tokio::test]
async fn transient_fetch_failures_are_retried() {
    let env = test_env();
    let retrying = Arc::new(RetryingFetcher::new(
        env.chain.clone(),
        RetryPolicy::new(3, Duration::from_millis(1)),
    ));
    let ctx = VerificationContext::new(env.artifacts.cache(), env.backend.clone()).with_fetcher(retrying);

    env.chain.fail_next(2);
    let prepared = prepare(&ctx, token_request(&env)).await.unwrap();
    assert_eq!(prepared.block.number, BLOCK);

    env.chain.fail_next(3);
    let err = prepare(&ctx, token_request(&env)).await.unwrap_err();
    assert!(err.is_retryable(), "{err}");
}

#[tokio::test]
async fn issued_credentials_feed_the_matcher() {
    let env = test_env();
    for claimed in [50_000u64, 10_000] {
        let prepared = prepare(&env.ctx, token_request(&env).claiming(claimed.into()))
            .await
            .unwrap();
        issue_credential(&env.ctx, &env.store, &prepared, &sign(&env, &prepared), None, &mut |_| {})
            .await
            .unwrap();
    }

    let credentials = env.store.list().unwrap();
    let requirement = CredentialRequirement::Erc20Balance(TokenRequirement {
        chain_id: CHAIN_ID,
        token_address: TOKEN,
        minimum_balance: 5_000u64.into(),
    });
    let chosen = select(&credentials, &requirement, Utc::now()).unwrap();
    assert_eq!(chosen.metadata.disclosed_amount(), Balance::from(10_000u64));

    let later = Utc::now() + chrono::Duration::days(8);
    assert!(select(&credentials, &requirement, later).is_none());
}
