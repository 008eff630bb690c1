//! prepare → bind → witness → prove → verify → credential.
//!
//! Cheap checks run before expensive ones: signer and claimed-amount problems
//! surface before any proving, and only a verified proof becomes a credential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use zkcred_circuit::{
    bind_message, circuit_for, lookup, mapping_storage_key, witness::default_registry_target,
    witness::FARCASTER_CHAIN_ID, CredentialMessage, ProofTarget, WitnessInputs,
};
use zkcred_common::{
    AccountProof, Address, Balance, BlockHeader, Bytes32, CircuitId, Credential,
    CredentialError, CredentialResult, CredentialType, ProofBundle,
};
use zkcred_prover::{generate_proof, GeneratedProof, ProofStage};
use zkcred_verifier::verify_proof;

use crate::{context::VerificationContext, store::CredentialStore};

/// What a holder wants to prove.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRequest {
    pub credential_type: CredentialType,
    pub wallet: Address,
    pub chain_id: u64,
    pub target: ProofTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed: Option<Balance>,
}

impl ProofRequest {
    /// ERC20 or ERC721 balance held in `token`'s `balances` mapping at `slot`.
    pub fn token(
        credential_type: CredentialType,
        wallet: Address,
        chain_id: u64,
        token: Address,
        slot: Bytes32,
    ) -> Self {
        Self {
            credential_type,
            wallet,
            chain_id,
            target: ProofTarget::Storage {
                contract: token,
                slot,
            },
            claimed: None,
        }
    }

    pub fn native(wallet: Address, chain_id: u64) -> Self {
        Self {
            credential_type: CredentialType::NativeBalance,
            wallet,
            chain_id,
            target: ProofTarget::Account,
            claimed: None,
        }
    }

    /// The wallet's fid in the OP Mainnet ID registry.
    pub fn farcaster(wallet: Address) -> Self {
        Self {
            credential_type: CredentialType::FarcasterFid,
            wallet,
            chain_id: FARCASTER_CHAIN_ID,
            target: default_registry_target(),
            claimed: None,
        }
    }

    /// Disclose `amount` instead of the full balance.
    pub fn claiming(mut self, amount: Balance) -> Self {
        self.claimed = Some(amount);
        self
    }
}

/// Chain state fetched for a request and the message the wallet must sign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedProof {
    pub request: ProofRequest,
    pub circuit: CircuitId,
    pub block: BlockHeader,
    pub proof: AccountProof,
    /// Canonical JSON of the [`CredentialMessage`].
    pub message: String,
}

impl PreparedProof {
    /// Recover the signer of `message` and assemble witness inputs.
    pub fn bind(&self, signature: &[u8]) -> CredentialResult<WitnessInputs> {
        let bound = bind_message(&self.message, signature)?;
        if bound.signer != self.request.wallet {
            return Err(CredentialError::SignatureInvalid(format!(
                "message signed by {} but proof is for {}",
                bound.signer, self.request.wallet
            )));
        }
        Ok(WitnessInputs {
            circuit: self.circuit.clone(),
            bound,
            wallet: self.request.wallet,
            chain_id: self.request.chain_id,
            block: self.block.clone(),
            target: self.request.target.clone(),
            proof: self.proof.clone(),
            claimed: self.request.claimed.clone(),
        })
    }
}

/// Fetch the latest block and the proof the request needs, and build the
/// message to sign.
pub async fn prepare(ctx: &VerificationContext, request: ProofRequest) -> CredentialResult<PreparedProof> {
    let circuit = circuit_for(request.credential_type).id();
    if request.credential_type == CredentialType::FarcasterFid && request.claimed.is_some() {
        return Err(CredentialError::InvalidInput(
            "a fid is disclosed as proven".into(),
        ));
    }
    let (address, keys, contract) = match &request.target {
        ProofTarget::Storage { contract, slot } => (
            *contract,
            vec![mapping_storage_key(&request.wallet, slot)],
            *contract,
        ),
        ProofTarget::Account => (request.wallet, Vec::new(), Address::ZERO),
    };

    let fetcher = ctx.fetcher()?;
    let block = fetcher.get_block(request.chain_id).await?;
    let proof = fetcher
        .get_proof(request.chain_id, address, &keys, block.number)
        .await?;
    let root = match request.target {
        ProofTarget::Storage { .. } => proof.storage_hash,
        ProofTarget::Account => block.state_root,
    };
    let message =
        CredentialMessage::new(&circuit, request.chain_id, block.number, contract, root).canonical()?;
    debug!(
        %circuit,
        chain_id = request.chain_id,
        block_number = block.number,
        "prepared credential proof"
    );

    Ok(PreparedProof {
        request,
        circuit,
        block,
        proof,
        message,
    })
}

/// Bind the signature, build the witness and prove it.
pub async fn prove_credential(
    ctx: &VerificationContext,
    prepared: &PreparedProof,
    signature: &[u8],
    on_stage: &mut (dyn FnMut(ProofStage) + Send),
) -> CredentialResult<GeneratedProof> {
    let inputs = prepared.bind(signature)?;
    let witness = lookup(&prepared.circuit)?.build_witness(&inputs)?;
    generate_proof(ctx.cache(), ctx.backend(), &witness, on_stage).await
}

/// `Ok(false)` for a well-formed proof that does not verify.
pub async fn verify_bundle(ctx: &VerificationContext, bundle: &ProofBundle) -> CredentialResult<bool> {
    let circuit = lookup(&bundle.circuit_id())?.id();
    let vk = ctx.cache().verification_key(&circuit).await?;
    Ok(verify_proof(ctx.backend(), &vk, bundle).await?)
}

/// A proof submitted for conversion into a credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCredential {
    #[serde(flatten)]
    pub bundle: ProofBundle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_id: Option<String>,
}

impl From<ProofBundle> for NewCredential {
    fn from(bundle: ProofBundle) -> Self {
        Self {
            bundle,
            parent_id: None,
            vault_id: None,
        }
    }
}

/// Verify `request`'s proof, decode its public data and store the credential.
///
/// With a `parent_id` the parent must exist, share the credential type and not
/// have been reverified yet; it is linked to the new credential.
pub async fn create_credential(
    ctx: &VerificationContext,
    store: &dyn CredentialStore,
    request: NewCredential,
) -> CredentialResult<Credential> {
    create_credential_at(ctx, store, request, Utc::now()).await
}

async fn create_credential_at(
    ctx: &VerificationContext,
    store: &dyn CredentialStore,
    request: NewCredential,
    now: DateTime<Utc>,
) -> CredentialResult<Credential> {
    let circuit = lookup(&request.bundle.circuit_id())?;
    if let Some(parent_id) = &request.parent_id {
        let parent = store.get(parent_id)?.ok_or_else(|| {
            CredentialError::InvalidInput(format!("unknown parent credential {parent_id}"))
        })?;
        if parent.credential_type() != circuit.credential_type {
            return Err(CredentialError::InvalidInput(format!(
                "{parent_id} is a {} credential, not {}",
                parent.credential_type(),
                circuit.credential_type
            )));
        }
        if let Some(existing) = &parent.reverified_id {
            return Err(CredentialError::InvalidInput(format!(
                "{parent_id} was already reverified by {existing}"
            )));
        }
    }

    if !verify_bundle(ctx, &request.bundle).await? {
        return Err(CredentialError::ProofRejected(circuit.id().to_string()));
    }
    let metadata = circuit.parse_public_data(&request.bundle.public_inputs)?;

    let credential = Credential {
        id: Uuid::new_v4().to_string(),
        version: request.bundle.version,
        metadata,
        proof: request.bundle.proof,
        public_inputs: request.bundle.public_inputs,
        verified_at: now,
        vault_id: request.vault_id,
        parent_id: request.parent_id,
        reverified_id: None,
    };
    // Re-checks the parent link atomically; a lost race stores nothing.
    store.insert(credential.clone())?;
    info!(
        id = %credential.id,
        credential_type = %credential.credential_type(),
        block_number = credential.metadata.block_number(),
        "credential created"
    );
    Ok(credential)
}

/// Replace an expiring credential with a freshly proven one in the same vault.
pub async fn reverify_credential(
    ctx: &VerificationContext,
    store: &dyn CredentialStore,
    parent_id: &str,
    bundle: ProofBundle,
) -> CredentialResult<Credential> {
    let parent = store
        .get(parent_id)?
        .ok_or_else(|| CredentialError::InvalidInput(format!("unknown credential {parent_id}")))?;
    create_credential(
        ctx,
        store,
        NewCredential {
            bundle,
            parent_id: Some(parent.id),
            vault_id: parent.vault_id,
        },
    )
    .await
}

/// The whole pipeline from a prepared proof and its signature to a stored credential.
pub async fn issue_credential(
    ctx: &VerificationContext,
    store: &dyn CredentialStore,
    prepared: &PreparedProof,
    signature: &[u8],
    vault_id: Option<String>,
    on_stage: &mut (dyn FnMut(ProofStage) + Send),
) -> CredentialResult<Credential> {
    let generated = prove_credential(ctx, prepared, signature, on_stage).await?;
    create_credential(
        ctx,
        store,
        NewCredential {
            bundle: generated.bundle,
            parent_id: None,
            vault_id,
        },
    )
    .await
}
