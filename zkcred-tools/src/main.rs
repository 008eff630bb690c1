use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zkcred_circuit::{circuit_for, shape_for, shape::FieldKind, CredentialCircuit};
use zkcred_common::{
    artifacts::{circuit_dir, read_manifest, write_circuit_artifacts, MANIFEST_FILE},
    canonical_json, current_circuit, decode_hex, Address, ArtifactManifest, Balance, Bytes32,
    Credential, CredentialRequirement, CredentialType, ProofBundle,
};
use zkcred_credentials::{
    create_credential, prepare, prove_credential, select_all, verify_bundle, ContextConfig,
    CredentialStore, NewCredential, PreparedProof, ProofRequest, SledCredentialStore,
    VerificationContext, DEFAULT_CIRCUITS_DIR,
};
use zkcred_prover::ProofStage;

#[derive(Parser)]
#[command(
    name = "zkcred-tools",
    about = "Prepare, prove, verify and select anonymous on-chain credentials"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the witness shape of every current circuit.
    Shapes(ShapesArgs),
    /// Canonicalize a JSON document (file or stdin).
    Canonical(CanonicalArgs),
    /// Write a compiled program and verification key into the artifact layout.
    Package(PackageArgs),
    /// Print the manifest of an installed circuit.
    DumpManifest(DumpManifestArgs),
    /// Fetch chain state and print the message the wallet must sign.
    Prepare(PrepareArgs),
    /// Bind a signature to a prepared proof and generate the proof.
    Prove(ProveArgs),
    /// Verify a proof bundle, optionally storing it as a credential.
    Verify(VerifyArgs),
    /// Pick the least revealing credential that satisfies a requirement.
    Select(SelectArgs),
}

#[derive(Args)]
struct ShapesArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CanonicalArgs {
    /// JSON file; stdin when omitted.
    input: Option<PathBuf>,
}

#[derive(Args)]
struct PackageArgs {
    #[arg(long = "type")]
    credential_type: CredentialType,
    /// Compiled program JSON produced by `nargo compile`.
    #[arg(long)]
    program: PathBuf,
    /// Verification key produced by `bb write_vk`.
    #[arg(long)]
    vk: PathBuf,
    #[arg(long, default_value = DEFAULT_CIRCUITS_DIR)]
    output_dir: PathBuf,
}

#[derive(Args)]
struct DumpManifestArgs {
    #[arg(long = "type")]
    credential_type: CredentialType,
    #[arg(long, default_value = DEFAULT_CIRCUITS_DIR)]
    circuits_dir: PathBuf,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct PrepareArgs {
    #[arg(long = "type")]
    credential_type: CredentialType,
    #[arg(long)]
    wallet: Address,
    /// Defaults to OP Mainnet for fids; required otherwise.
    #[arg(long)]
    chain_id: Option<u64>,
    /// Token contract for ERC20/ERC721 balances.
    #[arg(long)]
    token: Option<Address>,
    /// Declaration slot of the token's `balances` mapping.
    #[arg(long, default_value_t = 0)]
    slot: u64,
    /// Disclose this amount instead of the full balance.
    #[arg(long)]
    claim: Option<Balance>,
    #[arg(long, default_value = "prepared.json")]
    out: PathBuf,
}

#[derive(Args)]
struct ProveArgs {
    #[arg(long, default_value = "prepared.json")]
    prepared: PathBuf,
    /// 65-byte `personal_sign` signature over the prepared message, hex.
    #[arg(long)]
    signature: String,
    #[arg(long, default_value = "bundle.json")]
    out: PathBuf,
}

#[derive(Args)]
struct VerifyArgs {
    #[arg(long, default_value = "bundle.json")]
    bundle: PathBuf,
    /// Store the verified proof as a credential in `ZKCRED_CREDENTIAL_DB`.
    #[arg(long)]
    issue: bool,
    #[arg(long, requires = "issue")]
    parent_id: Option<String>,
    #[arg(long, requires = "issue")]
    vault_id: Option<String>,
}

#[derive(Args)]
struct SelectArgs {
    /// Requirement JSON, e.g. `{"type":"FARCASTER_FID","fid":1000}`.
    #[arg(long)]
    requirement: PathBuf,
    /// Credentials JSON array; the credential store when omitted.
    #[arg(long)]
    credentials: Option<PathBuf>,
    /// Print every usable credential, least revealing first.
    #[arg(long)]
    all: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zkcred_tools=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Shapes(args) => shapes(args),
        Commands::Canonical(args) => canonical(args),
        Commands::Package(args) => package(args),
        Commands::DumpManifest(args) => dump_manifest(args),
        Commands::Prepare(args) => prepare_proof(args).await,
        Commands::Prove(args) => prove(args).await,
        Commands::Verify(args) => verify(args).await,
        Commands::Select(args) => select_credential(args),
    }
}

fn shapes(args: ShapesArgs) -> Result<()> {
    let circuits: Vec<&CredentialCircuit> =
        CredentialType::ALL.into_iter().map(circuit_for).collect();
    if args.json {
        let shapes: Vec<_> = circuits
            .iter()
            .map(|c| serde_json::json!({ "circuit": c.id().to_string(), "shape": c.shape }))
            .collect();
        return print_json(&shapes);
    }

    for circuit in circuits {
        let shape = shape_for(circuit.credential_type);
        println!(
            "{} ({} public inputs)",
            circuit.id(),
            shape.public_input_count()
        );
        for field in shape.fields {
            let layout = match field.kind {
                FieldKind::Scalar => "32 bytes, pad Left, one public input".to_string(),
                FieldKind::Integer => "integer".to_string(),
                FieldKind::Bytes { len, pad } => format!("{len} bytes, pad {pad:?}"),
                FieldKind::Rows { rows, len, pad } => {
                    format!("{rows} x {len} bytes, pad {pad:?}")
                }
            };
            let public = if shape.public_layout.contains(&field.name) {
                " [public]"
            } else {
                ""
            };
            println!("  {:<20} {layout}{public}", field.name);
        }
    }
    Ok(())
}

fn canonical(args: CanonicalArgs) -> Result<()> {
    let raw = match &args.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };
    let value: serde_json::Value = serde_json::from_str(&raw).context("input is not JSON")?;
    println!("{}", canonical_json(&value));
    Ok(())
}

fn package(args: PackageArgs) -> Result<()> {
    let circuit = current_circuit(args.credential_type);
    let program = fs::read(&args.program)
        .with_context(|| format!("failed to read {}", args.program.display()))?;
    let vk = fs::read(&args.vk).with_context(|| format!("failed to read {}", args.vk.display()))?;

    let manifest = write_circuit_artifacts(&args.output_dir, &circuit, &program, &vk)?;
    println!(
        "Packaged {} at {}",
        circuit,
        circuit_dir(&args.output_dir, &circuit).display()
    );
    print_manifest_summary(&manifest);
    Ok(())
}

fn dump_manifest(args: DumpManifestArgs) -> Result<()> {
    let circuit = current_circuit(args.credential_type);
    let path = circuit_dir(&args.circuits_dir, &circuit).join(MANIFEST_FILE);
    let manifest = read_manifest(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    if args.json {
        return print_json(&manifest);
    }
    println!("{} (manifest v{})", manifest.circuit_id(), manifest.manifest_version);
    print_manifest_summary(&manifest);
    Ok(())
}

fn print_manifest_summary(manifest: &ArtifactManifest) {
    println!(
        "  {}: {} bytes, blake3: {}",
        manifest.program.path, manifest.program.size, manifest.program.blake3
    );
    println!(
        "  {}: {} bytes, blake3: {}",
        manifest.vk.path, manifest.vk.size, manifest.vk.blake3
    );
}

fn context() -> Result<VerificationContext> {
    Ok(VerificationContext::from_config(&ContextConfig::from_env())?)
}

async fn prepare_proof(args: PrepareArgs) -> Result<()> {
    let request = match args.credential_type {
        ty @ (CredentialType::Erc20Balance | CredentialType::Erc721Balance) => {
            let token = args
                .token
                .ok_or_else(|| anyhow!("--token is required for {ty}"))?;
            let chain_id = args
                .chain_id
                .ok_or_else(|| anyhow!("--chain-id is required for {ty}"))?;
            ProofRequest::token(ty, args.wallet, chain_id, token, Bytes32::from_u64(args.slot))
        }
        CredentialType::NativeBalance => {
            let chain_id = args
                .chain_id
                .ok_or_else(|| anyhow!("--chain-id is required for native balances"))?;
            ProofRequest::native(args.wallet, chain_id)
        }
        CredentialType::FarcasterFid => {
            let mut request = ProofRequest::farcaster(args.wallet);
            if let Some(chain_id) = args.chain_id {
                request.chain_id = chain_id;
            }
            request
        }
    };
    let request = match args.claim {
        Some(amount) => request.claiming(amount),
        None => request,
    };

    let ctx = context()?;
    let prepared = prepare(&ctx, request).await?;
    write_json(&args.out, &prepared)?;
    info!(
        circuit = %prepared.circuit,
        block_number = prepared.block.number,
        out = %args.out.display(),
        "prepared proof"
    );
    println!("{}", prepared.message);
    Ok(())
}

async fn prove(args: ProveArgs) -> Result<()> {
    let prepared: PreparedProof = read_json(&args.prepared)?;
    let signature = decode_hex(&args.signature).context("signature is not hex")?;

    let ctx = context()?;
    let mut report = |stage: ProofStage| info!(?stage, "proving");
    let generated = prove_credential(&ctx, &prepared, &signature, &mut report).await?;
    write_json(&args.out, &generated.bundle)?;
    println!(
        "Proved {} in {:.1}s -> {}",
        prepared.circuit,
        generated.elapsed.as_secs_f64(),
        args.out.display()
    );
    Ok(())
}

async fn verify(args: VerifyArgs) -> Result<()> {
    let bundle: ProofBundle = read_json(&args.bundle)?;
    let ctx = context()?;

    if !args.issue {
        let valid = verify_bundle(&ctx, &bundle).await?;
        println!("{}", if valid { "valid" } else { "invalid" });
        if !valid {
            bail!("proof for {} did not verify", bundle.circuit_id());
        }
        return Ok(());
    }

    let store = SledCredentialStore::from_env()?;
    let credential = create_credential(
        &ctx,
        &store,
        NewCredential {
            bundle,
            parent_id: args.parent_id,
            vault_id: args.vault_id,
        },
    )
    .await?;
    print_json(&credential)
}

fn select_credential(args: SelectArgs) -> Result<()> {
    let requirement: CredentialRequirement = read_json(&args.requirement)?;
    let credentials: Vec<Credential> = match &args.credentials {
        Some(path) => read_json(path)?,
        None => SledCredentialStore::from_env()?.list()?,
    };

    let usable = select_all(&credentials, &requirement, chrono::Utc::now());
    if usable.is_empty() {
        bail!(
            "no usable {} credential among {}",
            requirement.credential_type(),
            credentials.len()
        );
    }
    if args.all {
        print_json(&usable)
    } else {
        print_json(&usable[0])
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_prepare_arguments() {
        let cli = Cli::try_parse_from([
            "zkcred-tools",
            "prepare",
            "--type",
            "ERC20_BALANCE",
            "--wallet",
            "0x00000000000000000000000000000000000000aa",
            "--chain-id",
            "8453",
            "--token",
            "0x0db510e79909666d6dec7f5e49370838c16d950f",
            "--claim",
            "5000",
        ])
        .unwrap();
        let Commands::Prepare(args) = cli.command else {
            panic!("expected prepare");
        };
        assert_eq!(args.credential_type, CredentialType::Erc20Balance);
        assert_eq!(args.chain_id, Some(8453));
        assert_eq!(args.claim, Some(Balance::from(5000u64)));
        assert_eq!(args.slot, 0);
    }

    #[test]
    fn vault_requires_issue() {
        assert!(Cli::try_parse_from(["zkcred-tools", "verify", "--vault-id", "v"]).is_err());
    }

    #[test]
    fn package_writes_a_loadable_manifest() {
        let dir = std::env::temp_dir().join(format!("zkcred-tools-{}", std::process::id()));
        let program = dir.join("program.json");
        let vk = dir.join("vk");
        fs::create_dir_all(&dir).unwrap();
        fs::write(&program, b"{}").unwrap();
        fs::write(&vk, b"vk").unwrap();

        package(PackageArgs {
            credential_type: CredentialType::NativeBalance,
            program,
            vk,
            output_dir: dir.join("circuits"),
        })
        .unwrap();
        let circuit: zkcred_common::CircuitId = current_circuit(CredentialType::NativeBalance);
        let manifest =
            read_manifest(circuit_dir(&dir.join("circuits"), &circuit).join(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest.circuit_id(), circuit);
        assert_eq!(manifest.vk.size, 2);
        fs::remove_dir_all(&dir).unwrap();
    }
}
