//! Noir / Barretenberg command-line backend.
//!
//! `nargo execute` solves the witness against the circuit package and
//! `bb prove` / `bb verify` produce and check UltraHonk proofs. Every call
//! works in its own scratch directory so concurrent proofs never share files.

use std::{
    env,
    path::{Path, PathBuf},
    process::Output,
};

use async_trait::async_trait;
use tokio::{process::Command, sync::OnceCell};
use tracing::{debug, warn};
use uuid::Uuid;
use zkcred_circuit::Witness;
use zkcred_common::{CircuitArtifacts, VerificationKey};
use zkcred_verifier::{VerifyError, VerifyingBackend};

use crate::{
    decode_field_elements, encode_field_elements, BackendError, ProvingBackend, RawProof,
    SolvedWitness,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BbConfig {
    pub nargo_bin: PathBuf,
    pub bb_bin: PathBuf,
    pub scratch_dir: PathBuf,
}

impl Default for BbConfig {
    fn default() -> Self {
        Self {
            nargo_bin: PathBuf::from("nargo"),
            bb_bin: PathBuf::from("bb"),
            scratch_dir: env::temp_dir(),
        }
    }
}

impl BbConfig {
    /// `ZKCRED_NARGO_BIN`, `ZKCRED_BB_BIN` and `ZKCRED_SCRATCH_DIR`, each optional.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            nargo_bin: env::var_os("ZKCRED_NARGO_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.nargo_bin),
            bb_bin: env::var_os("ZKCRED_BB_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.bb_bin),
            scratch_dir: env::var_os("ZKCRED_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
        }
    }
}

/// A located external binary and the version it reported.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolRuntime {
    pub path: PathBuf,
    pub version: String,
}

#[derive(Debug)]
struct ProverRuntime {
    nargo: ToolRuntime,
    bb: ToolRuntime,
}

pub struct BbBackend {
    config: BbConfig,
    prover_runtime: OnceCell<ProverRuntime>,
    verifier_runtime: OnceCell<ToolRuntime>,
}

impl BbBackend {
    pub fn new(config: BbConfig) -> Self {
        Self {
            config,
            prover_runtime: OnceCell::new(),
            verifier_runtime: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &BbConfig {
        &self.config
    }

    async fn prover_runtime(&self) -> Result<&ProverRuntime, BackendError> {
        self.prover_runtime
            .get_or_try_init(|| async {
                let nargo = locate_tool("nargo", &self.config.nargo_bin).await?;
                let bb = locate_tool("bb", &self.config.bb_bin).await?;
                Ok(ProverRuntime { nargo, bb })
            })
            .await
    }

    async fn verifier_runtime(&self) -> Result<&ToolRuntime, BackendError> {
        self.verifier_runtime
            .get_or_try_init(|| locate_tool("bb", &self.config.bb_bin))
            .await
    }

    async fn scratch(&self) -> Result<Scratch, BackendError> {
        let dir = self
            .config
            .scratch_dir
            .join(format!("zkcred-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Scratch { dir })
    }
}

/// Per-call working directory, removed on drop.
struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.dir) {
            debug!(dir = %self.dir.display(), %err, "failed to clean scratch dir");
        }
    }
}

async fn locate_tool(tool: &str, bin: &Path) -> Result<ToolRuntime, BackendError> {
    let output = Command::new(bin)
        .arg("--version")
        .output()
        .await
        .map_err(|e| BackendError::Runtime(tool.to_string(), format!("{}: {e}", bin.display())))?;
    if !output.status.success() {
        return Err(BackendError::Runtime(
            tool.to_string(),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    debug!(tool, %version, "located runtime");
    Ok(ToolRuntime {
        path: bin.to_path_buf(),
        version,
    })
}

async fn run(tool: &str, command: &mut Command) -> Result<Output, BackendError> {
    // The engine runs to completion even if the caller stops waiting.
    let output = command.kill_on_drop(false).output().await?;
    if !output.status.success() {
        return Err(BackendError::Tool {
            tool: tool.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

fn program_path(artifacts: &CircuitArtifacts) -> PathBuf {
    artifacts.program_dir.join(&artifacts.manifest.program.path)
}

#[async_trait]
impl ProvingBackend for BbBackend {
    fn name(&self) -> &str {
        "bb"
    }

    async fn solve_witness(
        &self,
        artifacts: &CircuitArtifacts,
        witness: &Witness,
    ) -> Result<SolvedWitness, BackendError> {
        let runtime = self.prover_runtime().await?;
        let toml = witness
            .to_prover_toml()
            .map_err(|e| BackendError::Output(e.to_string()))?;

        // nargo resolves the prover file relative to the package directory.
        let prover_name = format!("Prover-{}", Uuid::new_v4());
        let prover_file = artifacts.program_dir.join(format!("{prover_name}.toml"));
        let witness_name = format!("zkcred-{}", Uuid::new_v4());
        tokio::fs::write(&prover_file, toml).await?;

        let result = run(
            "nargo execute",
            Command::new(&runtime.nargo.path)
                .arg("execute")
                .arg("--program-dir")
                .arg(&artifacts.program_dir)
                .arg("--prover-name")
                .arg(&prover_name)
                .arg(&witness_name),
        )
        .await;
        let _ = tokio::fs::remove_file(&prover_file).await;
        result?;

        let witness_file = artifacts
            .program_dir
            .join("target")
            .join(format!("{witness_name}.gz"));
        let bytes = tokio::fs::read(&witness_file).await?;
        let _ = tokio::fs::remove_file(&witness_file).await;
        Ok(SolvedWitness {
            circuit: artifacts.circuit.clone(),
            bytes,
        })
    }

    async fn prove(
        &self,
        artifacts: &CircuitArtifacts,
        solved: &SolvedWitness,
    ) -> Result<RawProof, BackendError> {
        let runtime = self.prover_runtime().await?;
        let scratch = self.scratch().await?;
        let witness_path = scratch.path("witness.gz");
        tokio::fs::write(&witness_path, &solved.bytes).await?;

        run(
            "bb prove",
            Command::new(&runtime.bb.path)
                .arg("prove")
                .arg("-b")
                .arg(program_path(artifacts))
                .arg("-w")
                .arg(&witness_path)
                .arg("-o")
                .arg(&scratch.dir),
        )
        .await?;

        let proof = tokio::fs::read(scratch.path("proof")).await?;
        let inputs = tokio::fs::read(scratch.path("public_inputs")).await?;
        let public_inputs = decode_field_elements(&inputs)?;
        Ok(RawProof {
            proof,
            public_inputs,
        })
    }
}

#[async_trait]
impl VerifyingBackend for BbBackend {
    async fn verify(
        &self,
        vk: &VerificationKey,
        proof: &[u8],
        public_inputs: &[String],
    ) -> Result<bool, VerifyError> {
        let backend_err = |e: BackendError| VerifyError::Backend(e.to_string());
        let runtime = self.verifier_runtime().await.map_err(backend_err)?;
        let scratch = self.scratch().await.map_err(backend_err)?;
        let encoded = encode_field_elements(public_inputs).map_err(backend_err)?;

        let write = async {
            tokio::fs::write(scratch.path("vk"), &vk.bytes).await?;
            tokio::fs::write(scratch.path("proof"), proof).await?;
            tokio::fs::write(scratch.path("public_inputs"), &encoded).await
        };
        write.await.map_err(|e| VerifyError::Backend(e.to_string()))?;

        let output = Command::new(&runtime.path)
            .arg("verify")
            .arg("-k")
            .arg(scratch.path("vk"))
            .arg("-p")
            .arg(scratch.path("proof"))
            .arg("-i")
            .arg(scratch.path("public_inputs"))
            .output()
            .await
            .map_err(|e| VerifyError::Backend(e.to_string()))?;

        let verified = verify_outcome(&output)?;
        if !verified {
            warn!(circuit = %vk.circuit, "bb verify rejected proof");
        }
        Ok(verified)
    }
}

/// Exit code bb uses both for a failed check and for its own errors.
const VERIFY_FAILED_CODE: i32 = 1;

/// Log lines bb prints when the proof itself does not verify.
const VERIFY_FAILED_MARKERS: [&str; 2] = ["verified: 0", "verification failed"];

/// `false` only when bb checked the proof and it did not hold. Unreadable
/// inputs, crashes and signals are errors.
fn verify_outcome(output: &Output) -> Result<bool, VerifyError> {
    if output.status.success() {
        return Ok(true);
    }
    let log = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
    .to_lowercase();
    let rejected = VERIFY_FAILED_MARKERS.iter().any(|m| log.contains(m));
    match output.status.code() {
        Some(VERIFY_FAILED_CODE) if rejected => Ok(false),
        code => Err(VerifyError::Backend(format!(
            "bb verify exited with {}: {}",
            code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")),
            String::from_utf8_lossy(&output.stderr).trim()
        ))),
    }
}
