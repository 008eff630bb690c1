// zkcred/zkcred-common/src/artifacts.rs

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{
    error::{CredentialError, CredentialResult},
    types::{CircuitId, CredentialType},
};

pub const MANIFEST_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";
pub const PROGRAM_FILE: &str = "program.json";
pub const VK_FILE: &str = "vk";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub path: String,
    pub blake3: String,
    pub size: u64,
}

impl ArtifactFile {
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            blake3: hash_bytes_hex(bytes),
            size: bytes.len() as u64,
        }
    }

    fn resolve_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.path)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub manifest_version: u32,
    pub credential_type: CredentialType,
    pub version: String,
    pub created_at_unix: u64,
    pub program: ArtifactFile,
    pub vk: ArtifactFile,
}

impl ArtifactManifest {
    pub fn circuit_id(&self) -> CircuitId {
        CircuitId::new(self.credential_type, self.version.clone())
    }
}

/// Verification key bytes tagged with the circuit they were compiled for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationKey {
    pub circuit: CircuitId,
    pub bytes: Vec<u8>,
    /// blake3 of `bytes`, hex encoded.
    pub digest: String,
}

impl VerificationKey {
    pub fn new(circuit: CircuitId, bytes: Vec<u8>) -> Self {
        let digest = hash_bytes_hex(&bytes);
        Self {
            circuit,
            bytes,
            digest,
        }
    }
}

/// Everything the prover and verifier need for one compiled circuit.
#[derive(Clone, Debug)]
pub struct CircuitArtifacts {
    pub manifest: ArtifactManifest,
    pub circuit: CircuitId,
    pub program: Vec<u8>,
    /// Directory holding the compiled program; external tools run against it.
    pub program_dir: PathBuf,
    pub vk: VerificationKey,
}

#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn load(&self, circuit: &CircuitId) -> CredentialResult<CircuitArtifacts>;
}

/// Reads `<root>/<type-slug>/<version>/manifest.json` and the files it lists.
#[derive(Clone, Debug)]
pub struct FsArtifactSource {
    root: PathBuf,
}

impl FsArtifactSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn circuit_dir(&self, circuit: &CircuitId) -> PathBuf {
        circuit_dir(&self.root, circuit)
    }
}

#[async_trait]
impl ArtifactSource for FsArtifactSource {
    async fn load(&self, circuit: &CircuitId) -> CredentialResult<CircuitArtifacts> {
        let dir = self.circuit_dir(circuit);
        load_circuit_artifacts(&dir, circuit)
            .await
            .map_err(|err| CredentialError::Artifact(format!("{circuit}: {err:#}")))
    }
}

pub fn circuit_dir(root: &Path, circuit: &CircuitId) -> PathBuf {
    root.join(circuit.credential_type.slug())
        .join(&circuit.version)
}

async fn load_circuit_artifacts(dir: &Path, circuit: &CircuitId) -> Result<CircuitArtifacts> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest_bytes = tokio::fs::read(&manifest_path)
        .await
        .with_context(|| format!("failed to read manifest at {}", manifest_path.display()))?;
    let manifest: ArtifactManifest =
        serde_json::from_slice(&manifest_bytes).context("failed to parse manifest json")?;
    ensure_manifest_compat(&manifest, circuit)?;

    let program = read_artifact_file(dir, &manifest.program, "program").await?;
    let vk_bytes = read_artifact_file(dir, &manifest.vk, "verification key").await?;

    Ok(CircuitArtifacts {
        circuit: circuit.clone(),
        program,
        program_dir: dir.to_path_buf(),
        vk: VerificationKey::new(circuit.clone(), vk_bytes),
        manifest,
    })
}

async fn read_artifact_file(base_dir: &Path, entry: &ArtifactFile, label: &str) -> Result<Vec<u8>> {
    let path = entry.resolve_path(base_dir);
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("failed to read {} at {}", label, path.display()))?;
    ensure!(
        bytes.len() as u64 == entry.size,
        "{} size mismatch, manifest recorded {} bytes but found {}",
        label,
        entry.size,
        bytes.len(),
    );
    ensure_hash(&bytes, &entry.blake3, label)?;
    Ok(bytes)
}

fn ensure_hash(bytes: &[u8], expected_hex: &str, label: &str) -> Result<()> {
    let actual = hash_bytes_hex(bytes);
    ensure!(
        actual == expected_hex,
        "{} hash mismatch, expected {} but computed {}",
        label,
        expected_hex,
        actual
    );
    Ok(())
}

fn ensure_manifest_compat(manifest: &ArtifactManifest, circuit: &CircuitId) -> Result<()> {
    ensure!(
        manifest.manifest_version == MANIFEST_VERSION,
        "unsupported manifest version {}, expected {}",
        manifest.manifest_version,
        MANIFEST_VERSION
    );
    ensure!(
        &manifest.circuit_id() == circuit,
        "manifest describes {} but {} was requested",
        manifest.circuit_id(),
        circuit
    );
    Ok(())
}

pub fn hash_bytes_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

pub fn write_manifest(path: impl AsRef<Path>, manifest: &ArtifactManifest) -> Result<()> {
    let json = serde_json::to_vec_pretty(manifest).context("failed to serialize manifest")?;
    fs::write(path.as_ref(), json).context("failed to write manifest")
}

pub fn read_manifest(path: impl AsRef<Path>) -> Result<ArtifactManifest> {
    let bytes = fs::read(path.as_ref()).context("failed to read manifest file")?;
    serde_json::from_slice(&bytes).context("failed to parse manifest json")
}

/// Lay out a circuit directory under `root` the way [`FsArtifactSource`] expects.
pub fn write_circuit_artifacts(
    root: impl AsRef<Path>,
    circuit: &CircuitId,
    program: &[u8],
    vk: &[u8],
) -> Result<ArtifactManifest> {
    let dir = circuit_dir(root.as_ref(), circuit);
    fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    fs::write(dir.join(PROGRAM_FILE), program).context("failed to write program")?;
    fs::write(dir.join(VK_FILE), vk).context("failed to write verification key")?;

    let created_at_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let manifest = ArtifactManifest {
        manifest_version: MANIFEST_VERSION,
        credential_type: circuit.credential_type,
        version: circuit.version.clone(),
        created_at_unix,
        program: ArtifactFile::from_bytes(PROGRAM_FILE, program),
        vk: ArtifactFile::from_bytes(VK_FILE, vk),
    };
    write_manifest(dir.join(MANIFEST_FILE), &manifest)?;
    Ok(manifest)
}

type Slot = Arc<OnceCell<Arc<CircuitArtifacts>>>;

/// Lazily loads each circuit's artifacts at most once.
///
/// Concurrent first requests for the same circuit share one in-flight load. A
/// failed load leaves the slot empty, so the next request tries again.
pub struct ArtifactCache {
    source: Arc<dyn ArtifactSource>,
    slots: Mutex<HashMap<CircuitId, Slot>>,
}

impl ArtifactCache {
    pub fn new(source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            source,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, circuit: &CircuitId) -> CredentialResult<Arc<CircuitArtifacts>> {
        let slot = self.slot(circuit);
        let artifacts = slot
            .get_or_try_init(|| async {
                debug!(%circuit, "loading circuit artifacts");
                self.source.load(circuit).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(artifacts))
    }

    pub async fn verification_key(&self, circuit: &CircuitId) -> CredentialResult<VerificationKey> {
        Ok(self.get(circuit).await?.vk.clone())
    }

    pub fn is_loaded(&self, circuit: &CircuitId) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(circuit)
            .map(|slot| slot.initialized())
            .unwrap_or(false)
    }

    fn slot(&self, circuit: &CircuitId) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(circuit.clone()).or_default())
    }
}

impl std::fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let loaded = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.initialized())
            .count();
        f.debug_struct("ArtifactCache")
            .field("loaded", &loaded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    fn erc20() -> CircuitId {
        CircuitId::new(CredentialType::Erc20Balance, "0.1.0")
    }

    #[tokio::test]
    async fn filesystem_source_checks_manifest_digests() {
        let dir = tempfile::tempdir().unwrap();
        let manifest =
            write_circuit_artifacts(dir.path(), &erc20(), b"{\"bytecode\":\"\"}", b"vk-bytes")
                .unwrap();
        assert_eq!(manifest.vk.size, 8);

        let source = FsArtifactSource::new(dir.path());
        let loaded = source.load(&erc20()).await.unwrap();
        assert_eq!(loaded.vk.bytes, b"vk-bytes");
        assert_eq!(loaded.vk.circuit, erc20());
        assert_eq!(loaded.vk.digest, hash_bytes_hex(b"vk-bytes"));
        assert!(loaded.program_dir.ends_with("erc20-balance/0.1.0"));

        fs::write(source.circuit_dir(&erc20()).join(VK_FILE), b"vk-bytez").unwrap();
        let err = source.load(&erc20()).await.unwrap_err();
        assert!(err.to_string().contains("hash mismatch"), "{err}");
    }

    #[tokio::test]
    async fn manifest_for_another_circuit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_circuit_artifacts(dir.path(), &erc20(), b"p", b"v").unwrap();
        let other = CircuitId::new(CredentialType::Erc721Balance, "0.1.0");
        let src_dir = circuit_dir(dir.path(), &erc20());
        let dst_dir = circuit_dir(dir.path(), &other);
        fs::create_dir_all(dst_dir.parent().unwrap()).unwrap();
        fs::rename(src_dir, dst_dir).unwrap();

        let err = FsArtifactSource::new(dir.path()).load(&other).await.unwrap_err();
        assert!(matches!(err, CredentialError::Artifact(_)));
    }

    struct CountingSource {
        loads: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl ArtifactSource for CountingSource {
        async fn load(&self, circuit: &CircuitId) -> CredentialResult<CircuitArtifacts> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail_first && n == 0 {
                return Err(CredentialError::Artifact("transient".into()));
            }
            let vk = VerificationKey::new(circuit.clone(), vec![7; 4]);
            Ok(CircuitArtifacts {
                manifest: ArtifactManifest {
                    manifest_version: MANIFEST_VERSION,
                    credential_type: circuit.credential_type,
                    version: circuit.version.clone(),
                    created_at_unix: 0,
                    program: ArtifactFile::from_bytes(PROGRAM_FILE, b""),
                    vk: ArtifactFile::from_bytes(VK_FILE, &vk.bytes),
                },
                circuit: circuit.clone(),
                program: Vec::new(),
                program_dir: PathBuf::from("."),
                vk,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_first_requests_share_one_load() {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
            fail_first: false,
        });
        let cache = ArtifactCache::new(source.clone());
        let id = erc20();

        let (a, b) = tokio::join!(cache.get(&id), cache.get(&id));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert!(cache.is_loaded(&id));

        cache.get(&id).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_can_be_retried() {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
            fail_first: true,
        });
        let cache = ArtifactCache::new(source.clone());
        let id = erc20();

        assert!(cache.get(&id).await.is_err());
        assert!(!cache.is_loaded(&id));
        let vk = cache.verification_key(&id).await.unwrap();
        assert_eq!(vk.circuit, id);
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }
}
