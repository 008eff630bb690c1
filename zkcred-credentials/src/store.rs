//! Credential persistence.
//!
//! Credentials are write-once. The only later change is recording which
//! credential reverified a parent; that link is set at most once, in the same
//! atomic step that stores the child.

use std::{
    collections::BTreeMap,
    env, fs,
    path::Path,
    sync::{Mutex, PoisonError},
};

use sled::transaction::{ConflictableTransactionError, TransactionError};
use zkcred_common::{Credential, CredentialError, CredentialResult};

pub const CREDENTIAL_DB_ENV: &str = "ZKCRED_CREDENTIAL_DB";
pub const DEFAULT_CREDENTIAL_DB_PATH: &str = "data/credentials.db";

pub trait CredentialStore: Send + Sync {
    /// Fails if a credential with the same id exists.
    ///
    /// A credential with a `parent_id` is stored only if its parent exists and
    /// was not reverified by anyone else; the parent's `reverified_id` is set
    /// in the same step. On failure nothing is written.
    fn insert(&self, credential: Credential) -> CredentialResult<()>;

    fn get(&self, id: &str) -> CredentialResult<Option<Credential>>;

    fn list(&self) -> CredentialResult<Vec<Credential>>;
}

fn link(parent: &mut Credential, reverified_id: &str) -> CredentialResult<()> {
    if let Some(existing) = &parent.reverified_id {
        return Err(CredentialError::Store(format!(
            "{} was already reverified by {existing}",
            parent.id
        )));
    }
    parent.reverified_id = Some(reverified_id.to_string());
    Ok(())
}

fn unknown(id: &str) -> CredentialError {
    CredentialError::Store(format!("unknown credential {id}"))
}

fn exists(id: &str) -> CredentialError {
    CredentialError::Store(format!("credential {id} already exists"))
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credentials: Mutex<BTreeMap<String, Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Credential>> {
        self.credentials.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn insert(&self, credential: Credential) -> CredentialResult<()> {
        let mut credentials = self.lock();
        if credentials.contains_key(&credential.id) {
            return Err(exists(&credential.id));
        }
        if let Some(parent_id) = &credential.parent_id {
            let parent = credentials.get_mut(parent_id).ok_or_else(|| unknown(parent_id))?;
            link(parent, &credential.id)?;
        }
        credentials.insert(credential.id.clone(), credential);
        Ok(())
    }

    fn get(&self, id: &str) -> CredentialResult<Option<Credential>> {
        Ok(self.lock().get(id).cloned())
    }

    fn list(&self) -> CredentialResult<Vec<Credential>> {
        Ok(self.lock().values().cloned().collect())
    }
}

/// Credentials as JSON values in a sled tree keyed by id.
#[derive(Clone, Debug)]
pub struct SledCredentialStore {
    db: sled::Db,
}

impl SledCredentialStore {
    pub fn open(path: impl AsRef<Path>) -> CredentialResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    CredentialError::Store(format!(
                        "failed to create directory for credential db at {}: {err}",
                        path.display()
                    ))
                })?;
            }
        }
        let db = sled::open(path).map_err(|err| {
            CredentialError::Store(format!(
                "failed to open credential db at {}: {err}",
                path.display()
            ))
        })?;
        Ok(Self { db })
    }

    pub fn from_env() -> CredentialResult<Self> {
        let path = env::var(CREDENTIAL_DB_ENV)
            .unwrap_or_else(|_| DEFAULT_CREDENTIAL_DB_PATH.to_string());
        Self::open(path)
    }

    fn decode(bytes: &[u8]) -> CredentialResult<Credential> {
        serde_json::from_slice(bytes)
            .map_err(|err| CredentialError::Store(format!("corrupt credential record: {err}")))
    }

    fn encode(credential: &Credential) -> CredentialResult<Vec<u8>> {
        serde_json::to_vec(credential)
            .map_err(|err| CredentialError::Store(format!("failed to encode credential: {err}")))
    }
}

fn db_error(err: sled::Error) -> CredentialError {
    CredentialError::Store(format!("credential db error: {err}"))
}

impl CredentialStore for SledCredentialStore {
    fn insert(&self, credential: Credential) -> CredentialResult<()> {
        let bytes = Self::encode(&credential)?;
        let Some(parent_id) = &credential.parent_id else {
            return self
                .db
                .compare_and_swap(credential.id.as_bytes(), None::<&[u8]>, Some(bytes))
                .map_err(db_error)?
                .map_err(|_| exists(&credential.id));
        };

        // Child and parent link commit together or not at all.
        self.db
            .transaction(|tx| {
                if tx.get(credential.id.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(exists(&credential.id)));
                }
                let old = tx
                    .get(parent_id.as_bytes())?
                    .ok_or_else(|| ConflictableTransactionError::Abort(unknown(parent_id)))?;
                let mut parent = Self::decode(&old).map_err(ConflictableTransactionError::Abort)?;
                link(&mut parent, &credential.id).map_err(ConflictableTransactionError::Abort)?;
                let linked = Self::encode(&parent).map_err(ConflictableTransactionError::Abort)?;
                tx.insert(parent_id.as_bytes(), linked)?;
                tx.insert(credential.id.as_bytes(), bytes.clone())?;
                Ok(())
            })
            .map_err(|err| match err {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => db_error(err),
            })
    }

    fn get(&self, id: &str) -> CredentialResult<Option<Credential>> {
        self.db
            .get(id.as_bytes())
            .map_err(db_error)?
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    fn list(&self) -> CredentialResult<Vec<Credential>> {
        self.db
            .iter()
            .values()
            .map(|bytes| Self::decode(&bytes.map_err(db_error)?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use zkcred_common::{Bytes32, CredentialMetadata, NativeBalanceMetadata};

    use super::*;

    fn child(id: &str, parent: &str) -> Credential {
        Credential {
            parent_id: Some(parent.into()),
            ..credential(id)
        }
    }

    fn credential(id: &str) -> Credential {
        Credential {
            id: id.into(),
            version: "0.1.0".into(),
            metadata: CredentialMetadata::NativeBalance(NativeBalanceMetadata {
                chain_id: 1,
                balance: 5u64.into(),
                block_number: 10,
                state_root: Bytes32::ZERO,
            }),
            proof: vec![1],
            public_inputs: Vec::new(),
            verified_at: Utc::now(),
            vault_id: None,
            parent_id: None,
            reverified_id: None,
        }
    }

    fn exercise(store: &dyn CredentialStore) {
        store.insert(credential("a")).unwrap();
        store.insert(credential("b")).unwrap();
        assert!(matches!(
            store.insert(credential("a")),
            Err(CredentialError::Store(_))
        ));

        store.insert(child("c", "a")).unwrap();
        assert_eq!(store.get("a").unwrap().unwrap().reverified_id.as_deref(), Some("c"));

        // A second child of the same parent, or a child of nothing, leaves no trace.
        assert!(matches!(store.insert(child("d", "a")), Err(CredentialError::Store(_))));
        assert!(store.insert(child("e", "missing")).is_err());
        assert!(store.insert(child("b", "c")).is_err());
        assert!(store.get("d").unwrap().is_none());
        assert!(store.get("e").unwrap().is_none());
        assert!(store.get("c").unwrap().unwrap().reverified_id.is_none());

        assert_eq!(store.get("a").unwrap().unwrap().reverified_id.as_deref(), Some("c"));
        assert!(store.get("missing").unwrap().is_none());
        assert_eq!(store.list().unwrap().len(), 3);
    }

    #[test]
    fn in_memory_store_is_write_once() {
        exercise(&InMemoryCredentialStore::new());
    }

    #[test]
    fn sled_store_is_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledCredentialStore::open(dir.path().join("nested/credentials.db")).unwrap();
        exercise(&store);
        let raw = store.db.get("a").unwrap().unwrap();
        assert!(SledCredentialStore::decode(&raw).is_ok());
    }

    #[test]
    fn racing_children_link_exactly_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledCredentialStore::open(dir.path().join("credentials.db")).unwrap();
        store.insert(credential("parent")).unwrap();

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let store = &store;
                    scope.spawn(move || store.insert(child(&format!("child-{i}"), "parent")))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(store.list().unwrap().len(), 2);
        let parent = store.get("parent").unwrap().unwrap();
        let winner = parent.reverified_id.unwrap();
        assert_eq!(store.get(&winner).unwrap().unwrap().parent_id.as_deref(), Some("parent"));
    }
}
