//! Run store selected by the configuration.

use corefchain_domain::traits::RunStore;
use corefchain_domain::{ArtifactHandle, ArtifactKind, RunKey, RunState};
use corefchain_pipeline::{StorageBackend, StorageConfig};
use corefchain_store::{FsStore, SqliteStore, StoreError};
use std::path::Path;
use tracing::debug;

/// Either store backend behind one type.
pub enum AnyStore {
    /// One directory per run
    Fs(FsStore),
    /// Single SQLite database
    Sqlite(SqliteStore),
}

impl AnyStore {
    /// Open the configured backend, resolving its path against `base_dir`.
    pub fn open(config: &StorageConfig, base_dir: &Path) -> Result<Self, StoreError> {
        let path = base_dir.join(&config.path);
        debug!(backend = ?config.backend, path = %path.display(), "Opening run store");
        match config.backend {
            StorageBackend::Fs => Ok(AnyStore::Fs(FsStore::new(path)?)),
            StorageBackend::Sqlite => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Ok(AnyStore::Sqlite(SqliteStore::new(path)?))
            }
        }
    }
}

impl RunStore for AnyStore {
    type Error = StoreError;

    fn load_state(&self, key: &RunKey) -> Result<Option<RunState>, StoreError> {
        match self {
            AnyStore::Fs(store) => store.load_state(key),
            AnyStore::Sqlite(store) => store.load_state(key),
        }
    }

    fn save_state(&mut self, state: &RunState) -> Result<(), StoreError> {
        match self {
            AnyStore::Fs(store) => store.save_state(state),
            AnyStore::Sqlite(store) => store.save_state(state),
        }
    }

    fn put_artifact(
        &mut self,
        key: &RunKey,
        kind: ArtifactKind,
        body: &str,
    ) -> Result<ArtifactHandle, StoreError> {
        match self {
            AnyStore::Fs(store) => store.put_artifact(key, kind, body),
            AnyStore::Sqlite(store) => store.put_artifact(key, kind, body),
        }
    }

    fn get_artifact(&self, key: &RunKey, kind: ArtifactKind) -> Result<Option<String>, StoreError> {
        match self {
            AnyStore::Fs(store) => store.get_artifact(key, kind),
            AnyStore::Sqlite(store) => store.get_artifact(key, kind),
        }
    }

    fn list_runs(&self, document_id: &str) -> Result<Vec<RunKey>, StoreError> {
        match self {
            AnyStore::Fs(store) => store.list_runs(document_id),
            AnyStore::Sqlite(store) => store.list_runs(document_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corefchain_domain::EntityCategory;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_open_each_backend() {
        let temp = TempDir::new().unwrap();
        let key = RunKey::new("case-1", EntityCategory::Person);

        for (backend, path) in [
            (StorageBackend::Fs, "runs"),
            (StorageBackend::Sqlite, "db/runs.sqlite"),
        ] {
            let config = StorageConfig {
                backend,
                path: PathBuf::from(path),
            };
            let mut store = AnyStore::open(&config, temp.path()).unwrap();
            store
                .put_artifact(&key, ArtifactKind::Source, "Maria crossed the border.")
                .unwrap();
            assert_eq!(
                store.get_artifact(&key, ArtifactKind::Source).unwrap().as_deref(),
                Some("Maria crossed the border.")
            );
        }
        assert!(temp.path().join("db/runs.sqlite").exists());
    }
}
