//! Filesystem-backed run store

use crate::StoreError;
use corefchain_domain::traits::RunStore;
use corefchain_domain::{ArtifactHandle, ArtifactKind, EntityCategory, RunKey, RunState};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const STATE_FILE: &str = "state.json";

/// Directory-based implementation of RunStore
///
/// Layout: `<root>/<document>/<category>/{state.json, source.txt, segments.json, ...}`.
/// Files are written to a sibling temp file and renamed into place.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one run's files
    pub fn run_dir(&self, key: &RunKey) -> PathBuf {
        self.document_dir(&key.document_id).join(key.category.as_str())
    }

    fn document_dir(&self, document_id: &str) -> PathBuf {
        self.root.join(sanitize(document_id))
    }

    fn write_atomic(path: &Path, body: &str) -> Result<(), StoreError> {
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::InvalidData(format!("No parent for {}", path.display())))?;
        fs::create_dir_all(parent)?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::InvalidData(format!("Bad file name {}", path.display())))?;
        let tmp = parent.join(format!(".{}.tmp", file_name));

        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(body.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        debug!("Committed {}", path.display());
        Ok(())
    }

    fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(path) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Make a document id safe to use as a single path component
fn sanitize(document_id: &str) -> String {
    let cleaned: String = document_id
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        format!("_{}", cleaned)
    } else {
        cleaned
    }
}

impl RunStore for FsStore {
    type Error = StoreError;

    fn load_state(&self, key: &RunKey) -> Result<Option<RunState>, Self::Error> {
        match Self::read_optional(&self.run_dir(key).join(STATE_FILE))? {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn save_state(&mut self, state: &RunState) -> Result<(), Self::Error> {
        let body = serde_json::to_string_pretty(state)?;
        Self::write_atomic(&self.run_dir(&state.key).join(STATE_FILE), &body)
    }

    fn put_artifact(
        &mut self,
        key: &RunKey,
        kind: ArtifactKind,
        body: &str,
    ) -> Result<ArtifactHandle, Self::Error> {
        let path = self.run_dir(key).join(kind.name());
        Self::write_atomic(&path, body)?;
        Ok(ArtifactHandle {
            kind,
            location: path.display().to_string(),
        })
    }

    fn get_artifact(&self, key: &RunKey, kind: ArtifactKind) -> Result<Option<String>, Self::Error> {
        Self::read_optional(&self.run_dir(key).join(kind.name()))
    }

    fn list_runs(&self, document_id: &str) -> Result<Vec<RunKey>, Self::Error> {
        let dir = self.document_dir(document_id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.path().join(STATE_FILE).is_file() {
                continue;
            }
            if let Some(category) = entry.file_name().to_str().and_then(EntityCategory::parse) {
                keys.push(RunKey::new(document_id, category));
            }
        }
        keys.sort();
        Ok(keys)
    }
}
