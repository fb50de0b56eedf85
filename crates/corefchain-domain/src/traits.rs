//! Trait definitions for external interactions
//!
//! These traits define the boundaries between domain logic and infrastructure.
//! Infrastructure implementations live in other crates.

use crate::{ArtifactHandle, ArtifactKind, RunKey, RunState};

/// Trait for persisting run state and stage artifacts
///
/// Implemented by the infrastructure layer (corefchain-store). Writing an
/// artifact that already exists replaces it; nothing is ever appended.
pub trait RunStore {
    /// Error type for store operations
    type Error;

    /// Load the state of a run, if any stage was ever committed
    fn load_state(&self, key: &RunKey) -> Result<Option<RunState>, Self::Error>;

    /// Persist the state of a run
    fn save_state(&mut self, state: &RunState) -> Result<(), Self::Error>;

    /// Write an artifact, replacing any previous version atomically
    fn put_artifact(
        &mut self,
        key: &RunKey,
        kind: ArtifactKind,
        body: &str,
    ) -> Result<ArtifactHandle, Self::Error>;

    /// Read an artifact
    fn get_artifact(&self, key: &RunKey, kind: ArtifactKind) -> Result<Option<String>, Self::Error>;

    /// List the keys of every run recorded for a document
    fn list_runs(&self, document_id: &str) -> Result<Vec<RunKey>, Self::Error>;
}
