//! Pipeline run state - stages, artifacts and resumability

use crate::EntityCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unique identifier for one invocation of the pipeline, based on UUIDv7
///
/// UUIDv7 sorts chronologically, so the most recent run touching a
/// (document, category) pair is the largest id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(uuid::Uuid);

impl RunId {
    /// Generate a new run id
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Split the document into segments
    Chunk,

    /// Extract mentions per segment
    Ner,

    /// Cluster and verify mentions
    Coref,

    /// Rewrite the document with canonical labels
    Resolve,
}

impl Stage {
    /// Every stage, in execution order
    pub const ALL: [Stage; 4] = [Stage::Chunk, Stage::Ner, Stage::Coref, Stage::Resolve];

    /// Get the stage name as used on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Chunk => "chunk",
            Stage::Ner => "ner",
            Stage::Coref => "coref",
            Stage::Resolve => "resolve",
        }
    }

    /// Parse a stage name
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "chunk" => Some(Stage::Chunk),
            "ner" => Some(Stage::Ner),
            "coref" => Some(Stage::Coref),
            "resolve" => Some(Stage::Resolve),
            _ => None,
        }
    }

    /// Stages whose artifacts this stage reads
    pub fn prerequisites(&self) -> &'static [Stage] {
        match self {
            Stage::Chunk => &[],
            Stage::Ner => &[Stage::Chunk],
            Stage::Coref => &[Stage::Chunk, Stage::Ner],
            Stage::Resolve => &[Stage::Chunk, Stage::Ner, Stage::Coref],
        }
    }

    /// Artifacts this stage commits
    pub fn produces(&self) -> &'static [ArtifactKind] {
        match self {
            Stage::Chunk => &[ArtifactKind::Source, ArtifactKind::Segments],
            Stage::Ner => &[ArtifactKind::Mentions],
            Stage::Coref => &[ArtifactKind::Clusters],
            Stage::Resolve => &[ArtifactKind::Rewritten],
        }
    }

    /// Status reached once this stage has committed
    pub fn status_after(&self) -> RunStatus {
        match self {
            Stage::Chunk => RunStatus::Chunked,
            Stage::Ner => RunStatus::Extracted,
            Stage::Coref => RunStatus::Verified,
            Stage::Resolve => RunStatus::Resolved,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one (document, category) pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Nothing committed yet
    Pending,
    /// Segments committed
    Chunked,
    /// Mentions committed
    Extracted,
    /// Clusters clustered and verified
    Verified,
    /// Rewritten document committed
    Resolved,
}

impl RunStatus {
    /// Get the status name
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Chunked => "chunked",
            RunStatus::Extracted => "extracted",
            RunStatus::Verified => "verified",
            RunStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of persisted stage artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Input text of the category pass
    Source,
    /// Chunker output
    Segments,
    /// Extraction output
    Mentions,
    /// Clustering and verification output
    Clusters,
    /// Rewritten document
    Rewritten,
}

impl ArtifactKind {
    /// Name of the artifact within its (document, category) namespace
    pub fn name(&self) -> &'static str {
        match self {
            ArtifactKind::Source => "source.txt",
            ArtifactKind::Segments => "segments.json",
            ArtifactKind::Mentions => "mentions.json",
            ArtifactKind::Clusters => "clusters.json",
            ArtifactKind::Rewritten => "rewritten.txt",
        }
    }
}

/// Key of a pipeline run: one document under one category
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunKey {
    /// Document identifier
    pub document_id: String,

    /// Category pass
    pub category: EntityCategory,
}

impl RunKey {
    /// Create a new run key
    pub fn new(document_id: impl Into<String>, category: EntityCategory) -> Self {
        Self {
            document_id: document_id.into(),
            category,
        }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.document_id, self.category)
    }
}

/// Where a committed artifact lives, as reported by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    /// Artifact kind
    pub kind: ArtifactKind,

    /// Store-specific location (file path, row key, ...)
    pub location: String,
}

/// Record of a committed stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Run that committed the stage
    pub run_id: RunId,

    /// Artifacts committed by the stage
    pub artifacts: Vec<ArtifactHandle>,

    /// Unix timestamp (seconds) of the commit
    pub committed_at: u64,

    /// Wall-clock duration of the stage in milliseconds
    pub elapsed_ms: u64,
}

/// Persistent state of one (document, category) pass
///
/// Updated only after a stage's artifacts are committed, so a crash leaves
/// the state at the last committed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Document and category
    pub key: RunKey,

    /// Highest committed stage
    pub status: RunStatus,

    /// Committed stages
    #[serde(default)]
    pub stages: BTreeMap<Stage, StageRecord>,

    /// Unix timestamp (seconds) of the last update
    pub updated_at: u64,
}

impl RunState {
    /// Fresh state with nothing committed
    pub fn new(key: RunKey, now: u64) -> Self {
        Self {
            key,
            status: RunStatus::Pending,
            stages: BTreeMap::new(),
            updated_at: now,
        }
    }

    /// Whether the stage's artifacts are committed and current
    pub fn is_complete(&self, stage: Stage) -> bool {
        self.stages.contains_key(&stage)
    }

    /// Record a committed stage
    ///
    /// Later stages were computed from the artifacts this commit replaced,
    /// so their records are dropped and the status falls back to this stage.
    pub fn commit(&mut self, stage: Stage, record: StageRecord, now: u64) {
        self.stages.retain(|s, _| *s < stage);
        self.stages.insert(stage, record);
        self.status = stage.status_after();
        self.updated_at = now;
    }

    /// Find the first requested stage whose prerequisite is neither committed
    /// nor requested earlier in the same run
    ///
    /// A committed prerequisite does not count when an earlier requested
    /// stage will invalidate it.
    pub fn missing_prerequisite(&self, requested: &[Stage]) -> Option<(Stage, Stage)> {
        let earliest = requested.iter().min().copied();
        let mut ordered = requested.to_vec();
        ordered.sort();
        ordered.dedup();

        for stage in &ordered {
            for prereq in stage.prerequisites() {
                let requested_too = ordered.contains(prereq);
                let still_valid =
                    self.is_complete(*prereq) && earliest.map_or(true, |e| e > *prereq);
                if !requested_too && !still_valid {
                    return Some((*stage, *prereq));
                }
            }
        }
        None
    }

    /// Handle of a committed artifact
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&ArtifactHandle> {
        self.stages
            .values()
            .flat_map(|r| r.artifacts.iter())
            .find(|h| h.kind == kind)
    }
}
