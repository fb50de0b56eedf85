//! Error types for the pipeline

use corefchain_domain::{ArtifactKind, ClusterId, MentionId, RunKey, Stage};
use thiserror::Error;

/// Errors that can occur while running a category pass
///
/// Per-unit failures (`CompletionExhausted`, `Extraction`,
/// `ClusterVerification`) are recorded in the stage artifact and never abort
/// a pass. The others are run-level and propagate.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Content cannot be split within the token budget
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// Every attempt of a completion call failed or was rejected
    #[error("Completion exhausted for {label} after {attempts} attempt(s): {last_error}")]
    CompletionExhausted {
        /// What the call was for (segment, cluster, ...)
        label: String,
        /// Attempts actually made
        attempts: usize,
        /// Last transport or validation error
        last_error: String,
        /// Last raw response received, if any
        last_raw: Option<String>,
    },

    /// Extraction of one segment failed
    #[error("Extraction error in segment {segment}: {message}")]
    Extraction {
        /// Segment index
        segment: usize,
        /// Failure description
        message: String,
    },

    /// Verification of one cluster failed on every pass
    #[error("Verification error for cluster {cluster}: {message}")]
    ClusterVerification {
        /// Cluster identifier
        cluster: ClusterId,
        /// Failure description
        message: String,
    },

    /// Two substituted mentions cover intersecting ranges
    #[error("Overlapping mentions {first} and {second}")]
    Overlap {
        /// Mention starting first
        first: MentionId,
        /// Mention intersecting it
        second: MentionId,
    },

    /// A mention is claimed by more than one confirmed cluster
    #[error("Mention {0} belongs to more than one confirmed cluster")]
    SharedMention(MentionId),

    /// A mention's span no longer holds the mention's text
    #[error("Mention {mention} expects '{expected}' but the document holds '{found}'")]
    SpanMismatch {
        /// Offending mention
        mention: MentionId,
        /// Text recorded at extraction
        expected: String,
        /// Text found at the span
        found: String,
    },

    /// A confirmed cluster references a mention that does not exist
    #[error("Unknown mention {0}")]
    UnknownMention(MentionId),

    /// A requested stage needs an earlier stage that is neither done nor requested
    #[error("Stage '{stage}' requires '{prerequisite}' to be completed or requested")]
    MissingPrerequisite {
        /// Requested stage
        stage: Stage,
        /// Missing prerequisite
        prerequisite: Stage,
    },

    /// A committed stage's artifact could not be found in the store
    #[error("Missing artifact {} for {key}", .kind.name())]
    MissingArtifact {
        /// Run the artifact belongs to
        key: RunKey,
        /// Artifact kind
        kind: ArtifactKind,
    },

    /// Run store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Artifact (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tokenizer could not be loaded or failed to encode
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}
