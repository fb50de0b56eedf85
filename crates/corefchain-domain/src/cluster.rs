//! Candidate and confirmed coreference clusters

use crate::MentionId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Identifier of a candidate cluster within one category pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterId(pub usize);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// A hypothesized group of co-referent mentions, pending verification
///
/// Members are referenced by id; the mentions themselves live in the
/// extraction artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCluster {
    /// Cluster identifier
    pub id: ClusterId,

    /// Member mentions, ordered by (segment, ordinal)
    pub members: Vec<MentionId>,

    /// Distinct surface forms of the members, in first-seen order
    pub surfaces: Vec<String>,

    /// Canonical forms proposed for any member during clustering
    #[serde(default)]
    pub proposed_labels: Vec<String>,
}

impl CandidateCluster {
    /// Number of member mentions
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the cluster has no members (never true for clusterer output)
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// A singleton whose only surface form is also its only proposal
    /// needs no verification: rewriting it would be a no-op.
    pub fn is_trivial(&self) -> bool {
        self.members.len() == 1
            && self
                .proposed_labels
                .iter()
                .all(|label| self.surfaces.iter().any(|s| s == label))
    }

    /// Longest surface form (first one wins on equal length)
    pub fn longest_surface(&self) -> Option<&str> {
        self.surfaces
            .iter()
            .fold(None::<&String>, |best, s| match best {
                Some(b) if b.chars().count() >= s.chars().count() => Some(b),
                _ => Some(s),
            })
            .map(String::as_str)
    }
}

/// Result of a single verification pass over one cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PassOutcome {
    /// The pass produced a validated answer
    Verdict {
        /// Whether the mentions denote the same entity
        same_entity: bool,

        /// Canonical label proposed by an affirmative pass
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },

    /// Retries were exhausted without a valid answer
    Failed {
        /// Last error seen
        error: String,
    },
}

impl PassOutcome {
    /// Label of an affirmative verdict
    pub fn affirmative_label(&self) -> Option<&str> {
        match self {
            PassOutcome::Verdict {
                same_entity: true,
                label: Some(label),
            } => Some(label.as_str()),
            _ => None,
        }
    }
}

/// Final decision for a candidate cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ClusterDecision {
    /// Accepted with a canonical label
    Confirmed {
        /// Label substituted for every member
        label: String,
    },

    /// A majority of passes did not confirm the cluster
    Rejected,

    /// Every pass exhausted its retries
    Failed {
        /// Last error seen
        error: String,
    },

    /// Trivial singleton, not sent to verification
    Skipped,
}

/// Verification history of one candidate cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// Cluster that was verified
    pub cluster: ClusterId,

    /// Outcome of every pass, in pass order
    pub passes: Vec<PassOutcome>,

    /// Aggregated decision
    pub decision: ClusterDecision,
}

/// A verified group of co-referent mentions sharing one canonical label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedCluster {
    /// Candidate cluster this was confirmed from
    pub id: ClusterId,

    /// Member mentions
    pub members: Vec<MentionId>,

    /// Canonical label replacing every member
    pub label: String,
}

/// Check that no mention belongs to two confirmed clusters
///
/// Returns the first mention found in more than one cluster.
pub fn find_shared_member(clusters: &[ConfirmedCluster]) -> Option<MentionId> {
    let mut seen = HashSet::new();
    clusters
        .iter()
        .flat_map(|c| c.members.iter())
        .find(|id| !seen.insert(**id))
        .copied()
}
