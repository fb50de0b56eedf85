//! Persisted stage artifacts
//!
//! `segments.json` is the serialized `Vec<Segment>`; `source.txt` and
//! `rewritten.txt` are plain text. The two richer artifacts are below.

use crate::coref::{CorefMemory, ProposalError};
use crate::extractor::SegmentExtraction;
use corefchain_domain::{
    CandidateCluster, ClusterDecision, ConfirmedCluster, EntityCategory, VerificationRecord,
};
use serde::{Deserialize, Serialize};

/// Output of the `ner` stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionsArtifact {
    /// Category the mentions were extracted for
    pub category: EntityCategory,

    /// One entry per segment, ordered by segment index
    pub extractions: Vec<SegmentExtraction>,
}

impl MentionsArtifact {
    /// Total number of mentions
    pub fn mention_count(&self) -> usize {
        self.extractions.iter().map(|e| e.mentions.len()).sum()
    }

    /// Number of segments whose extraction failed
    pub fn failed_segments(&self) -> usize {
        self.extractions.iter().filter(|e| e.is_failed()).count()
    }
}

/// Output of the `coref` stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClustersArtifact {
    /// Resolution memory after the last segment
    pub memory: CorefMemory,

    /// Segments whose proposal call failed
    #[serde(default)]
    pub proposal_errors: Vec<ProposalError>,

    /// Every candidate cluster
    pub candidates: Vec<CandidateCluster>,

    /// Verification history, one record per candidate
    pub verifications: Vec<VerificationRecord>,

    /// Clusters to substitute
    pub confirmed: Vec<ConfirmedCluster>,
}

impl ClustersArtifact {
    /// Mentions claimed by a confirmed cluster
    pub fn resolved_mentions(&self) -> usize {
        self.confirmed.iter().map(|c| c.members.len()).sum()
    }

    /// Mentions in clusters that were not sent to verification
    pub fn singleton_mentions(&self) -> usize {
        self.verifications
            .iter()
            .filter(|r| r.decision == ClusterDecision::Skipped)
            .filter_map(|r| self.candidates.iter().find(|c| c.id == r.cluster))
            .map(|c| c.members.len())
            .sum()
    }

    /// Number of clusters with a decision matching `f`
    pub fn count_decisions(&self, f: impl Fn(&ClusterDecision) -> bool) -> usize {
        self.verifications.iter().filter(|r| f(&r.decision)).count()
    }
}
