//! Per-category and chain run reports

use crate::artifact::{ClustersArtifact, MentionsArtifact};
use corefchain_domain::{ClusterDecision, RunKey, RunStatus, Segment, Stage};
use serde::Serialize;

/// Time spent in one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTiming {
    /// Stage that ran
    pub stage: Stage,

    /// Wall-clock duration in milliseconds
    pub elapsed_ms: u64,
}

/// Outcome of one category pass
///
/// Counts come from the committed artifacts, so a resumed run reports on
/// the whole pass and not just the stages it executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryReport {
    /// Document and category
    pub key: RunKey,

    /// Status after the run
    pub status: RunStatus,

    /// Segments produced by chunking
    pub segments: usize,

    /// Segments whose extraction failed
    pub failed_segments: usize,

    /// Mentions extracted
    pub mentions: usize,

    /// Mentions substituted by a confirmed cluster
    pub resolved: usize,

    /// Mentions left with their surface text after verification
    pub unresolved: usize,

    /// Mentions in trivial singletons that were not verified
    pub singleton: usize,

    /// Candidate clusters proposed
    pub candidates: usize,

    /// Clusters confirmed
    pub confirmed: usize,

    /// Clusters rejected
    pub rejected: usize,

    /// Clusters whose every pass failed
    pub failed_clusters: usize,

    /// Stages executed in this run
    pub timings: Vec<StageTiming>,

    /// Total time of this run in milliseconds
    pub total_ms: u64,
}

impl CategoryReport {
    /// Empty report for a run
    pub fn new(key: RunKey, status: RunStatus) -> Self {
        Self {
            key,
            status,
            segments: 0,
            failed_segments: 0,
            mentions: 0,
            resolved: 0,
            unresolved: 0,
            singleton: 0,
            candidates: 0,
            confirmed: 0,
            rejected: 0,
            failed_clusters: 0,
            timings: Vec::new(),
            total_ms: 0,
        }
    }

    /// Count segments
    pub fn record_segments(&mut self, segments: &[Segment]) {
        self.segments = segments.len();
    }

    /// Count mentions and failed segments
    pub fn record_mentions(&mut self, mentions: &MentionsArtifact) {
        self.mentions = mentions.mention_count();
        self.failed_segments = mentions.failed_segments();
    }

    /// Count cluster decisions
    pub fn record_clusters(&mut self, clusters: &ClustersArtifact) {
        self.candidates = clusters.candidates.len();
        self.confirmed = clusters.confirmed.len();
        self.rejected = clusters.count_decisions(|d| matches!(d, ClusterDecision::Rejected));
        self.failed_clusters =
            clusters.count_decisions(|d| matches!(d, ClusterDecision::Failed { .. }));
        self.singleton = clusters.singleton_mentions();
    }

    /// Count mentions the rewrite substituted and those it left alone
    ///
    /// Only meaningful once the resolve stage has committed; before that
    /// nothing has been substituted.
    pub fn record_resolution(&mut self, clusters: &ClustersArtifact) {
        self.resolved = clusters.resolved_mentions();
        self.unresolved = self.mentions.saturating_sub(self.resolved + self.singleton);
    }
}

/// Outcome of a category chain over one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    /// Document identifier
    pub document_id: String,

    /// One report per category, in chain order
    pub categories: Vec<CategoryReport>,

    /// Rewritten text after the last category
    #[serde(skip)]
    pub output: String,
}

impl ChainReport {
    /// Total resolved mentions across the chain
    pub fn resolved(&self) -> usize {
        self.categories.iter().map(|c| c.resolved).sum()
    }

    /// Total unresolved mentions across the chain
    pub fn unresolved(&self) -> usize {
        self.categories.iter().map(|c| c.unresolved).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::SegmentExtraction;
    use corefchain_domain::{
        CandidateCluster, ClusterId, ConfirmedCluster, EntityCategory, Mention, MentionId,
        MentionKind, VerificationRecord,
    };

    fn mention(ordinal: usize) -> Mention {
        Mention {
            id: MentionId::new(0, ordinal),
            start: 0,
            end: 1,
            text: "x".to_string(),
            category: EntityCategory::Person,
            kind: MentionKind::ProperNoun,
            description: None,
        }
    }

    #[test]
    fn test_counts_from_artifacts() {
        let key = RunKey::new("doc", EntityCategory::Person);
        let mut report = CategoryReport::new(key, RunStatus::Verified);

        let mentions = MentionsArtifact {
            category: EntityCategory::Person,
            extractions: vec![
                SegmentExtraction {
                    segment: 0,
                    mentions: (0..5).map(mention).collect(),
                    descriptions: Default::default(),
                    raw_response: None,
                    attempts: 1,
                    error: None,
                },
                SegmentExtraction {
                    segment: 1,
                    mentions: vec![],
                    descriptions: Default::default(),
                    raw_response: None,
                    attempts: 3,
                    error: Some("exhausted".to_string()),
                },
            ],
        };
        let candidate = |id: usize, members: &[usize]| CandidateCluster {
            id: ClusterId(id),
            members: members.iter().map(|&o| MentionId::new(0, o)).collect(),
            surfaces: vec!["x".to_string()],
            proposed_labels: vec![],
        };
        let record = |id: usize, decision| VerificationRecord {
            cluster: ClusterId(id),
            passes: vec![],
            decision,
        };
        let clusters = ClustersArtifact {
            candidates: vec![candidate(0, &[0, 1]), candidate(1, &[2]), candidate(2, &[3, 4])],
            verifications: vec![
                record(0, ClusterDecision::Confirmed { label: "X".to_string() }),
                record(1, ClusterDecision::Skipped),
                record(2, ClusterDecision::Rejected),
            ],
            confirmed: vec![ConfirmedCluster {
                id: ClusterId(0),
                members: vec![MentionId::new(0, 0), MentionId::new(0, 1)],
                label: "X".to_string(),
            }],
            ..Default::default()
        };

        report.record_mentions(&mentions);
        report.record_clusters(&clusters);

        // Verified but not yet rewritten
        assert_eq!(report.resolved, 0);
        assert_eq!(report.unresolved, 0);
        assert_eq!(report.singleton, 1);

        report.record_resolution(&clusters);

        assert_eq!(report.mentions, 5);
        assert_eq!(report.failed_segments, 1);
        assert_eq!(report.resolved, 2);
        assert_eq!(report.singleton, 1);
        assert_eq!(report.unresolved, 2);
        assert_eq!(report.confirmed, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.failed_clusters, 0);
    }
}
