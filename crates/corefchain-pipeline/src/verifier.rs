//! Majority-vote verification of candidate clusters

use crate::error::PipelineError;
use crate::extractor::SegmentExtraction;
use crate::parser::parse_verdict;
use crate::prompt::verification_payload;
use crate::retry::RetryPolicy;
use corefchain_domain::{
    CandidateCluster, ClusterDecision, ConfirmedCluster, Mention, MentionId, PassOutcome, Segment,
    VerificationRecord,
};
use corefchain_llm::{CompletionProvider, CompletionRequest};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bytes of text shown on each side of a mention in its context
const CONTEXT_RADIUS: usize = 80;

/// Members of a cluster quoted in context
const MAX_CONTEXTS: usize = 10;

/// Decisions for every candidate of a category pass
#[derive(Debug, Clone, Default)]
pub struct VerificationOutcome {
    /// One record per candidate, ordered by cluster id
    pub records: Vec<VerificationRecord>,

    /// Clusters that were confirmed, ordered by cluster id
    pub confirmed: Vec<ConfirmedCluster>,
}

/// Confirms or rejects candidate clusters with repeated independent passes
pub struct ClusterVerifier<P> {
    provider: Arc<P>,
    model: String,
    template: String,
    policy: RetryPolicy,
    passes: usize,
    verify_singletons: bool,
    concurrency: usize,
}

impl<P: CompletionProvider> ClusterVerifier<P> {
    /// Create a verifier running `passes` passes per cluster
    pub fn new(
        provider: Arc<P>,
        model: impl Into<String>,
        template: impl Into<String>,
        policy: RetryPolicy,
        passes: usize,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            template: template.into(),
            policy,
            passes,
            verify_singletons: false,
            concurrency: 1,
        }
    }

    /// Send trivial singletons to verification too
    pub fn with_singletons(mut self, verify: bool) -> Self {
        self.verify_singletons = verify;
        self
    }

    /// Number of clusters verified at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Verify every candidate
    pub async fn verify_all(
        &self,
        candidates: &[CandidateCluster],
        extractions: &[SegmentExtraction],
        segments: &[Segment],
    ) -> VerificationOutcome {
        let mentions: HashMap<MentionId, &Mention> = extractions
            .iter()
            .flat_map(|e| &e.mentions)
            .map(|m| (m.id, m))
            .collect();

        let mut records: Vec<VerificationRecord> = stream::iter(candidates)
            .map(|cluster| {
                let contexts = contexts_for(cluster, &mentions, segments);
                async move { self.verify(cluster, &contexts).await }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        records.sort_by_key(|r| r.cluster);

        let by_id: HashMap<_, _> = candidates.iter().map(|c| (c.id, c)).collect();
        let confirmed: Vec<ConfirmedCluster> = records
            .iter()
            .filter_map(|record| match &record.decision {
                ClusterDecision::Confirmed { label } => by_id.get(&record.cluster).map(|c| ConfirmedCluster {
                    id: c.id,
                    members: c.members.clone(),
                    label: label.clone(),
                }),
                _ => None,
            })
            .collect();

        let count = |f: fn(&ClusterDecision) -> bool| records.iter().filter(|r| f(&r.decision)).count();
        info!(
            "Verified {} cluster(s): {} confirmed, {} rejected, {} failed, {} skipped",
            records.len(),
            confirmed.len(),
            count(|d| matches!(d, ClusterDecision::Rejected)),
            count(|d| matches!(d, ClusterDecision::Failed { .. })),
            count(|d| matches!(d, ClusterDecision::Skipped)),
        );

        VerificationOutcome { records, confirmed }
    }

    /// Verify one cluster given the contexts of its members
    pub async fn verify(&self, cluster: &CandidateCluster, contexts: &[String]) -> VerificationRecord {
        let record = |passes, decision| VerificationRecord {
            cluster: cluster.id,
            passes,
            decision,
        };

        if cluster.is_trivial() && !self.verify_singletons {
            return record(Vec::new(), ClusterDecision::Skipped);
        }
        if self.passes == 0 {
            let label = fallback_label(cluster).unwrap_or_default();
            return record(Vec::new(), ClusterDecision::Confirmed { label });
        }

        let mut passes = Vec::with_capacity(self.passes);
        for pass in 1..=self.passes {
            let outcome = match self.run_pass(cluster, contexts, pass).await {
                Ok(verdict) => verdict,
                Err(e) => PassOutcome::Failed {
                    error: e.to_string(),
                },
            };
            debug!("Cluster {} pass {}: {:?}", cluster.id, pass, outcome);
            passes.push(outcome);
        }

        let decision = match decide(&passes) {
            ClusterDecision::Failed { error } => {
                let error = PipelineError::ClusterVerification {
                    cluster: cluster.id,
                    message: error,
                };
                warn!("{}", error);
                ClusterDecision::Failed {
                    error: error.to_string(),
                }
            }
            decision => decision,
        };
        debug!("Cluster {} {:?}", cluster.id, decision);
        record(passes, decision)
    }

    async fn run_pass(
        &self,
        cluster: &CandidateCluster,
        contexts: &[String],
        pass: usize,
    ) -> Result<PassOutcome, PipelineError> {
        let input = verification_payload(cluster, contexts, pass)?;
        let label = format!("verification of cluster {} pass {}", cluster.id, pass);

        let accepted = self
            .policy
            .run(
                &label,
                |_, deadline| {
                    let request = CompletionRequest::new(&self.model, &self.template, &input)
                        .with_timeout(deadline);
                    let provider = Arc::clone(&self.provider);
                    async move { provider.complete(&request).await }
                },
                parse_verdict,
            )
            .await?;

        Ok(PassOutcome::Verdict {
            same_entity: accepted.value.same_entity,
            label: accepted.value.label,
        })
    }
}

/// Aggregate pass outcomes into a decision
///
/// A cluster is confirmed when strictly more than half of all passes
/// (failed ones included) affirm it. Every pass failing is a failure of
/// the cluster rather than a rejection.
pub fn decide(passes: &[PassOutcome]) -> ClusterDecision {
    if let Some(PassOutcome::Failed { error }) = passes.last() {
        if passes.iter().all(|p| matches!(p, PassOutcome::Failed { .. })) {
            return ClusterDecision::Failed {
                error: error.clone(),
            };
        }
    }

    let affirmative: Vec<&str> = passes.iter().filter_map(PassOutcome::affirmative_label).collect();
    if affirmative.len() * 2 > passes.len() {
        if let Some(label) = most_frequent(&affirmative) {
            return ClusterDecision::Confirmed {
                label: label.to_string(),
            };
        }
    }
    ClusterDecision::Rejected
}

/// Most frequent label, then the longer one, then the earliest seen
fn most_frequent<'a>(labels: &[&'a str]) -> Option<&'a str> {
    let mut counts: Vec<(&'a str, usize)> = Vec::new();
    for &label in labels {
        match counts.iter().position(|(l, _)| *l == label) {
            Some(i) => counts[i].1 += 1,
            None => counts.push((label, 1)),
        }
    }
    counts
        .into_iter()
        .enumerate()
        .max_by(|(ia, (la, na)), (ib, (lb, nb))| {
            na.cmp(nb)
                .then(la.chars().count().cmp(&lb.chars().count()))
                .then(ib.cmp(ia))
        })
        .map(|(_, (label, _))| label)
}

/// Label used when no verification pass is run
fn fallback_label(cluster: &CandidateCluster) -> Option<String> {
    let proposed: Vec<&str> = cluster.proposed_labels.iter().map(String::as_str).collect();
    most_frequent(&proposed)
        .or_else(|| cluster.longest_surface())
        .map(str::to_string)
}

/// Quoted text around up to [`MAX_CONTEXTS`] members, the mention in brackets
fn contexts_for(
    cluster: &CandidateCluster,
    mentions: &HashMap<MentionId, &Mention>,
    segments: &[Segment],
) -> Vec<String> {
    cluster
        .members
        .iter()
        .filter_map(|id| {
            let mention = mentions.get(id)?;
            let segment = segments.iter().find(|s| s.index == id.segment)?;
            Some(context_window(&segment.text, mention.start, mention.end))
        })
        .take(MAX_CONTEXTS)
        .collect()
}

fn context_window(text: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(CONTEXT_RADIUS);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + CONTEXT_RADIUS).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }

    let flatten = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
    format!(
        "...{} [{}] {}...",
        flatten(&text[from..start]),
        &text[start..end],
        flatten(&text[end..to])
    )
}
