//! Candidate cluster proposal
//!
//! Clustering combines two signals. Segments are walked in order and the
//! model proposes a canonical form for each mention, carrying a running
//! memory of earlier resolutions. Independently, surface forms are grouped
//! lexically: equal after normalisation, or one a name-shaped abbreviation
//! of the other ("Maria L." and "Maria Lopez"). Both feed one union-find;
//! every mention ends up in exactly one candidate cluster.

use crate::error::PipelineError;
use crate::extractor::SegmentExtraction;
use crate::parser::{parse_proposal, CorefProposal};
use crate::prompt::proposal_payload;
use crate::retry::RetryPolicy;
use corefchain_domain::{CandidateCluster, ClusterId, Mention, MentionKind, Segment};
use corefchain_llm::{CompletionProvider, CompletionRequest};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

const ARTICLES: [&str; 3] = ["the", "a", "an"];

/// Resolutions carried from one segment's proposal to the next
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorefMemory {
    /// Surface form → canonical form
    #[serde(rename = "RESOLVED_ENTITIES")]
    pub resolved_entities: BTreeMap<String, String>,

    /// Canonical form → what is known about it
    #[serde(rename = "AUXILIARY_DESCRIPTIONS")]
    pub auxiliary_descriptions: BTreeMap<String, String>,
}

impl CorefMemory {
    /// Canonical form proposed for a surface, if any
    pub fn canonical(&self, surface: &str) -> Option<&str> {
        self.resolved_entities.get(surface).map(String::as_str)
    }

    /// Merge a proposal; unresolved surfaces keep any earlier mapping
    pub fn absorb(&mut self, proposal: CorefProposal) {
        for (surface, canonical) in proposal.resolved {
            if let Some(canonical) = canonical {
                self.resolved_entities.insert(surface, canonical);
            }
        }
        self.auxiliary_descriptions.extend(proposal.descriptions);
    }
}

/// A segment whose proposal call failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalError {
    /// Segment index
    pub segment: usize,

    /// Failure description
    pub error: String,
}

/// Output of clustering one category pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clustering {
    /// Candidate clusters, ordered by first member
    pub candidates: Vec<CandidateCluster>,

    /// Memory after the last segment
    pub memory: CorefMemory,

    /// Segments whose proposal could not be obtained
    pub proposal_errors: Vec<ProposalError>,
}

/// Groups the mentions of a category pass into candidate clusters
pub struct CorefClusterer<P> {
    provider: Arc<P>,
    model: String,
    template: String,
    policy: RetryPolicy,
    propose_with_llm: bool,
}

impl<P: CompletionProvider> CorefClusterer<P> {
    /// Create a new clusterer
    pub fn new(
        provider: Arc<P>,
        model: impl Into<String>,
        template: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            template: template.into(),
            policy,
            propose_with_llm: true,
        }
    }

    /// Ask the model for canonical forms (lexical grouping alone otherwise)
    pub fn with_proposals(mut self, enabled: bool) -> Self {
        self.propose_with_llm = enabled;
        self
    }

    /// Cluster every mention of the given extractions
    pub async fn cluster(&self, segments: &[Segment], extractions: &[SegmentExtraction]) -> Clustering {
        let mut clustering = Clustering::default();

        if self.propose_with_llm {
            for extraction in extractions.iter().filter(|e| !e.mentions.is_empty()) {
                let Some(segment) = segments.iter().find(|s| s.index == extraction.segment) else {
                    warn!("No segment {} for its extraction", extraction.segment);
                    continue;
                };
                match self.propose(&clustering.memory, segment, extraction).await {
                    Ok(proposal) => clustering.memory.absorb(proposal),
                    Err(e) => {
                        warn!("Coreference proposal for segment {} failed: {}", segment.index, e);
                        clustering.proposal_errors.push(ProposalError {
                            segment: segment.index,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        let mentions: Vec<&Mention> = extractions.iter().flat_map(|e| &e.mentions).collect();
        clustering.candidates = group(&mentions, &clustering.memory);

        info!(
            "Proposed {} candidate cluster(s) over {} mention(s), {} proposal failure(s)",
            clustering.candidates.len(),
            mentions.len(),
            clustering.proposal_errors.len()
        );
        clustering
    }

    async fn propose(
        &self,
        memory: &CorefMemory,
        segment: &Segment,
        extraction: &SegmentExtraction,
    ) -> Result<CorefProposal, PipelineError> {
        let mentions: Vec<&Mention> = extraction.mentions.iter().collect();
        let input = proposal_payload(memory, &mentions, &extraction.descriptions, &segment.text)?;
        let label = format!("coreference proposal for segment {}", segment.index);

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
                parse_proposal,
            )
            .await?;

        debug!(
            "{}: {} mapping(s) after {} attempt(s)",
            label,
            accepted.value.resolved.len(),
            accepted.attempts
        );
        Ok(accepted.value)
    }
}

/// A distinct surface form and the mentions carrying it
struct SurfaceNode {
    text: String,
    tokens: Vec<String>,
    proper: bool,
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Keep the earlier surface as root so ordering stays stable
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[child] = root;
        }
    }
}

/// Partition mentions into candidate clusters
fn group(mentions: &[&Mention], memory: &CorefMemory) -> Vec<CandidateCluster> {
    let mut nodes: Vec<SurfaceNode> = Vec::new();
    let mut node_of: HashMap<&str, usize> = HashMap::new();
    let mut mention_nodes = Vec::with_capacity(mentions.len());

    for mention in mentions {
        let index = *node_of.entry(mention.text.as_str()).or_insert_with(|| {
            nodes.push(SurfaceNode {
                text: mention.text.clone(),
                tokens: normalized_tokens(&mention.text),
                proper: false,
            });
            nodes.len() - 1
        });
        nodes[index].proper |= mention.kind == MentionKind::ProperNoun;
        mention_nodes.push(index);
    }

    let mut sets = DisjointSet::new(nodes.len());

    for i in 0..nodes.len() {
        for j in i + 1..nodes.len() {
            let (a, b) = (&nodes[i], &nodes[j]);
            let related = if a.proper && b.proper {
                names_related(&a.tokens, &b.tokens)
            } else {
                !a.tokens.is_empty() && a.tokens == b.tokens
            };
            if related {
                sets.union(i, j);
            }
        }
    }

    let mut first_with_canonical: HashMap<&str, usize> = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
        let Some(canonical) = memory.canonical(&node.text) else {
            continue;
        };
        if let Some(&other) = node_of.get(canonical) {
            sets.union(index, other);
        }
        match first_with_canonical.get(canonical) {
            Some(&other) => sets.union(index, other),
            None => {
                first_with_canonical.insert(canonical, index);
            }
        }
    }

    let mut order: Vec<usize> = Vec::new();
    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    for (m, &node) in mention_nodes.iter().enumerate() {
        let root = sets.find(node);
        members
            .entry(root)
            .or_insert_with(|| {
                order.push(root);
                Vec::new()
            })
            .push(m);
    }

    let mut clusters: Vec<CandidateCluster> = order
        .into_iter()
        .filter_map(|root| members.remove(&root))
        .map(|mut indices| {
            indices.sort_by_key(|&m| mentions[m].id);
            let mut surfaces: Vec<String> = Vec::new();
            let mut proposed_labels = Vec::new();
            for &m in &indices {
                let text = &mentions[m].text;
                if !surfaces.contains(text) {
                    surfaces.push(text.clone());
                }
                if let Some(canonical) = memory.canonical(text) {
                    proposed_labels.push(canonical.to_string());
                }
            }
            CandidateCluster {
                id: ClusterId(0),
                members: indices.iter().map(|&m| mentions[m].id).collect(),
                surfaces,
                proposed_labels,
            }
        })
        .collect();

    clusters.sort_by_key(|c| c.members.first().copied());
    for (position, cluster) in clusters.iter_mut().enumerate() {
        cluster.id = ClusterId(position);
    }
    clusters
}

/// Lowercased alphanumeric tokens with leading articles dropped
fn normalized_tokens(surface: &str) -> Vec<String> {
    let tokens: Vec<String> = surface
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect();
    let skip = tokens
        .iter()
        .take_while(|t| ARTICLES.contains(&t.as_str()))
        .count();
    tokens[skip..].to_vec()
}

/// Whether the shorter name is an in-order abbreviation of the longer
///
/// Each token of the shorter name must match a later token of the longer one,
/// either fully or as an initial, with at least one full match.
fn names_related(a: &[String], b: &[String]) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return false;
    }

    let mut full_match = false;
    let mut remaining = long.iter();
    for token in short {
        loop {
            let Some(candidate) = remaining.next() else {
                return false;
            };
            if token == candidate {
                full_match = true;
                break;
            }
            if is_initial_of(token, candidate) || is_initial_of(candidate, token) {
                break;
            }
        }
    }
    full_match
}

fn is_initial_of(initial: &str, word: &str) -> bool {
    let mut chars = initial.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => word.starts_with(c) && word.chars().count() > 1,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corefchain_domain::{EntityCategory, MentionId};
    use corefchain_llm::{MockProvider, MockReply};
    use std::time::Duration;

    fn mention(segment: usize, ordinal: usize, text: &str, kind: MentionKind) -> Mention {
        Mention {
            id: MentionId::new(segment, ordinal),
            start: 0,
            end: text.len(),
            text: text.to_string(),
            category: EntityCategory::Person,
            kind,
            description: None,
        }
    }

    fn proper(segment: usize, ordinal: usize, text: &str) -> Mention {
        mention(segment, ordinal, text, MentionKind::ProperNoun)
    }

    fn extraction(segment: usize, mentions: Vec<Mention>) -> SegmentExtraction {
        SegmentExtraction {
            segment,
            mentions,
            descriptions: BTreeMap::new(),
            raw_response: None,
            attempts: 1,
            error: None,
        }
    }

    fn segments(texts: &[&str]) -> Vec<Segment> {
        let mut start = 0;
        texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let segment = Segment {
                    index,
                    start,
                    end: start + text.len(),
                    text: text.to_string(),
                    size: text.split_whitespace().count(),
                };
                start += text.len();
                segment
            })
            .collect()
    }

    fn clusterer(provider: MockProvider) -> CorefClusterer<MockProvider> {
        let policy = RetryPolicy::new(2).with_backoff(Duration::ZERO, Duration::ZERO);
        CorefClusterer::new(Arc::new(provider), "test-model", "Resolve PERSON.", policy)
    }

    fn tokens(s: &str) -> Vec<String> {
        normalized_tokens(s)
    }

    #[test]
    fn test_normalized_tokens_drop_articles() {
        assert_eq!(tokens("The Driver's car"), vec!["driver", "s", "car"]);
        assert_eq!(tokens("Maria L."), vec!["maria", "l"]);
        assert!(tokens("the").is_empty());
    }

    #[test]
    fn test_names_related() {
        assert!(names_related(&tokens("Maria L."), &tokens("Maria Lopez")));
        assert!(names_related(&tokens("Maria"), &tokens("Maria Elena Lopez")));
        assert!(names_related(&tokens("Maria Lopez"), &tokens("Maria Elena Lopez")));
        assert!(!names_related(&tokens("Mariana"), &tokens("Maria Lopez")));
        assert!(!names_related(&tokens("M. L."), &tokens("Maria Lopez")));
        assert!(!names_related(&tokens("Lopez Maria"), &tokens("Maria Lopez")));
    }

    #[test]
    fn test_group_lexical_and_singletons() {
        let mentions = [
            proper(0, 0, "Maria Lopez"),
            proper(0, 1, "Jose Ruiz"),
            proper(1, 0, "Maria L."),
            mention(1, 1, "the driver", MentionKind::NounPhrase),
            proper(2, 0, "Maria"),
            mention(2, 1, "The driver", MentionKind::NounPhrase),
        ];
        let refs: Vec<&Mention> = mentions.iter().collect();
        let clusters = group(&refs, &CorefMemory::default());

        assert_eq!(clusters.len(), 3);
        assert_eq!(clusters[0].id, ClusterId(0));
        assert_eq!(
            clusters[0].members,
            vec![MentionId::new(0, 0), MentionId::new(1, 0), MentionId::new(2, 0)]
        );
        assert_eq!(clusters[0].surfaces, vec!["Maria Lopez", "Maria L.", "Maria"]);
        assert_eq!(clusters[1].members, vec![MentionId::new(0, 1)]);
        assert_eq!(clusters[2].surfaces, vec!["the driver", "The driver"]);
        assert!(clusters[1].is_trivial());
    }

    #[test]
    fn test_group_follows_proposals() {
        let mentions = [
            proper(0, 0, "Jose Ruiz"),
            mention(0, 1, "the driver", MentionKind::NounPhrase),
            mention(1, 0, "her brother", MentionKind::NounPhrase),
        ];
        let mut memory = CorefMemory::default();
        memory
            .resolved_entities
            .insert("the driver".to_string(), "Jose Ruiz".to_string());
        memory
            .resolved_entities
            .insert("her brother".to_string(), "Pedro Lopez".to_string());

        let refs: Vec<&Mention> = mentions.iter().collect();
        let clusters = group(&refs, &memory);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].surfaces, vec!["Jose Ruiz", "the driver"]);
        assert_eq!(clusters[0].proposed_labels, vec!["Jose Ruiz"]);
        assert_eq!(clusters[1].proposed_labels, vec!["Pedro Lopez"]);
        assert!(!clusters[1].is_trivial());
    }

    #[test]
    fn test_every_mention_in_exactly_one_cluster() {
        let mentions = [
            proper(0, 0, "Ana"),
            proper(0, 1, "Ana Diaz"),
            proper(1, 0, "Luis"),
            proper(1, 1, "Ana"),
        ];
        let refs: Vec<&Mention> = mentions.iter().collect();
        let clusters = group(&refs, &CorefMemory::default());

        let mut seen: Vec<MentionId> = clusters.iter().flat_map(|c| c.members.clone()).collect();
        seen.sort();
        let mut expected: Vec<MentionId> = mentions.iter().map(|m| m.id).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_memory_carried_between_segments() {
        let mut provider = MockProvider::default();
        provider.queue_replies(
            "CHUNK_TEXT",
            [
                MockReply::text(
                    r#"{"RESOLVED_ENTITIES": {"Maria Lopez": "Maria Lopez"}, "AUXILIARY_DESCRIPTIONS": {"Maria Lopez": "Crossed the border"}}"#,
                ),
                MockReply::text(
                    r#"{"RESOLVED_ENTITIES": {"Maria Lopez": "Maria Lopez", "she": null}, "AUXILIARY_DESCRIPTIONS": {}}"#,
                ),
            ],
        );

        let segments = segments(&["Maria Lopez crossed. ", "Later she called."]);
        let extractions = vec![
            extraction(0, vec![proper(0, 0, "Maria Lopez")]),
            extraction(1, vec![mention(1, 0, "she", MentionKind::NounPhrase)]),
        ];
        let clustering = clusterer(provider.clone()).cluster(&segments, &extractions).await;

        assert!(clustering.proposal_errors.is_empty());
        assert_eq!(clustering.memory.canonical("Maria Lopez"), Some("Maria Lopez"));
        assert_eq!(clustering.memory.canonical("she"), None);
        assert_eq!(
            clustering.memory.auxiliary_descriptions.get("Maria Lopez").map(String::as_str),
            Some("Crossed the border")
        );
        // The second call sees the first segment's resolutions
        assert!(provider.prompts()[1].contains("Crossed the border"));
        assert_eq!(clustering.candidates.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_proposal_recorded_and_lexical_grouping_kept() {
        let provider = MockProvider::new("not json");
        let segments = segments(&["Maria Lopez crossed. ", "Maria L. called."]);
        let extractions = vec![
            extraction(0, vec![proper(0, 0, "Maria Lopez")]),
            extraction(1, vec![proper(1, 0, "Maria L.")]),
        ];
        let clustering = clusterer(provider.clone()).cluster(&segments, &extractions).await;

        assert_eq!(clustering.proposal_errors.len(), 2);
        assert_eq!(clustering.proposal_errors[1].segment, 1);
        assert_eq!(provider.call_count(), 4);
        assert_eq!(clustering.candidates.len(), 1);
        assert_eq!(clustering.candidates[0].len(), 2);
    }

    #[tokio::test]
    async fn test_proposals_disabled_makes_no_calls() {
        let provider = MockProvider::default();
        let segments = segments(&["Ana left."]);
        let extractions = vec![extraction(0, vec![proper(0, 0, "Ana")]), extraction(1, vec![])];
        let clustering = clusterer(provider.clone())
            .with_proposals(false)
            .cluster(&segments, &extractions)
            .await;

        assert_eq!(provider.call_count(), 0);
        assert_eq!(clustering.candidates.len(), 1);
    }
}
