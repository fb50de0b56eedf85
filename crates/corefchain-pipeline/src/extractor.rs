//! Per-segment mention extraction

use crate::error::PipelineError;
use crate::parser::{parse_extraction, ExplicitSpan, ExtractionPayload};
use crate::prompt::extraction_template;
use crate::retry::RetryPolicy;
use corefchain_domain::{EntityCategory, Mention, MentionId, MentionKind, Segment};
use corefchain_llm::{CompletionProvider, CompletionRequest};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extraction outcome of one segment
///
/// A failed segment has no mentions and carries the error; its siblings are
/// unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentExtraction {
    /// Segment index
    pub segment: usize,

    /// Located mentions, ordered by start offset
    pub mentions: Vec<Mention>,

    /// Proper noun → description, as reported by the model
    #[serde(default)]
    pub descriptions: BTreeMap<String, String>,

    /// Accepted response, or the last rejected one when the segment failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,

    /// Attempts used
    #[serde(default)]
    pub attempts: usize,

    /// Failure description when every attempt was rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SegmentExtraction {
    /// Whether extraction of this segment failed
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Candidate occurrence before overlap resolution
struct Occurrence<'a> {
    start: usize,
    end: usize,
    kind: MentionKind,
    text: &'a str,
}

/// Prompts for every mention of one category in each segment
pub struct EntityExtractor<P> {
    provider: Arc<P>,
    category: EntityCategory,
    model: String,
    template: String,
    policy: RetryPolicy,
    concurrency: usize,
}

impl<P: CompletionProvider> EntityExtractor<P> {
    /// Create a new extractor
    pub fn new(
        provider: Arc<P>,
        category: EntityCategory,
        model: impl Into<String>,
        template: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            category,
            model: model.into(),
            template: template.into(),
            policy,
            concurrency: 1,
        }
    }

    /// Number of segments extracted at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Extract every segment, isolating per-segment failures
    pub async fn extract_all(&self, segments: &[Segment]) -> Vec<SegmentExtraction> {
        let mut results: Vec<SegmentExtraction> = stream::iter(segments)
            .map(|segment| async move {
                match self.extract_segment(segment).await {
                    Ok(extraction) => extraction,
                    Err(e) => self.failed(segment.index, e),
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by_key(|r| r.segment);

        let failed = results.iter().filter(|r| r.is_failed()).count();
        info!(
            "Extracted {} {} mention(s) from {} segment(s), {} failed",
            results.iter().map(|r| r.mentions.len()).sum::<usize>(),
            self.category,
            results.len(),
            failed
        );
        results
    }

    /// Extract one segment
    pub async fn extract_segment(&self, segment: &Segment) -> Result<SegmentExtraction, PipelineError> {
        let label = format!("{} extraction of segment {}", self.category, segment.index);
        debug!("{}: {} bytes", label, segment.len());

        let accepted = self
            .policy
            .run(
                &label,
                |attempt, deadline| {
                    let request = CompletionRequest::new(
                        &self.model,
                        extraction_template(&self.template, attempt),
                        &segment.text,
                    )
                    .with_timeout(deadline);
                    let provider = Arc::clone(&self.provider);
                    async move { provider.complete(&request).await }
                },
                |raw| {
                    parse_extraction(raw).and_then(|payload| locate_mentions(segment, self.category, payload))
                },
            )
            .await?;

        let (mentions, descriptions) = accepted.value;
        Ok(SegmentExtraction {
            segment: segment.index,
            mentions,
            descriptions,
            raw_response: Some(accepted.raw),
            attempts: accepted.attempts,
            error: None,
        })
    }

    fn failed(&self, segment: usize, error: PipelineError) -> SegmentExtraction {
        let (raw_response, attempts) = match &error {
            PipelineError::CompletionExhausted {
                last_raw, attempts, ..
            } => (last_raw.clone(), *attempts),
            _ => (None, 0),
        };
        let error = PipelineError::Extraction {
            segment,
            message: error.to_string(),
        };
        warn!("{}", error);

        SegmentExtraction {
            segment,
            mentions: Vec::new(),
            descriptions: BTreeMap::new(),
            raw_response,
            attempts,
            error: Some(error.to_string()),
        }
    }
}

/// Turn a parsed response into mentions of `segment`
///
/// Surface strings are matched at word boundaries; explicit offsets must lie
/// on char boundaries inside the segment and hold the stated text. Where
/// occurrences overlap, the leftmost-longest one is kept.
pub fn locate_mentions(
    segment: &Segment,
    category: EntityCategory,
    payload: ExtractionPayload,
) -> Result<(Vec<Mention>, BTreeMap<String, String>), String> {
    let text = segment.text.as_str();
    let mut occurrences = Vec::new();

    let descriptions = match &payload {
        ExtractionPayload::Surfaces {
            proper_nouns,
            noun_phrases,
            descriptions,
        } => {
            let surfaces = proper_nouns
                .iter()
                .map(|s| (s, MentionKind::ProperNoun))
                .chain(noun_phrases.iter().map(|s| (s, MentionKind::NounPhrase)));
            for (surface, kind) in surfaces {
                let before = occurrences.len();
                for (start, found) in text.match_indices(surface.as_str()) {
                    let end = start + found.len();
                    if at_word_boundary(text, start, end) {
                        occurrences.push(Occurrence {
                            start,
                            end,
                            kind,
                            text: found,
                        });
                    }
                }
                if occurrences.len() == before {
                    debug!("Segment {}: '{}' not found in text", segment.index, surface);
                }
            }
            descriptions.clone()
        }
        ExtractionPayload::Spans(spans) => {
            for ExplicitSpan { text: stated, start, end } in spans {
                if !segment.contains_span(*start, *end) {
                    return Err(format!(
                        "span {}..{} of '{}' is outside segment {} or off a char boundary",
                        start, end, stated, segment.index
                    ));
                }
                let found = &text[*start..*end];
                if found != stated {
                    return Err(format!(
                        "span {}..{} holds '{}', not '{}'",
                        start, end, found, stated
                    ));
                }
                occurrences.push(Occurrence {
                    start: *start,
                    end: *end,
                    kind: MentionKind::ProperNoun,
                    text: found,
                });
            }
            BTreeMap::new()
        }
    };

    occurrences.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then((b.end - b.start).cmp(&(a.end - a.start)))
            .then(a.kind.cmp(&b.kind))
    });

    let mut mentions: Vec<Mention> = Vec::new();
    let mut covered_to = 0;
    for occurrence in occurrences {
        if !mentions.is_empty() && occurrence.start < covered_to {
            continue;
        }
        covered_to = occurrence.end;
        mentions.push(Mention {
            id: MentionId::new(segment.index, mentions.len()),
            start: occurrence.start,
            end: occurrence.end,
            text: occurrence.text.to_string(),
            category,
            kind: occurrence.kind,
            description: descriptions.get(occurrence.text).cloned(),
        });
    }

    Ok((mentions, descriptions))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether `text[start..end]` does not cut into a word on either side
fn at_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let span = &text[start..end];
    let left_ok = match (text[..start].chars().next_back(), span.chars().next()) {
        (Some(before), Some(first)) if is_word_char(first) => !is_word_char(before),
        _ => true,
    };
    let right_ok = match (span.chars().next_back(), text[end..].chars().next()) {
        (Some(last), Some(after)) if is_word_char(last) => !is_word_char(after),
        _ => true,
    };
    left_ok && right_ok
}
