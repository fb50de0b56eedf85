//! Mention substitution
//!
//! Every member of a confirmed cluster has its span replaced by the cluster
//! label. Spans are translated to document offsets, checked against the
//! text, sorted, checked for overlap and then applied in one forward sweep,
//! so no replacement can shift another. Mentions outside confirmed clusters
//! keep their original text.

use crate::error::PipelineError;
use crate::extractor::SegmentExtraction;
use corefchain_domain::{find_shared_member, ConfirmedCluster, Mention, MentionId, Segment};
use std::collections::HashMap;
use tracing::{debug, info};

/// One span of the document to rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
struct Replacement<'a> {
    mention: MentionId,
    start: usize,
    end: usize,
    label: &'a str,
}

/// Rewrite `text` with the canonical label of every confirmed cluster
pub fn substitute(
    text: &str,
    segments: &[Segment],
    extractions: &[SegmentExtraction],
    clusters: &[ConfirmedCluster],
) -> Result<String, PipelineError> {
    if let Some(shared) = find_shared_member(clusters) {
        return Err(PipelineError::SharedMention(shared));
    }

    let mentions: HashMap<MentionId, &Mention> = extractions
        .iter()
        .flat_map(|e| &e.mentions)
        .map(|m| (m.id, m))
        .collect();
    let segments: HashMap<usize, &Segment> = segments.iter().map(|s| (s.index, s)).collect();

    let mut replacements = Vec::new();
    for cluster in clusters {
        for id in &cluster.members {
            let mention = mentions.get(id).ok_or(PipelineError::UnknownMention(*id))?;
            let segment = segments
                .get(&id.segment)
                .ok_or(PipelineError::UnknownMention(*id))?;

            let start = segment.to_global(mention.start);
            let end = segment.to_global(mention.end);
            let found = text.get(start..end);
            if found != Some(mention.text.as_str()) {
                return Err(PipelineError::SpanMismatch {
                    mention: *id,
                    expected: mention.text.clone(),
                    found: found.unwrap_or_default().to_string(),
                });
            }

            replacements.push(Replacement {
                mention: *id,
                start,
                end,
                label: &cluster.label,
            });
        }
    }

    replacements.sort_by_key(|r| (r.start, r.end));
    if let Some(pair) = replacements.windows(2).find(|w| w[1].start < w[0].end) {
        return Err(PipelineError::Overlap {
            first: pair[0].mention,
            second: pair[1].mention,
        });
    }

    let mut rewritten = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut changed = 0;
    for replacement in &replacements {
        rewritten.push_str(&text[cursor..replacement.start]);
        rewritten.push_str(replacement.label);
        if &text[replacement.start..replacement.end] != replacement.label {
            changed += 1;
            debug!(
                "{}: '{}' -> '{}'",
                replacement.mention,
                &text[replacement.start..replacement.end],
                replacement.label
            );
        }
        cursor = replacement.end;
    }
    rewritten.push_str(&text[cursor..]);

    info!(
        "Substituted {} span(s) from {} cluster(s), {} changed",
        replacements.len(),
        clusters.len(),
        changed
    );
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corefchain_domain::{ClusterId, EntityCategory, MentionKind};

    /// Two segments split after the first sentence
    fn document() -> (String, Vec<Segment>) {
        let text = "Maria Lopez, also known as Maria L., crossed the border. Maria later called her brother.";
        let split = text.find("Maria later").unwrap();
        let segments = vec![
            Segment {
                index: 0,
                start: 0,
                end: split,
                text: text[..split].to_string(),
                size: 9,
            },
            Segment {
                index: 1,
                start: split,
                end: text.len(),
                text: text[split..].to_string(),
                size: 5,
            },
        ];
        (text.to_string(), segments)
    }

    fn mention(segments: &[Segment], segment: usize, ordinal: usize, surface: &str, nth: usize) -> Mention {
        let local = &segments[segment].text;
        let start = local.match_indices(surface).nth(nth).unwrap().0;
        Mention {
            id: MentionId::new(segment, ordinal),
            start,
            end: start + surface.len(),
            text: surface.to_string(),
            category: EntityCategory::Person,
            kind: MentionKind::ProperNoun,
            description: None,
        }
    }

    fn extractions(segments: &[Segment]) -> Vec<SegmentExtraction> {
        let wrap = |segment, mentions| SegmentExtraction {
            segment,
            mentions,
            descriptions: Default::default(),
            raw_response: None,
            attempts: 1,
            error: None,
        };
        vec![
            wrap(
                0,
                vec![
                    mention(segments, 0, 0, "Maria Lopez", 0),
                    mention(segments, 0, 1, "Maria L.", 0),
                ],
            ),
            wrap(
                1,
                vec![
                    mention(segments, 1, 0, "Maria", 0),
                    mention(segments, 1, 1, "her brother", 0),
                ],
            ),
        ]
    }

    fn confirmed(id: usize, members: &[(usize, usize)], label: &str) -> ConfirmedCluster {
        ConfirmedCluster {
            id: ClusterId(id),
            members: members.iter().map(|&(s, o)| MentionId::new(s, o)).collect(),
            label: label.to_string(),
        }
    }

    #[test]
    fn test_rewrite_across_segments() {
        let (text, segments) = document();
        let clusters = [confirmed(0, &[(0, 0), (0, 1), (1, 0)], "Maria Lopez")];

        let rewritten = substitute(&text, &segments, &extractions(&segments), &clusters).unwrap();
        assert_eq!(
            rewritten,
            "Maria Lopez, also known as Maria Lopez, crossed the border. Maria Lopez later called her brother."
        );
    }

    #[test]
    fn test_unconfirmed_mentions_keep_their_text() {
        let (text, segments) = document();
        let clusters = [confirmed(1, &[(1, 1)], "Pedro Lopez")];

        let rewritten = substitute(&text, &segments, &extractions(&segments), &clusters).unwrap();
        assert!(rewritten.starts_with("Maria Lopez, also known as Maria L.,"));
        assert!(rewritten.ends_with("called Pedro Lopez."));
    }

    #[test]
    fn test_identity_labels_leave_document_unchanged() {
        let (text, segments) = document();
        let clusters = [
            confirmed(0, &[(0, 0)], "Maria Lopez"),
            confirmed(1, &[(0, 1)], "Maria L."),
            confirmed(2, &[(1, 0)], "Maria"),
        ];
        let rewritten = substitute(&text, &segments, &extractions(&segments), &clusters).unwrap();
        assert_eq!(rewritten, text);
        assert_eq!(substitute(&text, &segments, &extractions(&segments), &[]).unwrap(), text);
    }

    #[test]
    fn test_overlap_is_fatal() {
        let (text, segments) = document();
        let mut extractions = extractions(&segments);
        // "Lopez" inside "Maria Lopez"
        let mut inner = mention(&segments, 0, 2, "Lopez", 0);
        inner.kind = MentionKind::NounPhrase;
        extractions[0].mentions.push(inner);

        let clusters = [
            confirmed(0, &[(0, 0)], "Maria Lopez"),
            confirmed(1, &[(0, 2)], "Lopez family"),
        ];
        let result = substitute(&text, &segments, &extractions, &clusters);
        assert!(matches!(
            result,
            Err(PipelineError::Overlap { first, second })
                if first == MentionId::new(0, 0) && second == MentionId::new(0, 2)
        ));
    }

    #[test]
    fn test_shared_member_is_fatal() {
        let (text, segments) = document();
        let clusters = [
            confirmed(0, &[(0, 0), (1, 0)], "Maria Lopez"),
            confirmed(1, &[(1, 0)], "Maria"),
        ];
        let result = substitute(&text, &segments, &extractions(&segments), &clusters);
        assert!(matches!(result, Err(PipelineError::SharedMention(id)) if id == MentionId::new(1, 0)));
    }

    #[test]
    fn test_unknown_mention_and_span_mismatch() {
        let (text, segments) = document();
        let clusters = [confirmed(0, &[(3, 0)], "Nobody")];
        assert!(matches!(
            substitute(&text, &segments, &extractions(&segments), &clusters),
            Err(PipelineError::UnknownMention(_))
        ));

        let clusters = [confirmed(0, &[(0, 0)], "Maria Lopez")];
        let altered = text.replacen("Maria Lopez", "Mario Lopez", 1);
        assert!(matches!(
            substitute(&altered, &segments, &extractions(&segments), &clusters),
            Err(PipelineError::SpanMismatch { found, .. }) if found == "Mario Lopez"
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Labels equal to the surface text never change the document
            #[test]
            fn test_identity_substitution(words in prop::collection::vec("[a-zA-Z]{1,8}", 1..30), picks in prop::collection::vec(any::<bool>(), 30)) {
                let text = words.join(" ");
                let segment = Segment { index: 0, start: 0, end: text.len(), text: text.clone(), size: words.len() };

                let mut mentions = Vec::new();
                let mut offset = 0;
                for (word, picked) in words.iter().zip(&picks) {
                    if *picked {
                        mentions.push(Mention {
                            id: MentionId::new(0, mentions.len()),
                            start: offset,
                            end: offset + word.len(),
                            text: word.clone(),
                            category: EntityCategory::Person,
                            kind: MentionKind::ProperNoun,
                            description: None,
                        });
                    }
                    offset += word.len() + 1;
                }
                let clusters: Vec<ConfirmedCluster> = mentions
                    .iter()
                    .map(|m| ConfirmedCluster { id: ClusterId(m.id.ordinal), members: vec![m.id], label: m.text.clone() })
                    .collect();
                let extraction = SegmentExtraction {
                    segment: 0,
                    mentions,
                    descriptions: Default::default(),
                    raw_response: None,
                    attempts: 1,
                    error: None,
                };

                let rewritten = substitute(&text, &[segment], &[extraction], &clusters).unwrap();
                prop_assert_eq!(rewritten, text);
            }
        }
    }
}
