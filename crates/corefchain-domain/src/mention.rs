//! Mentions - extracted occurrences of an entity category

use crate::EntityCategory;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a mention: its segment plus its position within that segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MentionId {
    /// Index of the segment the mention was extracted from
    pub segment: usize,

    /// Order of the mention within its segment (by start offset)
    pub ordinal: usize,
}

impl MentionId {
    /// Create a new mention identifier
    pub fn new(segment: usize, ordinal: usize) -> Self {
        Self { segment, ordinal }
    }
}

impl fmt::Display for MentionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}m{}", self.segment, self.ordinal)
    }
}

/// Grammatical shape of a mention as reported by extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MentionKind {
    /// A name ("Maria Lopez")
    #[default]
    ProperNoun,

    /// A descriptive phrase ("the driver")
    NounPhrase,
}

/// A single occurrence of the target category within a segment
///
/// `start..end` are byte offsets local to the segment text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    /// Identifier, unique within one category pass
    pub id: MentionId,

    /// Segment-local byte offset of the first char
    pub start: usize,

    /// Segment-local byte offset one past the last char
    pub end: usize,

    /// Surface text (`segment.text[start..end]`)
    pub text: String,

    /// Category this mention was extracted for
    pub category: EntityCategory,

    /// Proper noun or noun phrase
    #[serde(default)]
    pub kind: MentionKind,

    /// Short description supplied by extraction, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Mention {
    /// Segment the mention belongs to
    pub fn segment(&self) -> usize {
        self.id.segment
    }

    /// Whether two mentions of the same segment share any byte
    pub fn overlaps(&self, other: &Mention) -> bool {
        self.id.segment == other.id.segment && self.start < other.end && other.start < self.end
    }
}
