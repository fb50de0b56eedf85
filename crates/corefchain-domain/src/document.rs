//! Documents and the segments they are split into

use crate::EntityCategory;
use serde::{Deserialize, Serialize};

/// A document targeted by one category pass
///
/// Documents are never mutated: a rewrite produces a new `Document`
/// that becomes the input of the next category in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier shared by every category pass over this document
    pub id: String,

    /// Category the current pass resolves
    pub category: EntityCategory,

    /// Full document text
    pub text: String,
}

impl Document {
    /// Create a new document for the given category pass
    pub fn new(id: impl Into<String>, category: EntityCategory, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category,
            text: text.into(),
        }
    }

    /// Hand this document's text to the next category pass
    pub fn for_category(&self, category: EntityCategory) -> Self {
        Self {
            id: self.id.clone(),
            category,
            text: self.text.clone(),
        }
    }

    /// Whitespace-separated word count
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// A contiguous, non-overlapping slice of a document
///
/// `start..end` are byte offsets into the document text and always fall on
/// char boundaries. The segments of a document are ordered by `index` and
/// their texts concatenate back to the document exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Position of the segment within the document (0-based)
    pub index: usize,

    /// Byte offset of the first char in the document
    pub start: usize,

    /// Byte offset one past the last char in the document
    pub end: usize,

    /// Segment text (`document.text[start..end]`)
    pub text: String,

    /// Size as measured by the tokenizer used for chunking
    pub size: usize,
}

impl Segment {
    /// Length of the segment in bytes
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the segment is empty (never true for chunker output)
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whitespace-separated word count
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Whether a segment-local byte range lies inside this segment on char boundaries
    pub fn contains_span(&self, start: usize, end: usize) -> bool {
        start < end
            && end <= self.text.len()
            && self.text.is_char_boundary(start)
            && self.text.is_char_boundary(end)
    }

    /// Translate a segment-local byte offset to a document-global one
    pub fn to_global(&self, local: usize) -> usize {
        self.start + local
    }
}
