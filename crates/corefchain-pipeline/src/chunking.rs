//! Token-bounded document chunking

use crate::config::ChunkingConfig;
use crate::error::PipelineError;
use crate::tokenizer::TokenCounter;
use corefchain_domain::Segment;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("paragraph regex is valid"));

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]["')\]]*\s+"#).expect("sentence regex is valid"));

/// An indivisible piece of text: a paragraph, or a sentence of an oversized paragraph
#[derive(Debug, Clone, Copy)]
struct Unit {
    start: usize,
    end: usize,
    size: usize,
}

/// Splits documents into ordered, contiguous segments under a size budget
///
/// Units keep their trailing separators, so segment texts concatenate back
/// to the document byte for byte.
pub struct Chunker {
    counter: Arc<dyn TokenCounter>,
    max_tokens: usize,
    min_last_chunk_words: usize,
    allow_oversized_units: bool,
}

impl Chunker {
    /// Create a new chunker
    pub fn new(counter: Arc<dyn TokenCounter>, max_tokens: usize, min_last_chunk_words: usize) -> Self {
        Self {
            counter,
            max_tokens,
            min_last_chunk_words,
            allow_oversized_units: false,
        }
    }

    /// Create a chunker from configuration
    pub fn from_config(config: &ChunkingConfig, counter: Arc<dyn TokenCounter>) -> Self {
        Self::new(counter, config.max_tokens, config.min_last_chunk_words)
            .allow_oversized_units(config.allow_oversized_units)
    }

    /// Keep a sentence above the budget as its own segment instead of failing
    pub fn allow_oversized_units(mut self, allow: bool) -> Self {
        self.allow_oversized_units = allow;
        self
    }

    /// Chunk the given text
    ///
    /// An empty text has no segments.
    pub fn chunk(&self, text: &str) -> Result<Vec<Segment>, PipelineError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let units = self.units(text)?;
        let mut ranges = self.pack(&units);

        while ranges.len() >= 2 {
            let last = ranges[ranges.len() - 1];
            if word_count(&text[last.start..last.end]) >= self.min_last_chunk_words {
                break;
            }
            ranges.pop();
            if let Some(prev) = ranges.last_mut() {
                debug!(
                    "Merging {}-word tail into previous segment",
                    word_count(&text[last.start..last.end])
                );
                prev.end = last.end;
                prev.size += last.size;
            }
        }

        Ok(ranges
            .into_iter()
            .enumerate()
            .map(|(index, r)| Segment {
                index,
                start: r.start,
                end: r.end,
                text: text[r.start..r.end].to_string(),
                size: r.size,
            })
            .collect())
    }

    /// Paragraph units, with oversized paragraphs broken into sentences
    fn units(&self, text: &str) -> Result<Vec<Unit>, PipelineError> {
        let mut units = Vec::new();

        for (start, end) in split_after(text, 0, &PARAGRAPH_BREAK) {
            let size = self.counter.count(&text[start..end])?;
            if size <= self.max_tokens {
                units.push(Unit { start, end, size });
                continue;
            }

            for (s_start, s_end) in split_after(&text[start..end], start, &SENTENCE_END) {
                let size = self.counter.count(&text[s_start..s_end])?;
                if size > self.max_tokens {
                    if !self.allow_oversized_units {
                        return Err(PipelineError::Chunking(format!(
                            "sentence at byte {} measures {} {}, above the budget of {}",
                            s_start,
                            size,
                            self.counter.unit(),
                            self.max_tokens
                        )));
                    }
                    warn!(
                        "Keeping oversized sentence at byte {} whole ({} {} > {})",
                        s_start,
                        size,
                        self.counter.unit(),
                        self.max_tokens
                    );
                }
                units.push(Unit {
                    start: s_start,
                    end: s_end,
                    size,
                });
            }
        }

        Ok(units)
    }

    /// Greedily combine units until the next one would exceed the budget
    fn pack(&self, units: &[Unit]) -> Vec<Unit> {
        let mut ranges = Vec::new();
        let mut current: Option<Unit> = None;

        for unit in units {
            current = match current {
                Some(c) if c.size + unit.size <= self.max_tokens => Some(Unit {
                    start: c.start,
                    end: unit.end,
                    size: c.size + unit.size,
                }),
                Some(c) => {
                    ranges.push(c);
                    Some(*unit)
                }
                None => Some(*unit),
            };
        }
        ranges.extend(current);
        ranges
    }
}

/// Split `text` after every match of `boundary`, returning ranges offset by `base`
fn split_after(text: &str, base: usize, boundary: &Regex) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for m in boundary.find_iter(text) {
        if m.end() > start {
            ranges.push((base + start, base + m.end()));
            start = m.end();
        }
    }
    if start < text.len() {
        ranges.push((base + start, base + text.len()));
    }
    ranges
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::WordCounter;

    fn chunker(max_tokens: usize, min_words: usize) -> Chunker {
        Chunker::new(Arc::new(WordCounter), max_tokens, min_words)
    }

    fn concat(segments: &[Segment]) -> String {
        segments.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_empty_text_has_no_segments() {
        assert!(chunker(10, 0).chunk("").unwrap().is_empty());
    }

    #[test]
    fn test_small_text_is_one_segment() {
        let text = "Maria crossed the border.";
        let segments = chunker(10, 20).chunk(text).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, text);
        assert_eq!(segments[0].size, 4);
    }

    #[test]
    fn test_paragraphs_packed_under_budget() {
        let text = "one two three.\n\nfour five six.\n\nseven eight nine.";
        let segments = chunker(6, 0).chunk(text).unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "one two three.\n\nfour five six.\n\n");
        assert_eq!(segments[1].text, "seven eight nine.");
        assert_eq!(segments[1].start, segments[0].end);
        assert_eq!(concat(&segments), text);
    }

    #[test]
    fn test_small_tail_merged_into_previous() {
        let text = "one two three.\n\nfour five six.\n\nseven.";
        let segments = chunker(6, 2).chunk(text).unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].size, 7);
        assert_eq!(segments[0].text, text);
    }

    #[test]
    fn test_oversized_paragraph_split_at_sentences() {
        let text = "Maria crossed the border. She called her brother. He waited.";
        let segments = chunker(5, 0).chunk(text).unwrap();

        assert_eq!(segments[0].text, "Maria crossed the border. ");
        assert_eq!(segments[1].text, "She called her brother. ");
        assert_eq!(segments[2].text, "He waited.");
        assert_eq!(concat(&segments), text);
    }

    #[test]
    fn test_oversized_sentence_fails() {
        let text = "one two three four five six seven eight";
        let result = chunker(3, 0).chunk(text);
        assert!(matches!(result, Err(PipelineError::Chunking(_))));
    }

    #[test]
    fn test_oversized_sentence_kept_when_allowed() {
        let text = "one two.\n\nthree four five six seven eight.\n\nnine ten.";
        let segments = chunker(3, 0)
            .allow_oversized_units(true)
            .chunk(text)
            .unwrap();

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].text, "three four five six seven eight.\n\n");
        assert_eq!(segments[1].size, 6);
        assert_eq!(concat(&segments), text);
    }

    #[test]
    fn test_multibyte_offsets_on_char_boundaries() {
        let text = "José López cruzó.\n\nLa señora esperó.";
        let segments = chunker(3, 0).chunk(text).unwrap();
        for s in &segments {
            assert!(text.is_char_boundary(s.start));
            assert!(text.is_char_boundary(s.end));
            assert_eq!(&text[s.start..s.end], s.text);
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn document() -> impl Strategy<Value = String> {
            let sentence = prop::collection::vec("[a-z]{1,8}", 1..=5)
                .prop_map(|words| format!("{}.", words.join(" ")));
            let paragraph =
                prop::collection::vec(sentence, 1..6).prop_map(|s| s.join(" "));
            (
                prop::collection::vec(paragraph, 0..8),
                prop::sample::select(vec!["\n\n", "\n\n\n"]),
            )
                .prop_map(|(paragraphs, sep)| paragraphs.join(sep))
        }

        proptest! {
            /// Segments are ordered, contiguous, non-empty and rebuild the text
            #[test]
            fn test_segments_cover_document(text in document(), max in 5usize..40, min in 0usize..10) {
                let segments = chunker(max, min).chunk(&text).unwrap();

                let mut cursor = 0;
                for (i, s) in segments.iter().enumerate() {
                    prop_assert_eq!(s.index, i);
                    prop_assert_eq!(s.start, cursor);
                    prop_assert!(!s.is_empty());
                    cursor = s.end;
                }
                prop_assert_eq!(cursor, text.len());
                prop_assert_eq!(concat(&segments), text);
            }

            /// Every segment but the last fits the budget; the last meets the word floor
            #[test]
            fn test_segment_sizes(text in document(), max in 5usize..40, min in 0usize..10) {
                let segments = chunker(max, min).chunk(&text).unwrap();

                if let Some((last, rest)) = segments.split_last() {
                    for s in rest {
                        prop_assert!(s.word_count() <= max);
                    }
                    prop_assert!(segments.len() == 1 || last.word_count() >= min);
                }
            }

            /// The word floor only merges trailing segments of the unmerged chunking
            #[test]
            fn test_tail_merge_refines_unmerged(text in document(), max in 5usize..40, min in 0usize..10) {
                let merged = chunker(max, min).chunk(&text).unwrap();
                let plain = chunker(max, 0).chunk(&text).unwrap();

                prop_assert!(merged.len() <= plain.len());
                if let Some((last, rest)) = merged.split_last() {
                    for (a, b) in rest.iter().zip(plain.iter()) {
                        prop_assert_eq!((a.start, a.end), (b.start, b.end));
                    }
                    prop_assert_eq!(last.start, plain[rest.len()].start);
                    prop_assert_eq!(last.end, text.len());
                }
            }
        }
    }
}
