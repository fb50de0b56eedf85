//! Size measures for chunking

use crate::config::TokenizerConfig;
use crate::error::PipelineError;
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::info;

/// Measures text for the chunk budget
pub trait TokenCounter: Send + Sync {
    /// Size of `text` in this counter's units
    fn count(&self, text: &str) -> Result<usize, PipelineError>;

    /// Unit name for reports ("words", "tokens")
    fn unit(&self) -> &'static str;
}

/// Whitespace-separated word count
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCounter;

impl TokenCounter for WordCounter {
    fn count(&self, text: &str) -> Result<usize, PipelineError> {
        Ok(text.split_whitespace().count())
    }

    fn unit(&self) -> &'static str {
        "words"
    }
}

/// Subword token count from a HuggingFace tokenizer
pub struct HfTokenCounter {
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    /// Load a `tokenizer.json` file
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            PipelineError::Tokenizer(format!("Failed to load {}: {}", path.display(), e))
        })?;
        info!("Loaded tokenizer from {}", path.display());
        Ok(Self { tokenizer })
    }
}

impl TokenCounter for HfTokenCounter {
    fn count(&self, text: &str) -> Result<usize, PipelineError> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| PipelineError::Tokenizer(format!("Tokenization failed: {}", e)))?;
        Ok(encoding.len())
    }

    fn unit(&self) -> &'static str {
        "tokens"
    }
}

/// Build the counter named by the configuration
///
/// Relative tokenizer paths are resolved against `base_dir`.
pub fn counter_from_config(
    config: &TokenizerConfig,
    base_dir: &Path,
) -> Result<Arc<dyn TokenCounter>, PipelineError> {
    match config {
        TokenizerConfig::Words => Ok(Arc::new(WordCounter)),
        TokenizerConfig::Huggingface(path) => {
            let path = base_dir.join(path);
            Ok(Arc::new(HfTokenCounter::from_file(&path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_counter() {
        let counter = WordCounter;
        assert_eq!(counter.count("Maria crossed\n\nthe border.").unwrap(), 4);
        assert_eq!(counter.count("   ").unwrap(), 0);
        assert_eq!(counter.unit(), "words");
    }

    #[test]
    fn test_missing_tokenizer_file() {
        let config = TokenizerConfig::Huggingface("missing-tokenizer.json".into());
        let result = counter_from_config(&config, Path::new("/nonexistent"));
        assert!(matches!(result, Err(PipelineError::Tokenizer(_))));
    }
}
