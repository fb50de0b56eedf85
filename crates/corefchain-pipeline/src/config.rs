//! Configuration for the pipeline

use crate::error::PipelineError;
use corefchain_domain::EntityCategory;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Completion service settings shared by every stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Base URL of the completion service
    pub endpoint: String,

    /// Worker-pool width for segment extraction and cluster verification
    pub concurrency: usize,

    /// Deadline of one attempt (seconds)
    pub timeout_secs: u64,

    /// Deadline of the one-time retry that follows the first timeout (seconds)
    pub extended_timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434".to_string(),
            concurrency: 4,
            timeout_secs: 120,
            extended_timeout_secs: 300,
        }
    }
}

impl CompletionConfig {
    /// Get the attempt timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get the extended timeout as a Duration
    pub fn extended_timeout(&self) -> Duration {
        Duration::from_secs(self.extended_timeout_secs)
    }
}

/// Backoff between attempts of one completion call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Pause after the first failed attempt (milliseconds), doubled each time
    pub initial_backoff_ms: u64,

    /// Upper bound for the pause (milliseconds)
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

/// How chunk sizes are measured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerConfig {
    /// Whitespace-separated words
    Words,

    /// HuggingFace `tokenizer.json` file
    Huggingface(PathBuf),
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        TokenizerConfig::Words
    }
}

/// Chunker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum size of a segment, in tokenizer units
    pub max_tokens: usize,

    /// Minimum word count of the last segment before it is merged backwards
    pub min_last_chunk_words: usize,

    /// Size measure
    pub tokenizer: TokenizerConfig,

    /// Keep a sentence larger than `max_tokens` as its own segment instead of failing
    pub allow_oversized_units: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2_000,
            min_last_chunk_words: 20,
            tokenizer: TokenizerConfig::Words,
            allow_oversized_units: false,
        }
    }
}

/// Run store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One directory per run
    Fs,
    /// Single SQLite database
    Sqlite,
}

/// Where run state and artifacts are persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind
    pub backend: StorageBackend,

    /// Directory (fs) or database file (sqlite)
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            path: PathBuf::from("output"),
        }
    }
}

/// Extraction stage settings of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NerConfig {
    /// Model identifier
    pub model: String,

    /// Prompt template file; the built-in template is used when absent
    pub prompt_file: Option<PathBuf>,

    /// Attempts per segment
    pub max_retries: usize,
}

impl Default for NerConfig {
    fn default() -> Self {
        Self {
            model: "llama3".to_string(),
            prompt_file: None,
            max_retries: 2,
        }
    }
}

/// Coreference stage settings of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorefConfig {
    /// Model identifier
    pub model: String,

    /// Proposal prompt template file
    pub prompt_file: Option<PathBuf>,

    /// Verification prompt template file
    pub verify_prompt_file: Option<PathBuf>,

    /// Ask the model for canonical-form proposals while clustering
    pub propose_with_llm: bool,

    /// Independent verification passes per cluster
    pub verify_passes: usize,

    /// Attempts per proposal or verification call
    pub max_retries: usize,

    /// Also verify singletons that have no competing label
    pub verify_singletons: bool,
}

impl Default for CorefConfig {
    fn default() -> Self {
        Self {
            model: "llama3".to_string(),
            prompt_file: None,
            verify_prompt_file: None,
            propose_with_llm: true,
            verify_passes: 3,
            max_retries: 3,
            verify_singletons: false,
        }
    }
}

/// One entry of the category chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Category resolved by this pass
    pub category: EntityCategory,

    /// Extraction settings
    #[serde(default)]
    pub ner: NerConfig,

    /// Coreference settings
    #[serde(default)]
    pub coref: CorefConfig,
}

impl CategoryConfig {
    /// Default settings for a category
    pub fn new(category: EntityCategory) -> Self {
        Self {
            category,
            ner: NerConfig::default(),
            coref: CorefConfig::default(),
        }
    }
}

fn default_categories() -> Vec<CategoryConfig> {
    EntityCategory::CHAIN
        .iter()
        .map(|c| CategoryConfig::new(*c))
        .collect()
}

/// Configuration for the whole pipeline
///
/// Loaded from TOML and validated once before any stage runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Completion service settings
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Backoff settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Chunker settings
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Persistence settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Category chain, in execution order
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryConfig>,
}

impl Default for PipelineConfig {
    /// All seven categories in chain order with default stage settings
    fn default() -> Self {
        Self {
            completion: CompletionConfig::default(),
            retry: RetryConfig::default(),
            chunking: ChunkingConfig::default(),
            storage: StorageConfig::default(),
            categories: default_categories(),
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration
    ///
    /// Every problem is reported, joined with `; `.
    pub fn validate(&self) -> Result<(), String> {
        let mut problems = Vec::new();

        if self.completion.endpoint.trim().is_empty() {
            problems.push("completion.endpoint must not be empty".to_string());
        }
        if self.completion.concurrency == 0 {
            problems.push("completion.concurrency must be greater than 0".to_string());
        }
        if self.completion.timeout_secs == 0 {
            problems.push("completion.timeout_secs must be greater than 0".to_string());
        }
        if self.completion.extended_timeout_secs < self.completion.timeout_secs {
            problems.push(
                "completion.extended_timeout_secs cannot be shorter than timeout_secs".to_string(),
            );
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            problems.push("retry.initial_backoff_ms cannot exceed max_backoff_ms".to_string());
        }
        if self.chunking.max_tokens == 0 {
            problems.push("chunking.max_tokens must be greater than 0".to_string());
        }
        if self.categories.is_empty() {
            problems.push("at least one category must be configured".to_string());
        }

        let mut seen = HashSet::new();
        for entry in &self.categories {
            let name = entry.category.as_str();
            if !seen.insert(entry.category) {
                problems.push(format!("category '{}' is listed more than once", name));
            }
            if entry.ner.model.trim().is_empty() {
                problems.push(format!("{}: ner.model must not be empty", name));
            }
            if entry.ner.max_retries == 0 {
                problems.push(format!("{}: ner.max_retries must be greater than 0", name));
            }
            if entry.coref.model.trim().is_empty() {
                problems.push(format!("{}: coref.model must not be empty", name));
            }
            if entry.coref.max_retries == 0 {
                problems.push(format!("{}: coref.max_retries must be greater than 0", name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }

    /// Settings of one category
    pub fn category(&self, category: EntityCategory) -> Option<&CategoryConfig> {
        self.categories.iter().find(|c| c.category == category)
    }

    /// Categories in chain order
    pub fn chain(&self) -> Vec<EntityCategory> {
        self.categories.iter().map(|c| c.category).collect()
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }

    /// Read, parse and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&contents).map_err(PipelineError::Config)?;
        config.validate().map_err(PipelineError::Config)?;
        Ok(config)
    }
}
