//! Error types for the CLI application.

use corefchain_llm::LlmError;
use corefchain_pipeline::PipelineError;
use corefchain_store::StoreError;
use thiserror::Error;

/// Result type alias for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pipeline run failed
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// Run store could not be opened
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Completion client could not be built
    #[error("Completion client error: {0}")]
    Llm(#[from] LlmError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
