//! Command implementations.

pub mod chain;
pub mod init_config;
pub mod lengths;
pub mod run;
pub mod status;
pub mod tokens;

pub use self::chain::execute_chain;
pub use self::init_config::execute_init_config;
pub use self::lengths::execute_lengths;
pub use self::run::execute_run;
pub use self::status::execute_status;
pub use self::tokens::execute_tokens;

use crate::config::Config;
use crate::error::{CliError, Result};
use crate::store::AnyStore;
use corefchain_llm::OllamaProvider;
use corefchain_pipeline::{counter_from_config, Orchestrator, PromptSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Orchestrator wired to the configured completion endpoint and store.
pub type CliOrchestrator = Orchestrator<OllamaProvider, AnyStore>;

/// Build an orchestrator from the resolved configuration.
///
/// Prompt and tokenizer files are read here, so a missing file fails
/// before any stage runs.
pub fn build_orchestrator(config: &Config) -> Result<CliOrchestrator> {
    let pipeline = &config.pipeline;
    let provider = OllamaProvider::new(pipeline.completion.endpoint.as_str())?;
    debug!(endpoint = provider.endpoint(), "Completion client ready");

    let store = AnyStore::open(&pipeline.storage, &config.base_dir)?;
    let prompts = PromptSet::load(pipeline, &config.base_dir)?;
    let counter = counter_from_config(&pipeline.chunking.tokenizer, &config.base_dir)?;

    Ok(Orchestrator::new(
        Arc::new(provider),
        store,
        pipeline.clone(),
        prompts,
        counter,
    )?)
}

/// Explicit document id, or the stem of the input file.
pub fn document_id(explicit: Option<&str>, input: Option<&Path>) -> Result<String> {
    if let Some(id) = explicit {
        if id.trim().is_empty() {
            return Err(CliError::InvalidInput(
                "document id must not be empty".to_string(),
            ));
        }
        return Ok(id.to_string());
    }
    input
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            CliError::InvalidInput(
                "a document id is required when no input file is given".to_string(),
            )
        })
}

/// Write text to a file, creating parent directories.
pub fn write_output(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_document_id_from_stem() {
        let id = document_id(None, Some(Path::new("cases/case-017.txt"))).unwrap();
        assert_eq!(id, "case-017");
    }

    #[test]
    fn test_explicit_document_id_wins() {
        let id = document_id(Some("appeal-3"), Some(Path::new("case.txt"))).unwrap();
        assert_eq!(id, "appeal-3");
    }

    #[test]
    fn test_document_id_required() {
        assert!(matches!(
            document_id(None, None),
            Err(CliError::InvalidInput(_))
        ));
        assert!(matches!(
            document_id(Some("  "), None),
            Err(CliError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_build_orchestrator_with_defaults() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::defaults();
        config.base_dir = temp.path().to_path_buf();

        let orchestrator = build_orchestrator(&config).unwrap();
        assert_eq!(orchestrator.config().chain().len(), 7);
        assert!(temp.path().join("output").is_dir());
    }

    #[test]
    fn test_missing_prompt_file_fails_early() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::defaults();
        config.base_dir = temp.path().to_path_buf();
        config.pipeline.categories[0].ner.prompt_file = Some("prompts/missing.txt".into());

        assert!(matches!(
            build_orchestrator(&config),
            Err(CliError::Pipeline(_))
        ));
    }
}
