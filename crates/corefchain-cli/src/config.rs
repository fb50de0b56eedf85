//! Configuration management for the CLI.
//!
//! One TOML file holds the pipeline configuration and an optional
//! `[output]` table with display settings.

use crate::error::{CliError, Result};
use corefchain_llm::ollama::{endpoint_from_host, HOST_ENV_VAR};
use corefchain_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Display settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,

    /// Default output format
    #[serde(default = "default_format")]
    pub format: OutputFormat,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format
    Table,
    /// JSON format
    Json,
    /// Quiet (minimal) format
    Quiet,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OutputSection {
    #[serde(default)]
    output: Settings,
}

/// Configuration resolved for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pipeline configuration, validated
    pub pipeline: PipelineConfig,

    /// Display settings
    pub settings: Settings,

    /// Directory relative prompt, tokenizer and storage paths resolve against
    pub base_dir: PathBuf,

    /// File the configuration was read from, if any
    pub source: Option<PathBuf>,
}

impl Config {
    /// Get the default configuration file path.
    pub fn path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| CliError::Config("Could not find home directory".into()))?;
        Ok(home.join(".corefchain").join("config.toml"))
    }

    /// Load the configuration.
    ///
    /// An explicit path must exist. Without one, the default path is used
    /// when present and built-in defaults otherwise. `OLLAMA_HOST` then
    /// overrides the completion endpoint.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::path()?;
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    debug!("No configuration at {}, using defaults", path.display());
                    Self::defaults()
                }
            }
        };

        let host = std::env::var(HOST_ENV_VAR).ok();
        if apply_host_override(&mut config.pipeline, host.as_deref()) {
            info!(
                endpoint = %config.pipeline.completion.endpoint,
                "Completion endpoint taken from {}", HOST_ENV_VAR
            );
        }

        Ok(config)
    }

    /// Built-in defaults, with paths relative to the working directory.
    pub fn defaults() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            settings: Settings::default(),
            base_dir: PathBuf::from("."),
            source: None,
        }
    }

    /// Read and validate a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let pipeline = PipelineConfig::from_toml(contents).map_err(CliError::Config)?;
        pipeline.validate().map_err(CliError::Config)?;
        let section: OutputSection = toml::from_str(contents)?;

        Ok(Self {
            pipeline,
            settings: section.output,
            base_dir: PathBuf::from("."),
            source: None,
        })
    }

    /// Resolve a configured path against the configuration directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }
}

/// Point the completion endpoint at an `OLLAMA_HOST` value.
///
/// Returns whether the endpoint changed. Blank values are ignored.
pub fn apply_host_override(config: &mut PipelineConfig, host: Option<&str>) -> bool {
    match host {
        Some(host) if !host.trim().is_empty() => {
            config.completion.endpoint = endpoint_from_host(host);
            true
        }
        _ => false,
    }
}

/// Render the default configuration as TOML.
pub fn default_toml() -> Result<String> {
    let mut body = PipelineConfig::default()
        .to_toml()
        .map_err(CliError::Config)?;
    let output = toml::to_string_pretty(&OutputSection::default())
        .map_err(|e| CliError::Config(format!("Failed to serialize to TOML: {}", e)))?;
    body.push('\n');
    body.push_str(&output);
    Ok(body)
}

/// Write the default configuration to `path`.
pub fn write_default(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(CliError::InvalidInput(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, default_toml()?)?;
    Ok(())
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            color: default_true(),
            format: default_format(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_format() -> OutputFormat {
    OutputFormat::Table
}
