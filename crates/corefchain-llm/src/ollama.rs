//! Ollama Provider Implementation
//!
//! Provides integration with Ollama's `/api/generate` endpoint.
//!
//! # Features
//!
//! - Async HTTP communication with the Ollama API
//! - `OLLAMA_HOST` values turned into base URLs by [`endpoint_from_host`]
//! - Per-request deadlines mapped to [`LlmError::Timeout`]
//!
//! Each call is exactly one round trip. Retries are the caller's job.
//!
//! # Examples
//!
//! ```no_run
//! use corefchain_llm::OllamaProvider;
//!
//! let provider = OllamaProvider::new("http://localhost:11434").unwrap();
//! ```

use crate::{CompletionProvider, CompletionRequest, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:11434";

/// Environment variable naming the Ollama `host:port`
pub const HOST_ENV_VAR: &str = "OLLAMA_HOST";

/// Ollama API provider
pub struct OllamaProvider {
    endpoint: String,
    client: reqwest::Client,
}

/// Request body for Ollama generate API
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Response from Ollama generate API
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Parameters
    ///
    /// - `endpoint`: Ollama API base URL (e.g., "http://localhost:11434")
    pub fn new(endpoint: impl Into<String>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::Communication(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Base URL requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify(&self, error: reqwest::Error) -> LlmError {
        if error.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Communication(format!("Request failed: {}", error))
        }
    }
}

/// Turn an `OLLAMA_HOST` value (`host:port`, optionally with scheme) into a base URL
pub fn endpoint_from_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.endpoint);
        let prompt = request.prompt();
        debug!(
            "Sending prompt to model '{}' ({} chars)",
            request.model,
            prompt.len()
        );

        let body = OllamaGenerateRequest {
            model: &request.model,
            prompt: &prompt,
            stream: false,
        };

        let mut builder = self.client.post(&url).json(&body);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LlmError::ModelNotAvailable(request.model.clone()));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimitExceeded);
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::Communication(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let parsed = response
            .json::<OllamaGenerateResponse>()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::InvalidResponse(format!("Failed to parse response: {}", e))
                }
            })?;

        Ok(parsed.response)
    }
}
