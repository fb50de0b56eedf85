//! Corefchain Completion Client
//!
//! Pluggable text-completion providers behind one async trait.
//!
//! # Architecture
//!
//! A provider sends one prompt to a completion service and returns the raw
//! text or a definite failure. Providers never retry: bounded retries,
//! validation and backoff belong to the caller's retry policy.
//!
//! # Providers
//!
//! - `MockProvider`: Scripted responses for testing
//! - `OllamaProvider`: Ollama `/api/generate` integration
//!
//! # Examples
//!
//! ```
//! use corefchain_llm::{CompletionProvider, CompletionRequest, MockProvider};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let provider = MockProvider::new("Hello from LLM!");
//! let request = CompletionRequest::new("llama3", "Say hello.", "");
//! let result = provider.complete(&request).await.unwrap();
//! assert_eq!(result, "Hello from LLM!");
//! # });
//! ```

#![warn(missing_docs)]

pub mod ollama;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

pub use ollama::OllamaProvider;

/// Errors that can occur during completion calls
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// Service answered with something that is not a completion
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// The call did not finish within its deadline
    #[error("Completion timed out")]
    Timeout,

    /// Generic error
    #[error("LLM error: {0}")]
    Other(String),
}

impl LlmError {
    /// Whether another attempt could succeed
    ///
    /// A missing model will stay missing; everything else may be transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LlmError::ModelNotAvailable(_))
    }

    /// Whether the failure was a deadline being hit
    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Timeout)
    }
}

/// One completion call: a prompt template, the text it applies to, and a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Model identifier understood by the provider
    pub model: String,

    /// Instructions placed before the input
    pub template: String,

    /// Text (or JSON payload) the instructions apply to
    pub input: String,

    /// Deadline for this call, if the provider can enforce one
    pub timeout: Option<Duration>,
}

impl CompletionRequest {
    /// Create a new request without a deadline
    pub fn new(
        model: impl Into<String>,
        template: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            template: template.into(),
            input: input.into(),
            timeout: None,
        }
    }

    /// Set the deadline for this call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Full prompt text: trimmed template, a blank line, then the input
    pub fn prompt(&self) -> String {
        let template = self.template.trim();
        let input = self.input.trim();
        match (template.is_empty(), input.is_empty()) {
            (true, _) => input.to_string(),
            (false, true) => template.to_string(),
            (false, false) => format!("{}\n\n{}", template, input),
        }
    }
}

/// Trait for completion services
///
/// Implementations must be cancel-safe: dropping the returned future
/// abandons the call.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send one request and return the raw completion text
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

#[async_trait]
impl<P: CompletionProvider + ?Sized> CompletionProvider for Arc<P> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        (**self).complete(request).await
    }
}

/// Scripted reply of a [`MockProvider`]
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this text
    Text(String),

    /// Fail with `LlmError::Other`
    Error(String),

    /// Fail with `LlmError::Timeout`
    Timeout,

    /// Sleep, then return this text (for exercising deadlines)
    Delayed(Duration, String),
}

impl MockReply {
    /// Shorthand for `MockReply::Text`
    pub fn text(s: impl Into<String>) -> Self {
        MockReply::Text(s.into())
    }
}

#[derive(Debug)]
struct MockRule {
    needle: String,
    queued: VecDeque<MockReply>,
    fallback: Option<MockReply>,
}

/// Mock completion provider for deterministic testing
///
/// Replies are chosen by the first rule whose needle occurs in the prompt.
/// Queued replies are consumed in order; once a rule's queue is empty its
/// persistent reply (if any) is used, otherwise matching continues with the
/// next rule and finally the default response.
///
/// # Examples
///
/// ```
/// use corefchain_llm::{CompletionProvider, CompletionRequest, MockProvider, MockReply};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let mut provider = MockProvider::default();
/// provider.add_response("hello", "world");
/// provider.queue_replies("flaky", [MockReply::Timeout, MockReply::text("ok")]);
///
/// let hello = CompletionRequest::new("m", "say hello", "");
/// assert_eq!(provider.complete(&hello).await.unwrap(), "world");
///
/// let flaky = CompletionRequest::new("m", "flaky call", "");
/// assert!(provider.complete(&flaky).await.is_err());
/// assert_eq!(provider.complete(&flaky).await.unwrap(), "ok");
/// assert_eq!(provider.call_count(), 3);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    default_response: String,
    rules: Arc<Mutex<Vec<MockRule>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockProvider {
    /// Create a new MockProvider with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            rules: Arc::new(Mutex::new(Vec::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answer prompts containing `needle` with `response`
    pub fn add_response(&mut self, needle: impl Into<String>, response: impl Into<String>) {
        self.push_rule(needle.into(), VecDeque::new(), Some(MockReply::Text(response.into())));
    }

    /// Always fail prompts containing `needle`
    pub fn add_error(&mut self, needle: impl Into<String>) {
        self.push_rule(
            needle.into(),
            VecDeque::new(),
            Some(MockReply::Error("Mock error".to_string())),
        );
    }

    /// Answer prompts containing `needle` with these replies, one per call
    pub fn queue_replies(
        &mut self,
        needle: impl Into<String>,
        replies: impl IntoIterator<Item = MockReply>,
    ) {
        self.push_rule(needle.into(), replies.into_iter().collect(), None);
    }

    fn push_rule(&mut self, needle: String, queued: VecDeque<MockReply>, fallback: Option<MockReply>) {
        self.rules.lock().unwrap().push(MockRule {
            needle,
            queued,
            fallback,
        });
    }

    /// Get the number of times complete was called
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Number of calls whose prompt contained `needle`
    pub fn calls_matching(&self, needle: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(needle))
            .count()
    }

    /// Every prompt received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Reset the call log
    pub fn reset_call_count(&self) {
        self.prompts.lock().unwrap().clear();
    }

    fn next_reply(&self, prompt: &str) -> MockReply {
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut().filter(|r| prompt.contains(&r.needle)) {
            if let Some(reply) = rule.queued.pop_front() {
                return reply;
            }
            if let Some(reply) = &rule.fallback {
                return reply.clone();
            }
        }
        MockReply::Text(self.default_response.clone())
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("Default mock response")
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let prompt = request.prompt();
        let reply = self.next_reply(&prompt);
        self.prompts.lock().unwrap().push(prompt);

        match reply {
            MockReply::Text(text) => Ok(text),
            MockReply::Error(message) => Err(LlmError::Other(message)),
            MockReply::Timeout => Err(LlmError::Timeout),
            MockReply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> CompletionRequest {
        CompletionRequest::new("test-model", prompt, "")
    }

    #[tokio::test]
    async fn test_mock_provider_default() {
        let provider = MockProvider::new("Test response");
        let result = provider.complete(&request("any prompt")).await;
        assert_eq!(result.unwrap(), "Test response");
    }

    #[tokio::test]
    async fn test_mock_provider_matches_substring() {
        let mut provider = MockProvider::default();
        provider.add_response("hello", "world");
        provider.add_response("foo", "bar");

        assert_eq!(provider.complete(&request("say hello")).await.unwrap(), "world");
        assert_eq!(provider.complete(&request("foo?")).await.unwrap(), "bar");
        assert_eq!(
            provider.complete(&request("unknown")).await.unwrap(),
            "Default mock response"
        );
    }

    #[tokio::test]
    async fn test_mock_provider_queue_then_fallthrough() {
        let mut provider = MockProvider::new("default");
        provider.queue_replies("x", [MockReply::text("first"), MockReply::text("second")]);

        assert_eq!(provider.complete(&request("x")).await.unwrap(), "first");
        assert_eq!(provider.complete(&request("x")).await.unwrap(), "second");
        assert_eq!(provider.complete(&request("x")).await.unwrap(), "default");
    }

    #[tokio::test]
    async fn test_mock_provider_call_count() {
        let provider = MockProvider::new("test");
        assert_eq!(provider.call_count(), 0);

        provider.complete(&request("prompt1")).await.unwrap();
        provider.complete(&request("prompt2")).await.unwrap();
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.calls_matching("prompt1"), 1);

        provider.reset_call_count();
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_provider_error_and_timeout() {
        let mut provider = MockProvider::default();
        provider.add_error("bad prompt");
        provider.queue_replies("slow", [MockReply::Timeout]);

        let err = provider.complete(&request("bad prompt")).await.unwrap_err();
        assert!(matches!(err, LlmError::Other(_)));
        let err = provider.complete(&request("slow")).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_mock_provider_clone_shares_state() {
        let provider1 = MockProvider::new("test");
        let provider2 = provider1.clone();

        provider1.complete(&request("test")).await.unwrap();

        assert_eq!(provider1.call_count(), 1);
        assert_eq!(provider2.call_count(), 1);
    }

    #[test]
    fn test_prompt_composition() {
        let req = CompletionRequest::new("m", "  Extract people.\n", "\nMaria crossed.  ");
        assert_eq!(req.prompt(), "Extract people.\n\nMaria crossed.");
        assert_eq!(CompletionRequest::new("m", "", "text").prompt(), "text");
        assert_eq!(CompletionRequest::new("m", "only", " ").prompt(), "only");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(LlmError::Communication("reset".into()).is_retryable());
        assert!(!LlmError::ModelNotAvailable("x".into()).is_retryable());
    }
}
