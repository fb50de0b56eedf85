//! Bounded retries around a single completion call

use crate::config::{CompletionConfig, RetryConfig};
use crate::error::PipelineError;
use corefchain_llm::LlmError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// A validator-accepted response
#[derive(Debug, Clone)]
pub struct Accepted<T> {
    /// Parsed value
    pub value: T,

    /// Raw response it was parsed from
    pub raw: String,

    /// Attempts used, including the successful one
    pub attempts: usize,
}

/// Attempt budget, backoff and deadlines for one kind of completion call
///
/// Every attempt is a full round trip. A deadline hit counts as a retryable
/// failure; the first one is followed by a single attempt with the extended
/// deadline, which still counts toward the budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
    timeout: Duration,
    extended_timeout: Duration,
}

impl RetryPolicy {
    /// Policy with `max_attempts` attempts and default backoff and deadlines
    pub fn new(max_attempts: usize) -> Self {
        Self::from_config(
            &CompletionConfig::default(),
            &RetryConfig::default(),
            max_attempts,
        )
    }

    /// Policy from the completion and retry sections of the configuration
    pub fn from_config(completion: &CompletionConfig, retry: &RetryConfig, max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(retry.max_backoff_ms),
            timeout: completion.timeout(),
            extended_timeout: completion.extended_timeout(),
        }
    }

    /// Override the backoff bounds
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Override the deadlines
    pub fn with_timeouts(mut self, timeout: Duration, extended: Duration) -> Self {
        self.timeout = timeout;
        self.extended_timeout = extended;
        self
    }

    /// Maximum number of attempts
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Pause after the `failed`-th failed attempt (1-based)
    pub fn backoff_for(&self, failed: usize) -> Duration {
        let exponent = failed.saturating_sub(1).min(16) as u32;
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_backoff)
    }

    /// Run `call` until `validate` accepts a response or the budget is spent
    ///
    /// `call` receives the 1-based attempt number and the deadline for that
    /// attempt. Non-retryable errors end the loop early.
    pub async fn run<T, F, Fut, V>(
        &self,
        label: &str,
        mut call: F,
        validate: V,
    ) -> Result<Accepted<T>, PipelineError>
    where
        F: FnMut(usize, Duration) -> Fut,
        Fut: Future<Output = Result<String, LlmError>>,
        V: Fn(&str) -> Result<T, String>,
    {
        let mut last_error = String::from("no attempt made");
        let mut last_raw = None;
        let mut extended_used = false;
        let mut next_extended = false;
        let mut attempts = 0;

        while attempts < self.max_attempts {
            attempts += 1;
            let deadline = if next_extended {
                self.extended_timeout
            } else {
                self.timeout
            };
            next_extended = false;

            let outcome = match timeout(deadline, call(attempts, deadline)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout),
            };

            match outcome {
                Ok(raw) => match validate(&raw) {
                    Ok(value) => {
                        debug!("{}: accepted response on attempt {}", label, attempts);
                        return Ok(Accepted {
                            value,
                            raw,
                            attempts,
                        });
                    }
                    Err(reason) => {
                        let preview: String = raw.chars().take(200).collect();
                        warn!(
                            "{}: attempt {} rejected: {} (response starts: {:?})",
                            label, attempts, reason, preview
                        );
                        last_error = reason;
                        last_raw = Some(raw);
                    }
                },
                Err(e) if e.is_timeout() => {
                    warn!("{}: attempt {} timed out after {:?}", label, attempts, deadline);
                    last_error = format!("timed out after {:?}", deadline);
                    if !extended_used {
                        extended_used = true;
                        next_extended = true;
                        continue;
                    }
                }
                Err(e) if !e.is_retryable() => {
                    warn!("{}: attempt {} failed permanently: {}", label, attempts, e);
                    last_error = e.to_string();
                    break;
                }
                Err(e) => {
                    warn!("{}: attempt {} failed: {}", label, attempts, e);
                    last_error = e.to_string();
                }
            }

            if attempts < self.max_attempts {
                sleep(self.backoff_for(attempts)).await;
            }
        }

        Err(PipelineError::CompletionExhausted {
            label: label.to_string(),
            attempts,
            last_error,
            last_raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn fast(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(max_attempts)
            .with_backoff(Duration::ZERO, Duration::ZERO)
            .with_timeouts(Duration::from_millis(50), Duration::from_millis(500))
    }

    fn parse_number(raw: &str) -> Result<u32, String> {
        raw.trim().parse().map_err(|_| format!("not a number: {}", raw))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5)
            .with_backoff(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(350));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_first_valid_response_returned() {
        let replies = Arc::new(Mutex::new(vec!["7", "oops"]));
        let result = fast(3)
            .run(
                "segment 0",
                |_, _| {
                    let replies = Arc::clone(&replies);
                    async move { Ok(replies.lock().unwrap().pop().unwrap().to_string()) }
                },
                parse_number,
            )
            .await
            .unwrap();

        assert_eq!(result.value, 7);
        assert_eq!(result.raw, "7");
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_exhaustion_carries_last_raw_and_bounds_calls() {
        let calls = AtomicUsize::new(0);
        let result = fast(3)
            .run(
                "segment 4",
                |attempt, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(format!("garbage {}", attempt)) }
                },
                parse_number,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(PipelineError::CompletionExhausted {
                label,
                attempts,
                last_raw,
                ..
            }) => {
                assert_eq!(label, "segment 4");
                assert_eq!(attempts, 3);
                assert_eq!(last_raw.as_deref(), Some("garbage 3"));
            }
            other => panic!("Expected exhaustion, got {:?}", other.map(|a| a.value)),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_early() {
        let calls = AtomicUsize::new(0);
        let result = fast(5)
            .run(
                "cluster c0",
                |_, _| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(LlmError::ModelNotAvailable("llama3".to_string())) }
                },
                parse_number,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_timeout_retried_with_extended_deadline() {
        let deadlines = Arc::new(Mutex::new(Vec::new()));
        let result = fast(3)
            .run(
                "segment 1",
                |attempt, deadline| {
                    deadlines.lock().unwrap().push(deadline);
                    async move {
                        if attempt == 1 {
                            // Slower than the 50ms attempt deadline
                            tokio::time::sleep(Duration::from_millis(200)).await;
                        }
                        Ok("42".to_string())
                    }
                },
                parse_number,
            )
            .await
            .unwrap();

        assert_eq!(result.value, 42);
        assert_eq!(result.attempts, 2);
        assert_eq!(
            *deadlines.lock().unwrap(),
            vec![Duration::from_millis(50), Duration::from_millis(500)]
        );
    }

    #[tokio::test]
    async fn test_extended_deadline_used_once() {
        let deadlines = Arc::new(Mutex::new(Vec::new()));
        let result = fast(3)
            .run(
                "segment 2",
                |_, deadline| {
                    deadlines.lock().unwrap().push(deadline);
                    async { Err::<String, _>(LlmError::Timeout) }
                },
                parse_number,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(
            *deadlines.lock().unwrap(),
            vec![
                Duration::from_millis(50),
                Duration::from_millis(500),
                Duration::from_millis(50)
            ]
        );
    }
}
