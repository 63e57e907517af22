//! Provider retry — bounded attempts with exponential backoff.
//!
//! [`RetryingProvider`] wraps any provider and re-issues failed blocking
//! completions. Each attempt is bounded by its own timeout. Streams are
//! opened once: a stream that fails mid-way cannot be replayed without
//! duplicating fragments the caller already consumed.

use async_trait::async_trait;
use canopy_config::RetryConfig;
use canopy_core::error::ProviderError;
use canopy_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff schedule for model calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: Duration,
    /// Upper bound on a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            min_backoff: Duration::from_millis(config.min_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: Duration::from_millis(config.multiplier_ms),
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the retry that follows failed attempt number `attempt` (1-based).
    ///
    /// `multiplier * 2^(attempt - 1)`, clamped to `[min_backoff, max_backoff]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let raw = self.multiplier.saturating_mul(1u32 << exponent);
        raw.clamp(self.min_backoff, self.max_backoff.max(self.min_backoff))
    }
}

/// A provider decorator that retries transient failures.
pub struct RetryingProvider {
    inner: Arc<dyn canopy_core::Provider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn canopy_core::Provider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn attempt(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        match tokio::time::timeout(self.policy.attempt_timeout, self.inner.complete(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "Provider '{}' timed out after {}s",
                self.inner.name(),
                self.policy.attempt_timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl canopy_core::Provider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut attempt = 1;
        loop {
            match self.attempt(request.clone()).await {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(provider = %self.inner.name(), attempt, "Retry succeeded");
                    }
                    return Ok(response);
                }
                Err(e) if !e.is_retryable() || attempt >= self.policy.max_attempts => {
                    return Err(e);
                }
                Err(e) => {
                    let mut delay = self.policy.delay_for(attempt);
                    if let ProviderError::RateLimited { retry_after_secs } = &e {
                        delay = delay
                            .max(Duration::from_secs(*retry_after_secs))
                            .min(self.policy.max_backoff);
                    }
                    warn!(
                        provider = %self.inner.name(),
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        match tokio::time::timeout(self.policy.attempt_timeout, self.inner.stream(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "Provider '{}' stream did not start within {}s",
                self.inner.name(),
                self.policy.attempt_timeout.as_secs()
            ))),
        }
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        self.inner.embed(request).await
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::Provider;
    use canopy_core::message::Message;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a scripted sequence of outcomes, then succeeds.
    struct ScriptedProvider {
        outcomes: Mutex<VecDeque<ProviderError>>,
        call_count: Mutex<u32>,
    }

    impl ScriptedProvider {
        fn failing_with(errors: Vec<ProviderError>) -> Self {
            Self {
                outcomes: Mutex::new(errors.into()),
                call_count: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl canopy_core::Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            *self.call_count.lock().unwrap() += 1;
            if let Some(err) = self.outcomes.lock().unwrap().pop_front() {
                return Err(err);
            }
            Ok(ProviderResponse {
                message: Message::assistant("recovered"),
                usage: None,
                model: "test-model".into(),
            })
        }
    }

    struct HangingProvider;

    #[async_trait]
    impl canopy_core::Provider for HangingProvider {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::Network("unreachable".into()))
        }
    }

    fn test_request() -> ProviderRequest {
        ProviderRequest::new("test", vec![Message::user("hello")])
    }

    fn server_error() -> ProviderError {
        ProviderError::ApiError {
            status_code: 503,
            message: "overloaded".into(),
        }
    }

    #[test]
    fn default_schedule_clamps_to_bounds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn policy_from_config() {
        let config = RetryConfig {
            max_attempts: 0,
            min_backoff_ms: 100,
            max_backoff_ms: 400,
            multiplier_ms: 50,
            attempt_timeout_secs: 5,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(5));
        assert_eq!(policy.delay_for(4), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures() {
        let inner = Arc::new(ScriptedProvider::failing_with(vec![
            server_error(),
            ProviderError::Network("reset".into()),
        ]));
        let provider = RetryingProvider::new(inner.clone(), RetryPolicy::default());

        let response = provider.complete(test_request()).await.unwrap();
        assert_eq!(response.message.content, "recovered");
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let inner = Arc::new(ScriptedProvider::failing_with(vec![
            server_error(),
            server_error(),
            server_error(),
            server_error(),
        ]));
        let provider = RetryingProvider::new(inner.clone(), RetryPolicy::default());

        let err = provider.complete(test_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::ApiError { status_code: 503, .. }));
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failures_are_not_retried() {
        let inner = Arc::new(ScriptedProvider::failing_with(vec![
            ProviderError::AuthenticationFailed("bad key".into()),
        ]));
        let provider = RetryingProvider::new(inner.clone(), RetryPolicy::default());

        let err = provider.complete(test_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_becomes_timeout_error() {
        let policy = RetryPolicy {
            attempt_timeout: Duration::from_millis(50),
            ..RetryPolicy::none()
        };
        let provider = RetryingProvider::new(Arc::new(HangingProvider), policy);

        let err = provider.complete(test_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test]
    async fn name_passes_through() {
        let provider = RetryingProvider::new(Arc::new(HangingProvider), RetryPolicy::none());
        assert_eq!(provider.name(), "hanging");
    }
}
