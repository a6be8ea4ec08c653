//! Retry policy for text-generation calls.

use std::time::Duration;

use crate::error::{ExternalServiceError, GenerationError};
use crate::traits::{GenerateRequest, GenerateResponse, Sleeper, TextGenerator};

/// How many times to call the generator and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_retries: u32,
    /// Wait before the second attempt when the error gives no hint.
    pub retry_delay: Duration,
    /// Growth of the wait after each retry.
    pub backoff_factor: f64,
    /// Cap on the grown wait.
    pub max_delay: Duration,
    /// Added on top of a service-supplied hint.
    pub safety_margin: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
            safety_margin: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Wait before the next attempt given the error and the current delay.
    pub fn delay_for(&self, error: &GenerationError, current: Duration) -> Duration {
        match error.retry_after() {
            Some(hint) => hint + self.safety_margin,
            None => current,
        }
    }

    fn grow(&self, current: Duration) -> Duration {
        current
            .mul_f64(self.backoff_factor.max(1.0))
            .min(self.max_delay)
    }

    /// Call the generator until it succeeds, a non-retryable error comes back,
    /// or the attempts run out.
    pub async fn generate(
        &self,
        generator: &dyn TextGenerator,
        request: &GenerateRequest,
        sleeper: &dyn Sleeper,
    ) -> Result<GenerateResponse, ExternalServiceError> {
        let attempts = self.max_retries.max(1);
        let mut delay = self.retry_delay;

        for attempt in 1..=attempts {
            let error = match generator.generate(request).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if !error.is_retryable() {
                tracing::error!(
                    generator = generator.name(),
                    attempt,
                    "generation failed: {error}"
                );
                return Err(ExternalServiceError::Rejected(error));
            }

            if attempt == attempts {
                return Err(ExternalServiceError::RetriesExhausted {
                    attempts,
                    last: error,
                });
            }

            let wait = self.delay_for(&error, delay);
            tracing::warn!(
                generator = generator.name(),
                attempt,
                max_attempts = attempts,
                wait_ms = wait.as_millis() as u64,
                "generation attempt failed, retrying: {error}"
            );
            sleeper.sleep(wait).await;
            delay = self.grow(delay);
        }

        unreachable!("loop returns on the final attempt")
    }
}
