//! Error types for scoring and text generation.
//!
//! Generation errors are defined here rather than in `psytest-providers` so the
//! retry policy can classify them by variant without string matching.

use std::time::Duration;

use thiserror::Error;

/// Top-level error returned by the scoring engine.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// Malformed input for this session.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The narrative generator failed terminally.
    #[error(transparent)]
    ExternalService(#[from] ExternalServiceError),

    /// A scorer produced nothing usable.
    #[error("aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),
}

/// Input that cannot be scored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown series letter '{0}' (expected A-E)")]
    UnknownSeries(char),

    #[error("index {index} out of range for series {series} (expected 1-12)")]
    IndexOutOfRange { series: char, index: u32 },

    #[error("question number {0} out of range (expected 1-60)")]
    QuestionOutOfRange(u32),

    #[error("question {question}: answer '{value}' is not a number")]
    NonNumericAnswer { question: u32, value: String },

    #[error("question {question}: choice {choice} out of range (expected 1-8)")]
    ChoiceOutOfRange { question: u32, choice: i64 },

    #[error("question {question}: unrecognised answer '{value}'")]
    UnknownAnswer { question: u32, value: String },
}

/// A scorer could not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("no valid answers for {0}")]
    NoValidAnswers(String),

    #[error("generated report is empty")]
    EmptyOutput,
}

/// A single failed text-generation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The API returned a rate-limit response.
    #[error("rate limited{}", hint_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// The account quota is exhausted.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The configured model does not exist.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned another error response.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),
}

fn hint_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(", retry after {}ms", d.as_millis()),
        None => String::new(),
    }
}

impl GenerationError {
    /// Rate limits, quota signals and timeouts are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationError::RateLimited { .. }
                | GenerationError::QuotaExceeded(_)
                | GenerationError::Timeout(_)
        )
    }

    /// Delay the service asked us to wait, if it said.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GenerationError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Terminal outcome of a generation call after the retry policy gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalServiceError {
    #[error("text generation failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: GenerationError,
    },

    #[error("text generation failed: {0}")]
    Rejected(GenerationError),
}

impl ExternalServiceError {
    /// The underlying error from the final attempt.
    pub fn last_error(&self) -> &GenerationError {
        match self {
            ExternalServiceError::RetriesExhausted { last, .. } => last,
            ExternalServiceError::Rejected(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(GenerationError::RateLimited { retry_after: None }.is_retryable());
        assert!(GenerationError::QuotaExceeded("daily".into()).is_retryable());
        assert!(GenerationError::Timeout(240).is_retryable());
        assert!(!GenerationError::AuthenticationFailed("bad key".into()).is_retryable());
        assert!(!GenerationError::Api {
            status: 500,
            message: "boom".into()
        }
        .is_retryable());
    }

    #[test]
    fn rate_limit_message_includes_hint() {
        let err = GenerationError::RateLimited {
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(err.to_string(), "rate limited, retry after 5000ms");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
        let bare = GenerationError::RateLimited { retry_after: None };
        assert_eq!(bare.to_string(), "rate limited");
    }
}
