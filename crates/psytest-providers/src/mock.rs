//! Mock generator for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use psytest_core::error::GenerationError;
use psytest_core::model::TokenUsage;
use psytest_core::traits::{GenerateRequest, GenerateResponse, TextGenerator};

/// A mock text generator for exercising the engine without real API calls.
///
/// Queued failures are returned first, one per call. After that the reply is
/// the first rule whose key occurs in the prompt, or the default text.
pub struct MockGenerator {
    /// Prompt substring → reply, checked in order.
    rules: Vec<(String, String)>,
    /// Reply when no rule matches.
    default_response: String,
    /// Errors handed out before any reply.
    failures: Mutex<VecDeque<GenerationError>>,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last request received.
    last_request: Mutex<Option<GenerateRequest>>,
}

impl MockGenerator {
    /// Create a mock with prompt-substring rules.
    pub fn new(rules: Vec<(String, String)>) -> Self {
        Self {
            rules,
            default_response: "## Отчет\n\nТестовый отчет.".to_string(),
            failures: Mutex::new(VecDeque::new()),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same text.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_response: response.to_string(),
            ..Self::new(Vec::new())
        }
    }

    /// Fail the next calls with these errors, in order.
    pub fn failing_first(self, failures: Vec<GenerationError>) -> Self {
        if let Ok(mut queue) = self.failures.lock() {
            queue.extend(failures);
        }
        self
    }

    /// Get the number of calls made to this generator.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this generator.
    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, GenerationError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        let failure = self.failures.lock().ok().and_then(|mut q| q.pop_front());
        if let Some(err) = failure {
            return Err(err);
        }

        let text = self
            .rules
            .iter()
            .find(|(key, _)| request.prompt.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        // Rough estimate: four characters per token.
        let prompt_tokens = (request.prompt.len() / 4) as u32;
        let completion_tokens = (text.len() / 4) as u32;

        Ok(GenerateResponse {
            text,
            model: "mock-model".into(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fixed_response() {
        let generator = MockGenerator::with_fixed_response("## Итог");
        let response = generator
            .generate(&GenerateRequest::new("anything"))
            .await
            .unwrap();
        assert_eq!(response.text, "## Итог");
        assert_eq!(generator.call_count(), 1);
        assert_eq!(generator.last_request().unwrap().prompt, "anything");
    }

    #[tokio::test]
    async fn prompt_matching() {
        let generator = MockGenerator::new(vec![
            ("Блок: Результат".into(), "про результат".into()),
            ("ЦИФРОВОЙ ПРОФИЛЬ".into(), "про профиль".into()),
        ]);

        let resp = generator
            .generate(&GenerateRequest::new("### Блок: Результат"))
            .await
            .unwrap();
        assert_eq!(resp.text, "про результат");

        let resp = generator
            .generate(&GenerateRequest::new("что-то другое"))
            .await
            .unwrap();
        assert!(resp.text.contains("Тестовый отчет"));
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn queued_failures_come_first() {
        let generator = MockGenerator::with_fixed_response("ok").failing_first(vec![
            GenerationError::RateLimited {
                retry_after: Some(Duration::from_secs(1)),
            },
            GenerationError::Timeout(240),
        ]);

        let request = GenerateRequest::new("p");
        assert!(generator.generate(&request).await.is_err());
        assert!(generator.generate(&request).await.is_err());
        assert_eq!(generator.generate(&request).await.unwrap().text, "ok");
        assert_eq!(generator.call_count(), 3);
    }
}
