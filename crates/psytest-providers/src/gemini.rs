//! Google Gemini `generateContent` backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use psytest_core::error::GenerationError;
use psytest_core::model::TokenUsage;
use psytest_core::traits::{
    strip_outer_fence, GenerateRequest, GenerateResponse, TextGenerator,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TIMEOUT_SECS: u64 = 240;

/// Gemini API text generator.
pub struct GeminiGenerator {
    api_key: String,
    model: String,
    base_url: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Default)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: GeminiUsage,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<serde_json::Value>,
}

fn text_content(role: Option<&str>, text: &str) -> GeminiContent {
    GeminiContent {
        role: role.map(str::to_string),
        parts: vec![GeminiPart {
            text: text.to_string(),
        }],
    }
}

/// Parse a protobuf duration such as `"17s"` or `"2.5s"`.
fn parse_proto_duration(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().strip_suffix('s')?.parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Find a "retry in N seconds" style hint in free text.
fn hint_from_message(message: &str) -> Option<Duration> {
    let lower = message.to_lowercase();
    let idx = lower.find("seconds")?;
    let after = lower[idx + "seconds".len()..].trim_start_matches([':', ' ', '\t']);
    let digits: String = after.chars().take_while(char::is_ascii_digit).collect();
    if let Ok(secs) = digits.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // "retry in 17 seconds"
    let before = lower[..idx].trim_end();
    let digits: String = before
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

/// Map a non-success response onto a [`GenerationError`].
fn classify_error(
    status: u16,
    retry_after_header: Option<Duration>,
    body: &str,
    model: &str,
    timeout_secs: u64,
) -> GenerationError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = envelope
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string());

    match status {
        429 => {
            let retry_info = envelope.as_ref().and_then(|e| {
                e.error.details.iter().find_map(|d| {
                    d.get("retryDelay")
                        .and_then(|v| v.as_str())
                        .and_then(parse_proto_duration)
                })
            });
            let hint = retry_after_header
                .or(retry_info)
                .or_else(|| hint_from_message(&message));
            if hint.is_none() && message.to_lowercase().contains("quota") {
                GenerationError::QuotaExceeded(message)
            } else {
                GenerationError::RateLimited { retry_after: hint }
            }
        }
        401 | 403 => GenerationError::AuthenticationFailed(message),
        404 => GenerationError::ModelNotFound(model.to_string()),
        408 | 504 => GenerationError::Timeout(timeout_secs),
        _ => GenerationError::Api { status, message },
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, GenerationError> {
        if self.api_key.is_empty() {
            return Err(GenerationError::AuthenticationFailed(
                "no API key configured".into(),
            ));
        }
        let start = Instant::now();

        let body = GeminiRequest {
            contents: vec![text_content(Some("user"), &request.prompt)],
            system_instruction: request
                .system_instruction
                .as_deref()
                .map(|s| text_content(None, s)),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .timeout(Duration::from_secs(self.timeout_secs))
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.timeout_secs)
                } else {
                    GenerationError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status >= 400 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(
                status,
                retry_after,
                &body,
                &self.model,
                self.timeout_secs,
            ));
        }

        let api_response: GeminiResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(self.timeout_secs)
            } else {
                GenerationError::Api {
                    status,
                    message: format!("failed to parse response: {e}"),
                }
            }
        })?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let Some(candidate) = api_response.candidates.first() else {
            return Err(GenerationError::Api {
                status,
                message: "response has no candidates".into(),
            });
        };
        let text: String = candidate
            .content
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        if text.trim().is_empty() {
            return Err(GenerationError::Api {
                status,
                message: format!(
                    "empty response (finish reason: {})",
                    candidate.finish_reason.as_deref().unwrap_or("unknown")
                ),
            });
        }

        let usage = &api_response.usage_metadata;
        tracing::debug!(
            latency_ms,
            total_tokens = usage.total_token_count,
            "gemini response received"
        );

        Ok(GenerateResponse {
            text: strip_outer_fence(&text),
            model: api_response
                .model_version
                .unwrap_or_else(|| self.model.clone()),
            token_usage: TokenUsage {
                prompt_tokens: usage.prompt_token_count,
                completion_tokens: usage.candidates_token_count,
                total_tokens: usage.total_token_count,
            },
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ENDPOINT: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

    fn generator(server: &MockServer) -> GeminiGenerator {
        GeminiGenerator::new("test-key", DEFAULT_MODEL).with_base_url(Some(server.uri()))
    }

    fn request() -> GenerateRequest {
        GenerateRequest::new("Оцени ответы").with_system_instruction("Ты HR-аналитик")
    }

    #[tokio::test]
    async fn successful_generation() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "```markdown\n## Отчет\n"}, {"text": "Хорошо\n```"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 40, "candidatesTokenCount": 15, "totalTokenCount": 55},
            "modelVersion": "gemini-2.5-flash-001"
        });

        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{"role": "user", "parts": [{"text": "Оцени ответы"}]}],
                "systemInstruction": {"parts": [{"text": "Ты HR-аналитик"}]},
                "generationConfig": {"temperature": 0.7, "maxOutputTokens": 32768}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let response = generator(&server).generate(&request()).await.unwrap();
        assert_eq!(response.text, "## Отчет\nХорошо");
        assert_eq!(response.model, "gemini-2.5-flash-001");
        assert_eq!(response.token_usage.total_tokens, 55);
    }

    #[tokio::test]
    async fn rate_limit_with_retry_info() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "error": {
                "code": 429,
                "message": "Resource has been exhausted",
                "status": "RESOURCE_EXHAUSTED",
                "details": [{
                    "@type": "type.googleapis.com/google.rpc.RetryInfo",
                    "retryDelay": "17s"
                }]
            }
        });
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(429).set_body_json(&body))
            .mount(&server)
            .await;

        let err = generator(&server).generate(&request()).await.unwrap_err();
        assert_eq!(
            err,
            GenerationError::RateLimited {
                retry_after: Some(Duration::from_secs(17))
            }
        );
    }

    #[tokio::test]
    async fn rate_limit_with_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "3")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let err = generator(&server).generate(&request()).await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn quota_without_hint() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "error": {"code": 429, "message": "You exceeded your current quota"}
        });
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(429).set_body_json(&body))
            .mount(&server)
            .await;

        let err = generator(&server).generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::QuotaExceeded(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn auth_and_missing_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;
        let err = generator(&server).generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::AuthenticationFailed(_)));
        assert!(!err.is_retryable());

        let missing = GeminiGenerator::new("k", "no-such-model").with_base_url(Some(server.uri()));
        let err = missing.generate(&request()).await.unwrap_err();
        assert_eq!(err, GenerationError::ModelNotFound("no-such-model".into()));
    }

    #[tokio::test]
    async fn server_error_and_gateway_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(504))
            .mount(&server)
            .await;

        let g = generator(&server);
        let err = g.generate(&request()).await.unwrap_err();
        assert_eq!(
            err,
            GenerationError::Api {
                status: 500,
                message: "internal error".into()
            }
        );
        let err = g.generate(&request()).await.unwrap_err();
        assert_eq!(err, GenerationError::Timeout(DEFAULT_TIMEOUT_SECS));
    }

    #[tokio::test]
    async fn client_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let err = generator(&server)
            .with_timeout_secs(1)
            .generate(&request())
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Timeout(1));
    }

    #[tokio::test]
    async fn blocked_response_is_an_error() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "candidates": [{"content": {"parts": []}, "finishReason": "SAFETY"}]
        });
        Mock::given(method("POST"))
            .and(path(ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let err = generator(&server).generate(&request()).await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let server = MockServer::start().await;
        let err = GeminiGenerator::new("", DEFAULT_MODEL)
            .with_base_url(Some(server.uri()))
            .generate(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::AuthenticationFailed(_)));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[test]
    fn message_hints() {
        assert_eq!(
            hint_from_message("Please retry. seconds: 42"),
            Some(Duration::from_secs(42))
        );
        assert_eq!(
            hint_from_message("Please retry in 7 seconds."),
            Some(Duration::from_secs(7))
        );
        assert_eq!(hint_from_message("try later"), None);
        assert_eq!(parse_proto_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_proto_duration("soon"), None);
    }
}
