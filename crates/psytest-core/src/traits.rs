//! Trait definitions for narrative text generation.
//!
//! The scorers only depend on [`TextGenerator`]; concrete backends live in
//! `psytest-providers`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::model::TokenUsage;

// ---------------------------------------------------------------------------
// Text generator trait
// ---------------------------------------------------------------------------

/// Trait for LLM backends that turn a prompt into narrative text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Human-readable backend name (e.g. "gemini").
    fn name(&self) -> &str;

    /// Generate text for a single prompt. One call is one attempt; retries
    /// are the caller's business.
    async fn generate(&self, request: &GenerateRequest)
        -> Result<GenerateResponse, GenerationError>;
}

/// Request to generate text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The main prompt.
    pub prompt: String,
    /// Optional system instruction.
    #[serde(default)]
    pub system_instruction: Option<String>,
    /// Maximum tokens to generate.
    pub max_output_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: None,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }
}

/// Response from a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The generated text, with any wrapping code fence removed.
    pub text: String,
    /// Model that actually produced the text.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 32_768;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

// ---------------------------------------------------------------------------
// Sleeper trait
// ---------------------------------------------------------------------------

/// Something that can wait. Swapped out in tests to observe backoff.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// Response cleanup
// ---------------------------------------------------------------------------

/// Strip a code fence wrapping the whole response.
///
/// Models sometimes return the report as a single ```` ```markdown ```` block.
/// Fences inside the text are left alone.
pub fn strip_outer_fence(response: &str) -> String {
    let trimmed = response.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let Some(first_newline) = trimmed.find('\n') else {
        return trimmed.to_string();
    };
    let lang = trimmed[3..first_newline].trim().to_lowercase();
    if !(lang.is_empty() || lang == "markdown" || lang == "md") {
        return trimmed.to_string();
    }
    let body = &trimmed[first_newline + 1..];
    // Truncated responses may lack the closing fence.
    let body = body.strip_suffix("```").unwrap_or(body);
    body.trim().to_string()
}
