//! Scoring engine: the single entry point the session layer calls when a
//! test is completed, plus bounded-concurrency batch scoring.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;

use crate::error::ScoringError;
use crate::model::{RawAnswer, ScoredResult, TestType};
use crate::parser::SessionInput;
use crate::personality;
use crate::productivity;
use crate::raven;
use crate::report::{self, ScorerOutput};
use crate::retry::RetryPolicy;
use crate::traits::{
    strip_outer_fence, GenerateRequest, Sleeper, TextGenerator, TokioSleeper,
    DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE,
};

pub const PERSONALITY_SYSTEM_INSTRUCTION: &str = "Ты опытный психолог-консультант. \
Тебе дан цифровой профиль личностных качеств кандидата по шкале от 0 до 20. \
Напиши интерпретацию профиля на русском языке: общий портрет, сильные стороны, \
зоны развития и рекомендации. Используй заголовки '###', выделение '**жирным**' \
и списки со строк '- '. Не повторяй сам профиль и не используй заголовки '#### ЧАСТЬ'.";

/// Configuration for the scoring engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retry behavior for generator calls.
    pub retry: RetryPolicy,
    /// Ask the generator for a personality interpretation instead of the
    /// fixed per-trait descriptions.
    pub personality_narrative: bool,
    /// Maximum sessions scored at once by [`ScoringEngine::score_batch`].
    pub parallelism: usize,
    /// Sampling temperature for generation.
    pub temperature: f64,
    /// Max tokens for generation.
    pub max_output_tokens: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            personality_narrative: true,
            parallelism: 4,
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

/// Progress reporting for batch scoring.
pub trait ProgressReporter: Send + Sync {
    fn on_session_start(&self, session_id: &str, test_type: TestType);
    fn on_session_complete(&self, session_id: &str, result: &ScoredResult);
    fn on_session_error(&self, session_id: &str, error: &ScoringError);
    fn on_batch_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_session_start(&self, _: &str, _: TestType) {}
    fn on_session_complete(&self, _: &str, _: &ScoredResult) {}
    fn on_session_error(&self, _: &str, _: &ScoringError) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// Outcome of one session in a batch.
#[derive(Debug)]
pub struct SessionOutcome {
    pub session_id: String,
    pub test_type: TestType,
    pub result: Result<ScoredResult, ScoringError>,
}

/// The scoring engine. Stateless between calls; safe to share across tasks.
pub struct ScoringEngine {
    generator: Arc<dyn TextGenerator>,
    sleeper: Arc<dyn Sleeper>,
    config: EngineConfig,
}

impl ScoringEngine {
    pub fn new(generator: Arc<dyn TextGenerator>, config: EngineConfig) -> Self {
        Self {
            generator,
            sleeper: Arc::new(TokioSleeper),
            config,
        }
    }

    /// Replace the sleeper used between retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn request_template(&self) -> GenerateRequest {
        GenerateRequest {
            prompt: String::new(),
            system_instruction: None,
            max_output_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
        }
    }

    /// Score one completed session.
    pub async fn score_test(
        &self,
        test_type: TestType,
        answers: &[RawAnswer],
        candidate_age: Option<u32>,
    ) -> Result<ScoredResult, ScoringError> {
        let output = match test_type {
            TestType::IqTest => ScorerOutput::Iq(raven::score(answers, candidate_age)?),
            TestType::PersonalQualities => {
                let profile = personality::score(answers)?;
                let narrative = if self.config.personality_narrative {
                    Some(self.interpret_profile(&profile).await?)
                } else {
                    None
                };
                ScorerOutput::Personality { profile, narrative }
            }
            TestType::Productivity => ScorerOutput::Productivity(
                productivity::assess(
                    answers,
                    self.generator.as_ref(),
                    &self.config.retry,
                    self.sleeper.as_ref(),
                    &self.request_template(),
                )
                .await?,
            ),
        };

        let result = report::assemble(output)?;
        tracing::info!(
            test_type = %test_type,
            answers = answers.len(),
            raw_score = ?result.raw_score,
            iq_score = ?result.iq_score,
            "scored session"
        );
        Ok(result)
    }

    async fn interpret_profile(
        &self,
        profile: &personality::PersonalityProfile,
    ) -> Result<String, ScoringError> {
        let request = GenerateRequest {
            prompt: format!(
                "Цифровой профиль кандидата:\n\n{}",
                report::render_profile(profile)
            ),
            system_instruction: Some(PERSONALITY_SYSTEM_INSTRUCTION.to_string()),
            ..self.request_template()
        };
        let response = self
            .config
            .retry
            .generate(self.generator.as_ref(), &request, self.sleeper.as_ref())
            .await?;
        Ok(strip_outer_fence(&response.text))
    }

    /// Score many sessions concurrently, at most `parallelism` at a time.
    ///
    /// One session failing does not affect the others. Outcomes come back in
    /// completion order.
    pub async fn score_batch(
        self: &Arc<Self>,
        sessions: Vec<SessionInput>,
        progress: &dyn ProgressReporter,
    ) -> Vec<SessionOutcome> {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut futures = FuturesUnordered::new();

        for (index, session) in sessions.into_iter().enumerate() {
            let engine = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let session_id = session
                .session_id
                .clone()
                .unwrap_or_else(|| format!("session-{}", index + 1));

            futures.push(async move {
                // The semaphore is never closed, so a failed acquire cannot happen.
                let _permit = semaphore.acquire_owned().await.ok();
                progress.on_session_start(&session_id, session.test_type);
                let result = engine
                    .score_test(session.test_type, &session.answers, session.candidate_age)
                    .await;
                SessionOutcome {
                    session_id,
                    test_type: session.test_type,
                    result,
                }
            });
        }

        let total = futures.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut completed = 0usize;
        let mut failed = 0usize;

        while let Some(outcome) = futures.next().await {
            match &outcome.result {
                Ok(result) => {
                    progress.on_session_complete(&outcome.session_id, result);
                    completed += 1;
                }
                Err(e) => {
                    tracing::error!("scoring failed for {}: {e}", outcome.session_id);
                    progress.on_session_error(&outcome.session_id, e);
                    failed += 1;
                }
            }
            outcomes.push(outcome);
        }

        progress.on_batch_complete(total, completed, failed, start.elapsed());
        outcomes
    }
}
