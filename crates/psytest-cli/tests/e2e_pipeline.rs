//! End-to-end pipeline tests: session files through the engine with the mock
//! generator, down to persisted results.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use psytest_core::engine::{EngineConfig, NoopReporter, ScoringEngine};
use psytest_core::error::{ExternalServiceError, GenerationError, ScoringError};
use psytest_core::model::{ScoredResult, TestType};
use psytest_core::parser::{load_session_directory, parse_session};
use psytest_core::report::parse_profile;
use psytest_core::traits::Sleeper;
use psytest_providers::{MockGenerator, PsytestConfig};

#[derive(Default)]
struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn engine(generator: Arc<MockGenerator>, sleeper: Arc<RecordingSleeper>) -> ScoringEngine {
    ScoringEngine::new(generator, PsytestConfig::default().engine_config()).with_sleeper(sleeper)
}

#[tokio::test]
async fn e2e_iq_session_to_json() {
    let session = parse_session(&fixture("iq_session.json")).unwrap();
    let generator = Arc::new(MockGenerator::with_fixed_response("unused"));
    let engine = engine(generator.clone(), Arc::default());

    let result = engine
        .score_test(session.test_type, &session.answers, session.candidate_age)
        .await
        .unwrap();

    assert_eq!(result.raw_score, Some(36));
    assert_eq!(result.iq_score, Some(98));
    assert_eq!(generator.call_count(), 0);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("result.json");
    result.save_json(&path).unwrap();
    let loaded = ScoredResult::load_json(&path).unwrap();
    assert_eq!(loaded.iq_score, result.iq_score);
    assert_eq!(loaded.iq_level, "Средний интеллект");
    assert_eq!(loaded.report, result.report);
}

#[tokio::test]
async fn e2e_personality_with_narrative() {
    let session = parse_session(&fixture("personality_session.toml")).unwrap();
    let generator = Arc::new(MockGenerator::with_fixed_response(
        "```markdown\n### Общий портрет\n\nОтветственный кандидат.\n```",
    ));
    let engine = engine(generator.clone(), Arc::default());

    let result = engine
        .score_test(TestType::PersonalQualities, &session.answers, None)
        .await
        .unwrap();

    assert_eq!(generator.call_count(), 1);
    let request = generator.last_request().unwrap();
    assert!(request.prompt.contains("Ответственность"));
    assert!(request.system_instruction.is_some());

    assert!(result.report.contains("Ответственный кандидат."));
    assert!(!result.report.contains("```"));

    let lines = parse_profile(&result.report);
    let responsibility = lines
        .iter()
        .find(|l| l.name == "Ответственность")
        .unwrap();
    assert_eq!(responsibility.score, 20.0);
    assert_eq!(responsibility.level, "Высокий уровень");
}

#[tokio::test]
async fn e2e_productivity_retries_rate_limit() {
    let session = parse_session(&fixture("productivity_session.json")).unwrap();
    let generator = Arc::new(
        MockGenerator::with_fixed_response("## Продуктивность\n\n**Высокая**").failing_first(
            vec![GenerationError::RateLimited {
                retry_after: Some(Duration::from_secs(17)),
            }],
        ),
    );
    let sleeper = Arc::new(RecordingSleeper::default());
    let engine = engine(generator.clone(), sleeper.clone());

    let result = engine
        .score_test(session.test_type, &session.answers, None)
        .await
        .unwrap();

    assert_eq!(generator.call_count(), 2);
    assert_eq!(
        *sleeper.waits.lock().unwrap(),
        vec![Duration::from_secs(19)]
    );
    assert!(result.report.contains("**Высокая**"));
    assert!(result.raw_score.is_none());
    assert!(generator
        .last_request()
        .unwrap()
        .prompt
        .contains("Запустил новый продукт"));
}

#[tokio::test]
async fn e2e_productivity_gives_up_after_retries() {
    let session = parse_session(&fixture("productivity_session.json")).unwrap();
    let generator = Arc::new(MockGenerator::with_fixed_response("never").failing_first(vec![
        GenerationError::Timeout(240),
        GenerationError::Timeout(240),
        GenerationError::Timeout(240),
    ]));
    let sleeper = Arc::new(RecordingSleeper::default());
    let engine = engine(generator.clone(), sleeper.clone());

    let err = engine
        .score_test(session.test_type, &session.answers, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ScoringError::ExternalService(ExternalServiceError::RetriesExhausted { attempts: 3, .. })
    ));
    assert_eq!(generator.call_count(), 3);
    assert_eq!(
        *sleeper.waits.lock().unwrap(),
        vec![Duration::from_secs(5), Duration::from_secs(10)]
    );
}

#[tokio::test]
async fn e2e_batch_over_fixture_directory() {
    let sessions = load_session_directory(&fixture("")).unwrap();
    assert_eq!(sessions.len(), 3);

    let generator = Arc::new(MockGenerator::with_fixed_response("## Отчет"));
    let engine = Arc::new(ScoringEngine::new(
        generator,
        EngineConfig {
            parallelism: 2,
            ..EngineConfig::default()
        },
    ));

    let outcomes = engine.score_batch(sessions, &NoopReporter).await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.result.is_ok()));
    let mut ids: Vec<&str> = outcomes.iter().map(|o| o.session_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["iq-candidate-1", "pq-candidate-1", "prod-candidate-1"]);
}
