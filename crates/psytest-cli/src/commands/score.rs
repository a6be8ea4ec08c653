//! The `psytest score` command.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use comfy_table::{Cell, Table};

use psytest_core::engine::{ProgressReporter, ScoringEngine, SessionOutcome};
use psytest_core::error::ScoringError;
use psytest_core::model::{ScoredResult, TestType};
use psytest_core::parser::load_sessions;
use psytest_providers::{create_generator, load_config_from};

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_session_start(&self, session_id: &str, test_type: TestType) {
        eprintln!("  Starting: {session_id} ({test_type})");
    }

    fn on_session_complete(&self, session_id: &str, result: &ScoredResult) {
        let detail = match (result.iq_score, result.raw_score) {
            (Some(iq), Some(raw)) => format!(" raw {raw}/60, IQ {iq}"),
            _ => String::new(),
        };
        eprintln!("  Done: {session_id}{detail}");
    }

    fn on_session_error(&self, session_id: &str, error: &ScoringError) {
        eprintln!("  ERROR: {session_id}: {error}");
    }

    fn on_batch_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {completed}/{total} scored, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    session_path: PathBuf,
    output: PathBuf,
    config_path: Option<PathBuf>,
    parallelism: Option<usize>,
) -> Result<()> {
    if let Some(n) = parallelism {
        anyhow::ensure!(n >= 1, "parallelism must be at least 1");
    }

    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(n) = parallelism {
        config.scoring.parallelism = n;
    }
    tracing::debug!(?config, "configuration loaded");

    let sessions = load_sessions(&session_path)?;
    anyhow::ensure!(
        !sessions.is_empty(),
        "no sessions found in {}",
        session_path.display()
    );

    let generator = create_generator(&config.gemini);
    let engine = Arc::new(ScoringEngine::new(generator, config.engine_config()));

    eprintln!("psytest v{} - Scoring {} session(s)", env!("CARGO_PKG_VERSION"), sessions.len());
    eprintln!();

    let outcomes = engine.score_batch(sessions, &ConsoleReporter).await;

    print_summary(&outcomes);

    std::fs::create_dir_all(&output)?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S").to_string();
    let mut taken = HashSet::new();
    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(result) => {
                let path = result_path(&output, &outcome.session_id, &timestamp, &mut taken);
                result.save_json(&path)?;
                eprintln!("Result saved to: {}", path.display());
            }
            Err(_) => failed += 1,
        }
    }

    anyhow::ensure!(failed == 0, "{failed} session(s) failed to score");
    Ok(())
}

/// File name for one session's result. Names already in `taken` get a
/// numeric suffix, so sessions in one batch never overwrite each other.
fn result_path(
    output: &Path,
    session_id: &str,
    timestamp: &str,
    taken: &mut HashSet<PathBuf>,
) -> PathBuf {
    let safe: String = session_id
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let mut path = output.join(format!("result-{safe}-{timestamp}.json"));
    let mut n = 2;
    while !taken.insert(path.clone()) {
        path = output.join(format!("result-{safe}-{timestamp}-{n}.json"));
        n += 1;
    }
    path
}

fn print_summary(outcomes: &[SessionOutcome]) {
    let mut table = Table::new();
    table.set_header(vec!["Session", "Test", "Raw", "IQ", "Level / Score", "Status"]);

    let mut sorted: Vec<&SessionOutcome> = outcomes.iter().collect();
    sorted.sort_by(|a, b| a.session_id.cmp(&b.session_id));

    for outcome in sorted {
        let row = match &outcome.result {
            Ok(result) => vec![
                Cell::new(&outcome.session_id),
                Cell::new(outcome.test_type),
                Cell::new(result.raw_score.map_or("-".into(), |r| r.to_string())),
                Cell::new(result.iq_score.map_or("-".into(), |iq| iq.to_string())),
                Cell::new(summary_level(outcome.test_type, result)),
                Cell::new("OK"),
            ],
            Err(e) => vec![
                Cell::new(&outcome.session_id),
                Cell::new(outcome.test_type),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new(format!("FAILED: {e}")),
            ],
        };
        table.add_row(row);
    }

    println!("{table}");
}

fn summary_level(test_type: TestType, result: &ScoredResult) -> String {
    match test_type {
        TestType::IqTest => result.iq_level.clone(),
        TestType::PersonalQualities => format!("{} traits", result.scores_json.len()),
        TestType::Productivity => "narrative".to_string(),
    }
}
