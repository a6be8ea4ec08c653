//! The `psytest validate` command.

use std::path::PathBuf;

use anyhow::Result;

use psytest_core::parser::{load_sessions, validate_session};

pub fn execute(session_path: PathBuf) -> Result<()> {
    let sessions = load_sessions(&session_path)?;

    let mut total_warnings = 0;

    for (index, session) in sessions.iter().enumerate() {
        let name = session
            .session_id
            .clone()
            .unwrap_or_else(|| format!("session-{}", index + 1));
        println!(
            "Session: {name} ({}, {} answers)",
            session.test_type,
            session.answers.len()
        );

        let warnings = validate_session(session);
        for w in &warnings {
            let prefix = w
                .question
                .map(|q| format!("  [q{q}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All sessions valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
