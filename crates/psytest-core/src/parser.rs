//! Session file parser.
//!
//! Loads candidate sessions from JSON or TOML files and directories, and
//! validates them before scoring.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::answer_key::{MAX_CHOICE, TOTAL_QUESTIONS};
use crate::model::{RawAnswer, TestType};
use crate::personality::item_value;

/// One candidate's answers to one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub test_type: TestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_age: Option<u32>,
    #[serde(default)]
    pub answers: Vec<RawAnswer>,
}

/// Parse a single session file. The format follows the extension:
/// `.toml` is TOML, anything else is JSON.
pub fn parse_session(path: &Path) -> Result<SessionInput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read session file: {}", path.display()))?;

    if path.extension().is_some_and(|ext| ext == "toml") {
        parse_session_toml(&content, path)
    } else {
        parse_session_json(&content, path)
    }
}

/// Parse a JSON session (useful for testing).
pub fn parse_session_json(content: &str, source_path: &Path) -> Result<SessionInput> {
    serde_json::from_str(content)
        .with_context(|| format!("failed to parse JSON: {}", source_path.display()))
}

/// Parse a TOML session (useful for testing).
pub fn parse_session_toml(content: &str, source_path: &Path) -> Result<SessionInput> {
    toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))
}

/// Recursively load all `.json` and `.toml` sessions from a directory.
///
/// Unreadable files are skipped with a warning. Sessions are returned in
/// path order.
pub fn load_session_directory(dir: &Path) -> Result<Vec<SessionInput>> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        paths.push(entry?.path());
    }
    paths.sort();

    let mut sessions = Vec::new();
    for path in paths {
        if path.is_dir() {
            sessions.extend(load_session_directory(&path)?);
        } else if path
            .extension()
            .is_some_and(|ext| ext == "json" || ext == "toml")
        {
            match parse_session(&path) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(sessions)
}

/// Load a single file or a whole directory.
pub fn load_sessions(path: &Path) -> Result<Vec<SessionInput>> {
    if path.is_dir() {
        load_session_directory(path)
    } else {
        Ok(vec![parse_session(path)?])
    }
}

/// A warning from session validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// The question number (if applicable).
    pub question: Option<u32>,
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    fn at(question: u32, message: impl Into<String>) -> Self {
        Self {
            question: Some(question),
            message: message.into(),
        }
    }
}

/// Check a session for problems that would drop or reject answers.
pub fn validate_session(session: &SessionInput) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if session.answers.is_empty() {
        warnings.push(ValidationWarning {
            question: None,
            message: "session has no answers".into(),
        });
        return warnings;
    }

    let mut seen = HashSet::new();
    for answer in &session.answers {
        if !seen.insert(answer.question_number) {
            warnings.push(ValidationWarning::at(
                answer.question_number,
                format!(
                    "duplicate question number {}, the last answer wins",
                    answer.question_number
                ),
            ));
        }
    }

    for answer in &session.answers {
        let q = answer.question_number;
        match session.test_type {
            TestType::IqTest => {
                if !(1..=TOTAL_QUESTIONS).contains(&q) {
                    warnings.push(ValidationWarning::at(
                        q,
                        format!("question number outside 1..={TOTAL_QUESTIONS}, will be ignored"),
                    ));
                }
                match answer.answer.as_choice() {
                    None => warnings.push(ValidationWarning::at(
                        q,
                        format!("answer '{}' is not a number", answer.answer),
                    )),
                    Some(choice) if !(1..=MAX_CHOICE).contains(&choice) => {
                        warnings.push(ValidationWarning::at(
                            q,
                            format!("choice {choice} outside 1..={MAX_CHOICE}"),
                        ))
                    }
                    Some(_) => {}
                }
            }
            TestType::PersonalQualities => {
                if answer.block().is_none() {
                    warnings.push(ValidationWarning::at(
                        q,
                        "no block name, answer does not count toward any trait",
                    ));
                }
                if let Err(e) = item_value(q, &answer.answer.as_text(), answer.question_type) {
                    warnings.push(ValidationWarning::at(q, e.to_string()));
                }
            }
            TestType::Productivity => {
                if answer.answer.is_blank() {
                    warnings.push(ValidationWarning::at(q, "blank answer"));
                }
            }
        }
    }

    warnings
}
