//! Report assembly: every scorer output becomes the same [`ScoredResult`]
//! shape, with JSON persistence.
//!
//! The personality report embeds a fixed-format profile that downstream
//! renderers parse into a chart:
//!
//! ```text
//! #### ЧАСТЬ 1: ЦИФРОВОЙ ПРОФИЛЬ
//! Внимательность [████████████░░░░░░░░] 11.5/20 (Средний уровень)
//! ...
//! #### ЧАСТЬ 2: ИНТЕРПРЕТАЦИЯ
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{AggregationError, ScoringError};
use crate::model::ScoredResult;
use crate::personality::{self, fmt_score, PersonalityProfile, SCALE_MAX};
use crate::productivity::ProductivityAssessment;
use crate::raven::{self, IqScore};

pub const PROFILE_HEADER: &str = "#### ЧАСТЬ 1: ЦИФРОВОЙ ПРОФИЛЬ";
pub const INTERPRETATION_HEADER: &str = "#### ЧАСТЬ 2: ИНТЕРПРЕТАЦИЯ";

const BAR_CELLS: usize = 20;
const BAR_FILLED: char = '█';
const BAR_EMPTY: char = '░';

/// What a scorer hands to the assembler.
#[derive(Debug, Clone, PartialEq)]
pub enum ScorerOutput {
    Iq(IqScore),
    Personality {
        profile: PersonalityProfile,
        /// Generated interpretation; the fixed descriptions are used if absent.
        narrative: Option<String>,
    },
    Productivity(ProductivityAssessment),
}

/// Package a scorer output into the uniform result record.
///
/// Generated text that is blank once trimmed is refused rather than stored
/// as an empty report.
pub fn assemble(output: ScorerOutput) -> Result<ScoredResult, ScoringError> {
    let generated = match &output {
        ScorerOutput::Iq(_) => None,
        ScorerOutput::Personality { narrative, .. } => narrative.as_deref(),
        ScorerOutput::Productivity(assessment) => Some(assessment.narrative.as_str()),
    };
    if generated.is_some_and(|text| text.trim().is_empty()) {
        return Err(AggregationError::EmptyOutput.into());
    }
    Ok(match output {
        ScorerOutput::Iq(score) => assemble_iq(&score),
        ScorerOutput::Personality { profile, narrative } => {
            assemble_personality(&profile, narrative.as_deref())
        }
        ScorerOutput::Productivity(assessment) => assemble_productivity(&assessment),
    })
}

fn assemble_iq(score: &IqScore) -> ScoredResult {
    let series: serde_json::Map<String, Value> = score
        .series
        .iter()
        .map(|(k, v)| (k.clone(), json!(v)))
        .collect();

    let mut scores_json = BTreeMap::new();
    scores_json.insert("raw_score".into(), json!(score.raw_score));
    scores_json.insert("base_iq".into(), json!(score.base_iq));
    scores_json.insert("age_coefficient".into(), json!(score.age_coefficient));
    scores_json.insert("final_iq".into(), json!(score.final_iq));
    scores_json.insert("series".into(), Value::Object(series));
    scores_json.insert("answered".into(), json!(score.answered));
    scores_json.insert("excluded".into(), json!(score.excluded));

    let mut report_json = scores_json.clone();
    report_json.insert("age".into(), json!(score.age));
    report_json.insert("iq_level".into(), json!(score.level));

    ScoredResult {
        raw_score: Some(score.raw_score),
        final_score: Some(score.final_iq as f64),
        iq_score: Some(score.final_iq),
        iq_level: score.level.clone(),
        scores_json,
        report: raven::render_report(score),
        report_json,
    }
}

fn assemble_personality(profile: &PersonalityProfile, narrative: Option<&str>) -> ScoredResult {
    let scores_json: BTreeMap<String, Value> = profile
        .traits
        .iter()
        .map(|t| (t.name.clone(), json!({ "score": t.score, "level": t.level })))
        .collect();

    let traits: Vec<Value> = profile
        .traits
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "score": t.score,
                "level": t.level,
                "items": t.items,
                "max": SCALE_MAX,
            })
        })
        .collect();
    let mut report_json = BTreeMap::new();
    report_json.insert("traits".into(), Value::Array(traits));
    report_json.insert("excluded".into(), json!(profile.excluded));

    ScoredResult {
        raw_score: None,
        final_score: None,
        iq_score: None,
        iq_level: String::new(),
        scores_json,
        report: personality_report(profile, narrative),
        report_json,
    }
}

fn assemble_productivity(assessment: &ProductivityAssessment) -> ScoredResult {
    let blocks: serde_json::Map<String, Value> = assessment
        .answers_by_block
        .iter()
        .map(|(block, answers)| (block.clone(), json!(answers.len())))
        .collect();

    let mut scores_json = BTreeMap::new();
    scores_json.insert("answered".into(), json!(assessment.answered()));
    scores_json.insert("blocks".into(), Value::Object(blocks));

    let mut report_json = BTreeMap::new();
    report_json.insert(
        "answers_by_block".into(),
        serde_json::to_value(&assessment.answers_by_block).unwrap_or(Value::Null),
    );
    report_json.insert("model".into(), json!(assessment.model));
    report_json.insert("latency_ms".into(), json!(assessment.latency_ms));

    ScoredResult {
        raw_score: None,
        final_score: None,
        iq_score: None,
        iq_level: String::new(),
        scores_json,
        report: assessment.narrative.clone(),
        report_json,
    }
}

/// A 20-cell bar with one filled cell per rounded point.
pub fn score_bar(score: f64) -> String {
    let filled = (score.clamp(0.0, SCALE_MAX).round() as usize).min(BAR_CELLS);
    let mut bar = String::with_capacity(BAR_CELLS * 3 + 2);
    bar.push('[');
    bar.extend(std::iter::repeat(BAR_FILLED).take(filled));
    bar.extend(std::iter::repeat(BAR_EMPTY).take(BAR_CELLS - filled));
    bar.push(']');
    bar
}

/// The fixed-format profile section.
pub fn render_profile(profile: &PersonalityProfile) -> String {
    let mut out = String::new();
    out.push_str(PROFILE_HEADER);
    out.push_str("\n\n");
    for t in &profile.traits {
        out.push_str(&format!(
            "{} {} {}/20 ({})\n",
            t.name,
            score_bar(t.score),
            fmt_score(t.score),
            t.level
        ));
    }
    out
}

/// Full personality report: profile section, then interpretation.
pub fn personality_report(profile: &PersonalityProfile, narrative: Option<&str>) -> String {
    let mut report = String::from("## Оценка личностных качеств\n\n");
    report.push_str(&render_profile(profile));
    report.push('\n');
    report.push_str(INTERPRETATION_HEADER);
    report.push_str("\n\n");
    match narrative {
        Some(text) => report.push_str(text.trim()),
        None => {
            for t in &profile.traits {
                report.push_str("- ");
                report.push_str(&personality::describe(t));
                report.push('\n');
            }
        }
    }
    report.push('\n');
    report
}

/// One trait line recovered from a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileLine {
    pub name: String,
    pub score: f64,
    pub level: String,
}

/// Read the profile section back out of a report, the way a renderer does.
///
/// Lines between the part 1 header and the next `#### ЧАСТЬ` header that
/// don't match `Name [bar] score/20 (Level)` are ignored.
pub fn parse_profile(report: &str) -> Vec<ProfileLine> {
    let mut lines = Vec::new();
    let mut in_profile = false;
    for line in report.lines().map(str::trim) {
        if line.contains("ЦИФРОВОЙ ПРОФИЛЬ") || line.starts_with("#### ЧАСТЬ 1:") {
            in_profile = true;
            continue;
        }
        if in_profile && line.starts_with("#### ЧАСТЬ") {
            break;
        }
        if in_profile {
            if let Some(parsed) = parse_profile_line(line) {
                lines.push(parsed);
            }
        }
    }
    lines
}

fn parse_profile_line(line: &str) -> Option<ProfileLine> {
    let open = line.find('[')?;
    let name = line[..open].trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    let close = open + line[open..].find(']')?;
    let rest = line[close + 1..].trim_start();
    let (score, rest) = rest.split_once("/20")?;
    let score: f64 = score.trim().parse().ok()?;
    let level = rest.trim().strip_prefix('(')?.strip_suffix(')')?.trim();
    Some(ProfileLine {
        name: name.to_string(),
        score,
        level: level.to_string(),
    })
}

impl ScoredResult {
    /// Save the result as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize result")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write result to {}", path.display()))?;
        Ok(())
    }

    /// Load a result from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read result from {}", path.display()))?;
        serde_json::from_str(&content).context("failed to parse result JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuestionType, RawAnswer};
    use crate::productivity::OpenAnswer;

    fn profile() -> PersonalityProfile {
        let mut answers = Vec::new();
        for (i, value) in ["yes", "yes", "sometimes", "no"].iter().enumerate() {
            answers.push(
                RawAnswer::new(i as u32 + 1, *value)
                    .with_block("Внимательность", QuestionType::Direct),
            );
        }
        answers.push(RawAnswer::new(10, "yes").with_block("Чуткость", QuestionType::Reverse));
        personality::score(&answers).unwrap()
    }

    #[test]
    fn blank_generated_text_is_refused() {
        let err = assemble(ScorerOutput::Personality {
            profile: profile(),
            narrative: Some(" \n".into()),
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ScoringError::Aggregation(AggregationError::EmptyOutput)
        ));

        let err = assemble(ScorerOutput::Productivity(ProductivityAssessment {
            answers_by_block: BTreeMap::new(),
            narrative: String::new(),
            model: "mock".into(),
            latency_ms: 0,
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ScoringError::Aggregation(AggregationError::EmptyOutput)
        ));
    }

    #[test]
    fn iq_result_fields() {
        let score = raven::score(&[RawAnswer::new(1, 4)], Some(22)).unwrap();
        let result = assemble(ScorerOutput::Iq(score)).unwrap();
        assert_eq!(result.raw_score, Some(1));
        assert_eq!(result.iq_score, Some(70));
        assert_eq!(result.final_score, Some(70.0));
        assert_eq!(result.iq_level, raven::LEVEL_LOW);
        assert_eq!(result.scores_json["series"]["A"], json!(1));
        assert_eq!(result.report_json["iq_level"], json!(raven::LEVEL_LOW));
    }

    #[test]
    fn personality_result_round_trips_through_profile_parser() {
        let profile = profile();
        let result = assemble(ScorerOutput::Personality {
            profile: profile.clone(),
            narrative: None,
        })
        .unwrap();

        assert!(result.raw_score.is_none());
        assert!(result.iq_score.is_none());
        assert_eq!(
            result.scores_json["Внимательность"],
            json!({"score": 12.5, "level": personality::LEVEL_MEDIUM})
        );

        let parsed = parse_profile(&result.report);
        assert_eq!(parsed.len(), profile.traits.len());
        for (line, t) in parsed.iter().zip(&profile.traits) {
            assert_eq!(line.name, t.name);
            assert_eq!(line.score, t.score);
            assert_eq!(line.level, t.level);
        }
    }

    #[test]
    fn narrative_goes_after_profile() {
        let report = personality_report(&profile(), Some("### Выводы\n\n- **Чуткость** развита слабо"));
        let profile_at = report.find(PROFILE_HEADER).unwrap();
        let part2_at = report.find(INTERPRETATION_HEADER).unwrap();
        let narrative_at = report.find("### Выводы").unwrap();
        assert!(profile_at < part2_at && part2_at < narrative_at);
    }

    #[test]
    fn bar_rendering() {
        assert_eq!(score_bar(0.0), format!("[{}]", "░".repeat(20)));
        assert_eq!(score_bar(20.0), format!("[{}]", "█".repeat(20)));
        assert_eq!(
            score_bar(11.5),
            format!("[{}{}]", "█".repeat(12), "░".repeat(8))
        );
    }

    #[test]
    fn parser_matches_renderer_line_format() {
        let report = "intro\n#### ЧАСТЬ 1: ЦИФРОВОЙ ПРОФИЛЬ\n\
            Внимательность [████████████░░░░░░░░] 11.5/20 (Средний уровень)\n\
            not a profile line\n\
            #### ЧАСТЬ 2: ИНТЕРПРЕТАЦИЯ\n\
            Позитивность [██] 2.0/20 (Низкий уровень)\n";
        let parsed = parse_profile(report);
        assert_eq!(
            parsed,
            vec![ProfileLine {
                name: "Внимательность".into(),
                score: 11.5,
                level: "Средний уровень".into(),
            }]
        );
    }

    #[test]
    fn productivity_result_has_no_numeric_scores() {
        let mut blocks = BTreeMap::new();
        blocks.insert(
            "Результат".to_string(),
            vec![OpenAnswer {
                question_number: 1,
                question: None,
                answer: "ответ".into(),
            }],
        );
        let result = assemble(ScorerOutput::Productivity(ProductivityAssessment {
            answers_by_block: blocks,
            narrative: "## Отчет".into(),
            model: "mock".into(),
            latency_ms: 3,
        }))
        .unwrap();
        assert_eq!(result.raw_score, None);
        assert_eq!(result.iq_score, None);
        assert_eq!(result.report, "## Отчет");
        assert_eq!(result.scores_json["answered"], json!(1));
        assert_eq!(result.report_json["model"], json!("mock"));
    }

    #[test]
    fn json_roundtrip() {
        let result = assemble(ScorerOutput::Personality {
            profile: profile(),
            narrative: None,
        })
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");

        result.save_json(&path).unwrap();
        let loaded = ScoredResult::load_json(&path).unwrap();

        assert_eq!(loaded.report, result.report);
        assert_eq!(loaded.scores_json.len(), result.scores_json.len());
    }
}
