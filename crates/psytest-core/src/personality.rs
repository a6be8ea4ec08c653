//! Personality-qualities scoring.
//!
//! Each block of yes/no/sometimes items is one trait scale. Items are scored
//! through a fixed value table, inverted for reverse items, summed per block
//! and normalized to a 0-20 scale by the number of answered items.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AggregationError, ScoringError, ValidationError};
use crate::model::{QuestionType, RawAnswer};

/// Upper bound of every trait scale.
pub const SCALE_MAX: f64 = 20.0;

pub const LEVEL_LOW: &str = "Низкий уровень";
pub const LEVEL_MEDIUM: &str = "Средний уровень";
pub const LEVEL_HIGH: &str = "Высокий уровень";
pub const LEVEL_UNDETERMINED: &str = "Не определен";

/// The ten traits of the inventory, in profile order.
pub const CANONICAL_TRAITS: [&str; 10] = [
    "Внимательность",
    "Позитивность",
    "Самообладание",
    "Ответственность",
    "Уверенность",
    "Активность",
    "Настойчивость",
    "Объективность",
    "Чуткость",
    "Общительность",
];

/// One scored trait scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitScore {
    pub name: String,
    /// Normalized score on the 0-20 scale.
    pub score: f64,
    pub level: String,
    /// Sum of item contributions before normalization.
    pub raw_sum: f64,
    /// Items answered in this block.
    pub items: u32,
}

/// A full personality profile in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityProfile {
    pub traits: Vec<TraitScore>,
    /// Answers skipped for lacking a block name.
    pub excluded: u32,
}

impl PersonalityProfile {
    pub fn get(&self, name: &str) -> Option<&TraitScore> {
        self.traits.iter().find(|t| t.name == name)
    }
}

/// Contribution of a single item, already adjusted for polarity.
pub fn item_value(
    question: u32,
    answer: &str,
    question_type: QuestionType,
) -> Result<f64, ValidationError> {
    let direct = match answer.trim().to_lowercase().as_str() {
        "yes" | "да" => 1.0,
        "sometimes" | "иногда" => 0.5,
        "no" | "нет" => 0.0,
        _ => {
            return Err(ValidationError::UnknownAnswer {
                question,
                value: answer.to_string(),
            })
        }
    };
    Ok(match question_type {
        QuestionType::Direct => direct,
        QuestionType::Reverse => 1.0 - direct,
    })
}

/// Level band for a normalized score.
pub fn trait_level(score: f64, items: u32) -> &'static str {
    if items == 0 {
        LEVEL_UNDETERMINED
    } else if score < 7.0 {
        LEVEL_LOW
    } else if score < 14.0 {
        LEVEL_MEDIUM
    } else {
        LEVEL_HIGH
    }
}

/// Scale a block sum onto 0-20 by its item count, one decimal place.
pub fn normalize(raw_sum: f64, items: u32) -> f64 {
    if items == 0 {
        return 0.0;
    }
    let scaled = raw_sum / items as f64 * SCALE_MAX;
    ((scaled * 10.0).round() / 10.0).clamp(0.0, SCALE_MAX)
}

/// Score personality answers into a trait profile.
///
/// Order of answers does not matter. A repeated question number keeps its
/// last answer. The ten canonical traits always appear; any other block
/// names follow them alphabetically.
pub fn score(answers: &[RawAnswer]) -> Result<PersonalityProfile, ScoringError> {
    if answers.is_empty() {
        return Err(AggregationError::NoValidAnswers("personal_qualities".into()).into());
    }

    let mut latest: BTreeMap<u32, &RawAnswer> = BTreeMap::new();
    for answer in answers {
        latest.insert(answer.question_number, answer);
    }

    let mut sums: BTreeMap<&str, (f64, u32)> = BTreeMap::new();
    let mut excluded = 0u32;
    for (&question, answer) in &latest {
        let Some(block) = answer.block() else {
            tracing::debug!(question, "answer has no block, excluding");
            excluded += 1;
            continue;
        };
        let value = item_value(question, &answer.answer.as_text(), answer.question_type)?;
        let entry = sums.entry(block).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    if sums.is_empty() {
        return Err(AggregationError::NoValidAnswers("personal_qualities".into()).into());
    }

    let mut names: Vec<&str> = CANONICAL_TRAITS.to_vec();
    names.extend(
        sums.keys()
            .copied()
            .filter(|name| !CANONICAL_TRAITS.contains(name)),
    );

    let traits = names
        .into_iter()
        .map(|name| {
            let (raw_sum, items) = sums.get(name).copied().unwrap_or((0.0, 0));
            let score = normalize(raw_sum, items);
            TraitScore {
                name: name.to_string(),
                score,
                level: trait_level(score, items).to_string(),
                raw_sum,
                items,
            }
        })
        .collect();

    Ok(PersonalityProfile { traits, excluded })
}

/// Short fixed interpretation of a trait level, used when no narrative
/// generator is involved.
pub fn describe(trait_score: &TraitScore) -> String {
    let text = match trait_score.level.as_str() {
        LEVEL_HIGH => "качество выражено ярко и устойчиво проявляется в работе",
        LEVEL_MEDIUM => "качество выражено умеренно и проявляется в зависимости от ситуации",
        LEVEL_LOW => "качество выражено слабо, это зона для развития",
        _ => "недостаточно ответов для оценки",
    };
    format!("**{}** ({}/20): {text}.", trait_score.name, fmt_score(trait_score.score))
}

pub(crate) fn fmt_score(score: f64) -> String {
    format!("{score:.1}")
}
