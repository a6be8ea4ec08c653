//! Progressive-matrices (IQ) scoring.
//!
//! Raw score is the number of submitted answers matching the key. It goes
//! through the band table, then an age correction, then a level threshold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::answer_key::{self, MAX_CHOICE, SERIES};
use crate::error::ValidationError;
use crate::model::RawAnswer;

pub const LEVEL_HIGH: &str = "Высокий / Незаурядный интеллект";
pub const LEVEL_ABOVE_AVERAGE: &str = "Интеллект выше среднего";
pub const LEVEL_AVERAGE: &str = "Средний интеллект";
pub const LEVEL_BELOW_AVERAGE: &str = "Интеллект ниже среднего";
pub const LEVEL_LOW: &str = "Низкий уровень";

/// Everything computed for one IQ session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IqScore {
    pub raw_score: u32,
    pub base_iq: u32,
    pub age: Option<u32>,
    pub age_coefficient: f64,
    pub final_iq: i32,
    pub level: String,
    /// Correct answers per series letter.
    pub series: BTreeMap<String, u32>,
    /// Distinct question numbers that were scored.
    pub answered: u32,
    /// Answers skipped because no key entry matched.
    pub excluded: u32,
}

/// Score a list of IQ answers.
///
/// Answers for unknown question numbers are skipped whatever they contain.
/// A repeated question number keeps its last answer. For known questions,
/// non-numeric answers and choices outside 1-8 are rejected.
pub fn score(answers: &[RawAnswer], age: Option<u32>) -> Result<IqScore, ValidationError> {
    let mut latest: BTreeMap<u32, i64> = BTreeMap::new();
    let mut excluded = 0u32;

    for answer in answers {
        let question = answer.question_number;
        if answer_key::correct_answer_for(question).is_none() {
            tracing::debug!(question, "no key entry for question, excluding");
            excluded += 1;
            continue;
        }
        let choice = answer
            .answer
            .as_choice()
            .ok_or_else(|| ValidationError::NonNumericAnswer {
                question,
                value: answer.answer.as_text(),
            })?;
        if !(1..=MAX_CHOICE).contains(&choice) {
            return Err(ValidationError::ChoiceOutOfRange { question, choice });
        }
        latest.insert(question, choice);
    }

    let mut series: BTreeMap<String, u32> =
        SERIES.iter().map(|s| (s.to_string(), 0)).collect();
    let mut raw_score = 0u32;
    for (&question, &choice) in &latest {
        let Ok((letter, index)) = answer_key::series_of(question) else {
            continue;
        };
        if answer_key::correct_answer(letter, index).map(i64::from) == Some(choice) {
            raw_score += 1;
            *series.entry(letter.to_string()).or_default() += 1;
        }
    }
    let raw_score = raw_score.min(answer_key::TOTAL_QUESTIONS);

    let base_iq = answer_key::iq_from_raw_score(raw_score);
    let age_coefficient = age.map(answer_key::age_coefficient).unwrap_or(1.0);
    let final_iq = age_adjusted_iq(base_iq, age_coefficient);

    Ok(IqScore {
        raw_score,
        base_iq,
        age,
        age_coefficient,
        final_iq,
        level: iq_level(final_iq).to_string(),
        series,
        answered: latest.len() as u32,
        excluded,
    })
}

/// Divide by the age coefficient, truncate to two decimals, then round half
/// away from zero. A zero coefficient leaves the IQ unchanged.
pub fn age_adjusted_iq(base_iq: u32, coefficient: f64) -> i32 {
    if coefficient == 0.0 {
        return base_iq as i32;
    }
    let adjusted = (base_iq as f64 / coefficient * 100.0).trunc() / 100.0;
    adjusted.round() as i32
}

/// Qualitative level for a final IQ.
///
/// The thresholds leave 121 outside the upper bands, so it reads as low.
pub fn iq_level(iq: i32) -> &'static str {
    match iq {
        i if i > 121 => LEVEL_HIGH,
        111..=120 => LEVEL_ABOVE_AVERAGE,
        91..=110 => LEVEL_AVERAGE,
        81..=90 => LEVEL_BELOW_AVERAGE,
        _ => LEVEL_LOW,
    }
}

/// Markdown summary of an IQ result.
pub fn render_report(score: &IqScore) -> String {
    let mut md = String::new();
    md.push_str("## Результаты IQ-теста\n\n");
    md.push_str(&format!(
        "**Сырой балл:** {} из {}\n",
        score.raw_score,
        answer_key::TOTAL_QUESTIONS
    ));
    md.push_str(&format!("**Базовый IQ:** {}\n", score.base_iq));
    if let Some(age) = score.age {
        md.push_str(&format!(
            "**Возраст:** {age} (коэффициент {:.2})\n",
            score.age_coefficient
        ));
    }
    md.push_str(&format!("**Итоговый IQ:** {}\n", score.final_iq));
    md.push_str(&format!("**Уровень:** {}\n\n", score.level));

    md.push_str("### Результаты по сериям\n\n");
    for (letter, correct) in &score.series {
        md.push_str(&format!(
            "- Серия {letter}: {correct} из {}\n",
            answer_key::ITEMS_PER_SERIES
        ));
    }
    md
}
