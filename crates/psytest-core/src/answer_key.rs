//! Static answer key and lookup tables for the progressive-matrices test.
//!
//! All tables are immutable `const` data. Series are 12 items wide and laid
//! out A..E, so question 13 is `B1` and question 60 is `E12`.

use crate::error::ValidationError;

pub const SERIES: [char; 5] = ['A', 'B', 'C', 'D', 'E'];
pub const ITEMS_PER_SERIES: u32 = 12;
pub const TOTAL_QUESTIONS: u32 = 60;
/// Highest option number on any item (series C-E have eight options).
pub const MAX_CHOICE: i64 = 8;

/// Correct choice per series, in item order.
const ANSWER_KEY: [[u8; 12]; 5] = [
    [4, 5, 1, 2, 6, 3, 6, 2, 1, 3, 4, 5],
    [2, 6, 1, 2, 1, 3, 5, 6, 4, 3, 4, 5],
    [8, 2, 3, 8, 7, 4, 5, 1, 7, 6, 1, 2],
    [3, 4, 3, 7, 8, 6, 5, 4, 1, 2, 5, 6],
    [7, 6, 8, 2, 1, 5, 1, 6, 3, 2, 4, 5],
];

/// A row of the raw-score to IQ conversion table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreBand {
    pub min_score: u32,
    pub max_score: u32,
    pub min_iq: u32,
    pub max_iq: u32,
}

impl ScoreBand {
    pub fn contains(&self, raw_score: u32) -> bool {
        (self.min_score..=self.max_score).contains(&raw_score)
    }

    /// The exact IQ for degenerate bands, otherwise the floored midpoint.
    pub fn iq(&self) -> u32 {
        if self.min_iq == self.max_iq {
            self.min_iq
        } else {
            (self.min_iq + self.max_iq) / 2
        }
    }
}

const fn band(min_score: u32, max_score: u32, min_iq: u32, max_iq: u32) -> ScoreBand {
    ScoreBand {
        min_score,
        max_score,
        min_iq,
        max_iq,
    }
}

/// Non-overlapping bands covering raw scores 0-60, highest first.
pub const IQ_BANDS: [ScoreBand; 9] = [
    band(60, 60, 140, 140),
    band(55, 59, 122, 130),
    band(50, 54, 112, 120),
    band(45, 49, 102, 110),
    band(40, 44, 95, 100),
    band(35, 39, 88, 94),
    band(30, 34, 82, 87),
    band(25, 29, 75, 80),
    band(0, 24, 0, 70),
];

/// Lowest IQ the table reports. The bottom band reads as "70 and below".
pub const IQ_FLOOR: u32 = 70;

/// Age breakpoints above the 14-30 plateau and their correction factors.
const AGE_BREAKPOINTS: [(u32, f64); 6] = [
    (35, 0.97),
    (40, 0.93),
    (45, 0.88),
    (50, 0.82),
    (55, 0.76),
    (60, 0.70),
];

/// Correct choice for a series item, `None` if the key has no such entry.
pub fn correct_answer(series: char, index: u32) -> Option<u8> {
    let row = SERIES
        .iter()
        .position(|&s| s == series.to_ascii_uppercase())?;
    if !(1..=ITEMS_PER_SERIES).contains(&index) {
        return None;
    }
    Some(ANSWER_KEY[row][(index - 1) as usize])
}

/// Correct choice for a global question number (1-60).
pub fn correct_answer_for(question_number: u32) -> Option<u8> {
    let (series, index) = series_of(question_number).ok()?;
    correct_answer(series, index)
}

/// Map a series letter and 1-based item index to the global number 1-60.
pub fn global_question_number(series: char, index: u32) -> Result<u32, ValidationError> {
    let letter = series.to_ascii_uppercase();
    let row = SERIES
        .iter()
        .position(|&s| s == letter)
        .ok_or(ValidationError::UnknownSeries(series))?;
    if !(1..=ITEMS_PER_SERIES).contains(&index) {
        return Err(ValidationError::IndexOutOfRange {
            series: letter,
            index,
        });
    }
    Ok(row as u32 * ITEMS_PER_SERIES + index)
}

/// Inverse of [`global_question_number`].
pub fn series_of(question_number: u32) -> Result<(char, u32), ValidationError> {
    if !(1..=TOTAL_QUESTIONS).contains(&question_number) {
        return Err(ValidationError::QuestionOutOfRange(question_number));
    }
    let zero_based = question_number - 1;
    let series = SERIES[(zero_based / ITEMS_PER_SERIES) as usize];
    Ok((series, zero_based % ITEMS_PER_SERIES + 1))
}

/// Parse a key label such as `"C7"`.
pub fn parse_label(label: &str) -> Result<(char, u32), ValidationError> {
    let mut chars = label.trim().chars();
    let series = chars.next().ok_or(ValidationError::UnknownSeries(' '))?;
    let index: u32 = chars
        .as_str()
        .parse()
        .map_err(|_| ValidationError::IndexOutOfRange {
            series: series.to_ascii_uppercase(),
            index: 0,
        })?;
    global_question_number(series, index)?;
    Ok((series.to_ascii_uppercase(), index))
}

/// The band containing a raw score.
pub fn band_for(raw_score: u32) -> Option<&'static ScoreBand> {
    IQ_BANDS.iter().find(|b| b.contains(raw_score))
}

/// Convert a raw correctness count to the table IQ, never below [`IQ_FLOOR`].
pub fn iq_from_raw_score(raw_score: u32) -> u32 {
    band_for(raw_score)
        .map(ScoreBand::iq)
        .unwrap_or(IQ_FLOOR)
        .max(IQ_FLOOR)
}

/// Age-correction coefficient.
///
/// Under 14 and 14-30 resolve to 1.0, over 60 to 0.70. Anything in between
/// takes the nearest breakpoint.
pub fn age_coefficient(age: u32) -> f64 {
    if age <= 30 {
        return 1.0;
    }
    if age > 60 {
        return 0.70;
    }
    AGE_BREAKPOINTS
        .iter()
        .min_by_key(|(breakpoint, _)| breakpoint.abs_diff(age))
        .map(|&(_, coefficient)| coefficient)
        .unwrap_or(1.0)
}
