//! Core data model types for psytest.
//!
//! Raw answers come in from the session layer, a [`ScoredResult`] goes out.
//! Everything in between lives in the scorer modules.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of assessment a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    /// Progressive-matrices IQ test (60 items, series A-E).
    IqTest,
    /// Yes/no/sometimes personality-qualities inventory.
    PersonalQualities,
    /// Open-ended productivity questionnaire.
    Productivity,
}

impl TestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::IqTest => "iq_test",
            TestType::PersonalQualities => "personal_qualities",
            TestType::Productivity => "productivity",
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "iq_test" | "iq" | "raven" => Ok(TestType::IqTest),
            "personal_qualities" | "personality" => Ok(TestType::PersonalQualities),
            "productivity" => Ok(TestType::Productivity),
            other => Err(format!("unknown test type: {other}")),
        }
    }
}

/// Polarity of a personality item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    /// Scored as answered.
    #[default]
    #[serde(rename = "+")]
    Direct,
    /// Scored inverted.
    #[serde(rename = "-")]
    Reverse,
}

/// An answer as stored by the session layer.
///
/// The session layer keeps answers as strings, so a numeric choice may
/// arrive either as a JSON number or as `"4"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Integer(i64),
    Text(String),
}

impl AnswerValue {
    /// The answer as an integer choice, if it is one.
    pub fn as_choice(&self) -> Option<i64> {
        match self {
            AnswerValue::Integer(n) => Some(*n),
            AnswerValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// The answer as trimmed text.
    pub fn as_text(&self) -> String {
        match self {
            AnswerValue::Integer(n) => n.to_string(),
            AnswerValue::Text(s) => s.trim().to_string(),
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, AnswerValue::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Integer(n) => write!(f, "{n}"),
            AnswerValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for AnswerValue {
    fn from(n: i64) -> Self {
        AnswerValue::Integer(n)
    }
}

impl From<&str> for AnswerValue {
    fn from(s: &str) -> Self {
        AnswerValue::Text(s.to_string())
    }
}

/// One answered question from a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAnswer {
    /// Question number within the test (1-60 for the IQ test).
    pub question_number: u32,
    /// The submitted value.
    pub answer: AnswerValue,
    /// IQ series letter, when the session layer recorded it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    /// Block (trait scale) the question belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_name: Option<String>,
    /// Personality item polarity.
    #[serde(default)]
    pub question_type: QuestionType,
    /// Question wording, used when building prompts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_text: Option<String>,
}

impl RawAnswer {
    /// A bare answer with no block or polarity information.
    pub fn new(question_number: u32, answer: impl Into<AnswerValue>) -> Self {
        Self {
            question_number,
            answer: answer.into(),
            series: None,
            block_name: None,
            question_type: QuestionType::Direct,
            question_text: None,
        }
    }

    pub fn with_block(mut self, block: &str, question_type: QuestionType) -> Self {
        self.block_name = Some(block.to_string());
        self.question_type = question_type;
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.question_text = Some(text.to_string());
        self
    }

    /// Block name, with blank names treated as absent.
    pub fn block(&self) -> Option<&str> {
        self.block_name
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }
}

/// Token accounting for a generation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The uniform result record for a completed session.
///
/// Every field is always serialized, `null` included, so persistence never
/// has to branch on the test type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub raw_score: Option<u32>,
    pub final_score: Option<f64>,
    pub iq_score: Option<i32>,
    pub iq_level: String,
    pub scores_json: BTreeMap<String, Value>,
    pub report: String,
    pub report_json: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_display_and_parse() {
        assert_eq!(TestType::IqTest.to_string(), "iq_test");
        assert_eq!(
            "personal_qualities".parse::<TestType>().unwrap(),
            TestType::PersonalQualities
        );
        assert_eq!("IQ".parse::<TestType>().unwrap(), TestType::IqTest);
        assert!("astrology".parse::<TestType>().is_err());
    }

    #[test]
    fn answer_value_accepts_numbers_and_strings() {
        let from_json: AnswerValue = serde_json::from_str("4").unwrap();
        assert_eq!(from_json.as_choice(), Some(4));
        let from_text: AnswerValue = serde_json::from_str("\" 5 \"").unwrap();
        assert_eq!(from_text.as_choice(), Some(5));
        let word: AnswerValue = serde_json::from_str("\"yes\"").unwrap();
        assert_eq!(word.as_choice(), None);
        assert_eq!(word.as_text(), "yes");
    }

    #[test]
    fn raw_answer_deserializes_polarity() {
        let json = r#"{"question_number": 7, "answer": "no", "block_name": "Чуткость", "question_type": "-"}"#;
        let answer: RawAnswer = serde_json::from_str(json).unwrap();
        assert_eq!(answer.question_type, QuestionType::Reverse);
        assert_eq!(answer.block(), Some("Чуткость"));

        let bare: RawAnswer =
            serde_json::from_str(r#"{"question_number": 1, "answer": 4}"#).unwrap();
        assert_eq!(bare.question_type, QuestionType::Direct);
        assert_eq!(bare.block(), None);
    }

    #[test]
    fn scored_result_serializes_every_field() {
        let result = ScoredResult {
            raw_score: None,
            final_score: None,
            iq_score: None,
            iq_level: String::new(),
            scores_json: BTreeMap::new(),
            report: "text".into(),
            report_json: BTreeMap::new(),
        };
        let value = serde_json::to_value(&result).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "raw_score",
            "final_score",
            "iq_score",
            "iq_level",
            "scores_json",
            "report",
            "report_json",
        ] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert!(obj["iq_score"].is_null());
    }
}
