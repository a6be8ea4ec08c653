//! Productivity questionnaire assessment.
//!
//! There is no answer key. Open answers are grouped by block, turned into a
//! prompt, and the narrative comes back from the text generator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AggregationError, ScoringError};
use crate::model::RawAnswer;
use crate::retry::RetryPolicy;
use crate::traits::{strip_outer_fence, GenerateRequest, Sleeper, TextGenerator};

/// Block label for answers that arrive without one.
pub const UNGROUPED_BLOCK: &str = "Общие вопросы";

pub const SYSTEM_INSTRUCTION: &str = "Ты опытный HR-аналитик. Оцени продуктивность кандидата \
и его ориентацию на результат по ответам на открытые вопросы. Пиши на русском языке. \
Оформи отчет в markdown: заголовки разделов через '##' и '###', ключевые выводы выделяй \
'**жирным**', перечисления оформляй строками, начинающимися с '- '. Не используй таблицы \
и блоки кода.";

/// One open answer prepared for the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAnswer {
    pub question_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub answer: String,
}

/// Non-blank answers grouped by block, each block in question order.
pub fn group_answers(answers: &[RawAnswer]) -> BTreeMap<String, Vec<OpenAnswer>> {
    let mut latest: BTreeMap<u32, &RawAnswer> = BTreeMap::new();
    for answer in answers {
        latest.insert(answer.question_number, answer);
    }

    let mut blocks: BTreeMap<String, Vec<OpenAnswer>> = BTreeMap::new();
    for (&question_number, answer) in &latest {
        if answer.answer.is_blank() {
            tracing::debug!(question = question_number, "blank answer, skipping");
            continue;
        }
        let block = answer.block().unwrap_or(UNGROUPED_BLOCK).to_string();
        blocks.entry(block).or_default().push(OpenAnswer {
            question_number,
            question: answer.question_text.clone(),
            answer: answer.answer.as_text(),
        });
    }
    blocks
}

/// Render grouped answers into the generation prompt.
pub fn build_prompt(blocks: &BTreeMap<String, Vec<OpenAnswer>>) -> String {
    let mut prompt = String::from(
        "Ниже приведены ответы кандидата на вопросы теста продуктивности. \
         Составь структурированный отчет: общая оценка продуктивности, \
         сильные стороны, зоны развития, рекомендации работодателю.\n\n",
    );
    for (block, answers) in blocks {
        prompt.push_str(&format!("### Блок: {block}\n\n"));
        for a in answers {
            match &a.question {
                Some(q) => prompt.push_str(&format!("**Вопрос {}.** {q}\n", a.question_number)),
                None => prompt.push_str(&format!("**Вопрос {}.**\n", a.question_number)),
            }
            prompt.push_str(&format!("Ответ: {}\n\n", a.answer));
        }
    }
    prompt
}

/// A finished productivity assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductivityAssessment {
    pub answers_by_block: BTreeMap<String, Vec<OpenAnswer>>,
    pub narrative: String,
    pub model: String,
    pub latency_ms: u64,
}

impl ProductivityAssessment {
    pub fn answered(&self) -> usize {
        self.answers_by_block.values().map(Vec::len).sum()
    }
}

/// Build the prompt and obtain the narrative.
pub async fn assess(
    answers: &[RawAnswer],
    generator: &dyn TextGenerator,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    template: &GenerateRequest,
) -> Result<ProductivityAssessment, ScoringError> {
    let answers_by_block = group_answers(answers);
    if answers_by_block.is_empty() {
        return Err(AggregationError::NoValidAnswers("productivity".into()).into());
    }

    let request = GenerateRequest {
        prompt: build_prompt(&answers_by_block),
        system_instruction: Some(SYSTEM_INSTRUCTION.to_string()),
        ..template.clone()
    };
    let response = policy.generate(generator, &request, sleeper).await?;

    Ok(ProductivityAssessment {
        answers_by_block,
        narrative: strip_outer_fence(&response.text),
        model: response.model,
        latency_ms: response.latency_ms,
    })
}
