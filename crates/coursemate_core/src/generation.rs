//! crates/coursemate_core/src/generation.rs
//!
//! Turns aggregated course text into validated quiz questions using a remote
//! generative model: prompt construction, bounded retries with exponential
//! backoff, tolerant response parsing, and strict per-item validation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::aggregator::cap_chars;
use crate::domain::{Difficulty, Question};
use crate::error::GenerationError;
use crate::ports::CompletionService;

pub const SYSTEM_PROMPT: &str = "You are an expert educational content creator. \
Generate quiz questions as valid JSON only. Never add explanatory text outside the JSON.";

const REQUIRED_FIELDS: [&str; 4] = ["type", "question", "answer", "explanation"];

//=========================================================================================
// Settings
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    /// Characters of source text embedded in the prompt, independent of the
    /// aggregator's own budget.
    pub source_cap_chars: usize,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            source_cap_chars: 8_000,
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Delay slept after the failed attempt with 0-based index `attempt`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

//=========================================================================================
// Generator
//=========================================================================================

pub struct QuizGenerator {
    completion: Arc<dyn CompletionService>,
    settings: GenerationSettings,
}

impl QuizGenerator {
    pub fn new(completion: Arc<dyn CompletionService>, settings: GenerationSettings) -> Self {
        Self {
            completion,
            settings,
        }
    }

    /// Generates up to `question_count` validated questions from `text`.
    ///
    /// May return fewer questions than requested when some items fail validation.
    /// Every failure of the remote call, the parse step, or validation (zero
    /// surviving items) is retried until the retry budget is exhausted.
    pub async fn generate(
        &self,
        text: &str,
        question_count: usize,
        difficulty: Difficulty,
    ) -> Result<Vec<Question>, GenerationError> {
        let prompt = build_prompt(text, question_count, difficulty, self.settings.source_cap_chars);
        let attempts = self.settings.max_retries + 1;
        let mut attempt = 0;

        loop {
            match self.attempt(&prompt).await {
                Ok(questions) => {
                    info!(
                        attempt = attempt + 1,
                        questions = questions.len(),
                        "Quiz generation succeeded"
                    );
                    return Ok(questions);
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Quiz generation attempt failed");
                    if attempt >= self.settings.max_retries {
                        return Err(GenerationError::Exhausted {
                            attempts,
                            last: Box::new(e),
                        });
                    }
                    tokio::time::sleep(backoff_delay(self.settings.base_delay, attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self, prompt: &str) -> Result<Vec<Question>, GenerationError> {
        let content = self
            .completion
            .complete(SYSTEM_PROMPT, prompt)
            .await
            .map_err(GenerationError::Remote)?;

        let items = parse_items(&content)?;
        let (questions, dropped) = validate_items(&items);
        if questions.is_empty() {
            return Err(GenerationError::Validation { dropped });
        }
        Ok(questions)
    }
}

fn difficulty_instruction(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => {
            "Focus on recall and basic understanding. Test fundamental concepts and definitions."
        }
        Difficulty::Medium => {
            "Mix application and analysis. Test understanding and the ability to apply concepts."
        }
        Difficulty::Hard => {
            "Demand critical thinking and problem solving, with complex scenarios and multi-step reasoning."
        }
    }
}

/// Builds the user prompt sent to the model.
pub fn build_prompt(
    text: &str,
    question_count: usize,
    difficulty: Difficulty,
    source_cap_chars: usize,
) -> String {
    let source = cap_chars(text, source_cap_chars);
    format!(
        r#"Write {count} quiz questions at {difficulty} difficulty from the course material below.

{instruction}

Material:
{source}

Answer with a single JSON array and nothing else. Each item must have one of these shapes:

[
  {{
    "type": "mcq",
    "question": "Question text?",
    "choices": ["Choice A", "Choice B", "Choice C", "Choice D"],
    "answer": 0,
    "explanation": "Why this choice is correct"
  }},
  {{
    "type": "short",
    "question": "Question text?",
    "answer": "Expected short answer",
    "explanation": "Why this is the answer"
  }}
]

Rules:
- Produce exactly {count} questions.
- At least 60% of the questions must be "mcq"; the rest are "short".
- Every "mcq" has exactly 4 choices and a 0-based "answer" index (0, 1, 2 or 3).
- Every question is answerable from the material and suits the {difficulty} level.
- Explanations are clear and educational.

Return ONLY the JSON array."#,
        count = question_count,
        difficulty = difficulty,
        instruction = difficulty_instruction(difficulty),
        source = source,
    )
}

//=========================================================================================
// Parsing and Validation
//=========================================================================================

/// Removes a surrounding fenced code block (with optional language tag).
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parses model output into raw JSON items.
///
/// Falls back to the substring between the first `[` and the last `]` when the
/// content as a whole is not a JSON array.
pub fn parse_items(content: &str) -> Result<Vec<Value>, GenerationError> {
    let body = strip_code_fence(content);
    match serde_json::from_str::<Vec<Value>>(body) {
        Ok(items) => Ok(items),
        Err(direct) => {
            debug!(error = %direct, "Direct JSON parse failed, searching for an array");
            match (body.find('['), body.rfind(']')) {
                (Some(start), Some(end)) if start < end => {
                    serde_json::from_str::<Vec<Value>>(&body[start..=end])
                        .map_err(|e| GenerationError::Parse(e.to_string()))
                }
                _ => Err(GenerationError::Parse(format!(
                    "no JSON array found in response: {}",
                    direct
                ))),
            }
        }
    }
}

/// Why a single generated item was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuestionRejection {
    #[error("item is not a JSON object")]
    NotAnObject,
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` must be a string")]
    NotAString(&'static str),
    #[error("MCQ must have exactly 4 string choices")]
    InvalidChoices,
    #[error("MCQ answer must be an integer between 0 and 3")]
    InvalidMcqAnswer,
    #[error("unknown question type {0}")]
    UnknownType(String),
}

fn string_field(obj: &Map<String, Value>, field: &'static str) -> Result<String, QuestionRejection> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(QuestionRejection::NotAString(field))
}

/// Decodes one raw item into a typed [`Question`], enforcing the wire rules.
pub fn validate_question(item: &Value) -> Result<Question, QuestionRejection> {
    let obj = item.as_object().ok_or(QuestionRejection::NotAnObject)?;
    if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !obj.contains_key(**f)) {
        return Err(QuestionRejection::MissingField(*missing));
    }

    let question = string_field(obj, "question")?;
    let explanation = string_field(obj, "explanation")?;

    match obj.get("type").and_then(Value::as_str) {
        Some("mcq") => {
            let raw_choices = obj
                .get("choices")
                .ok_or(QuestionRejection::MissingField("choices"))?
                .as_array()
                .ok_or(QuestionRejection::InvalidChoices)?;
            let choices: Vec<String> = raw_choices
                .iter()
                .map(|c| c.as_str().map(str::to_string))
                .collect::<Option<_>>()
                .ok_or(QuestionRejection::InvalidChoices)?;
            let choices: [String; 4] = choices
                .try_into()
                .map_err(|_| QuestionRejection::InvalidChoices)?;
            let answer = obj
                .get("answer")
                .and_then(Value::as_u64)
                .filter(|a| *a <= 3)
                .ok_or(QuestionRejection::InvalidMcqAnswer)?;

            Ok(Question::Mcq {
                question,
                choices,
                answer: answer as u8,
                explanation,
            })
        }
        Some("short") => Ok(Question::ShortAnswer {
            question,
            answer: string_field(obj, "answer")?,
            explanation,
        }),
        _ => Err(QuestionRejection::UnknownType(
            obj.get("type").map(Value::to_string).unwrap_or_default(),
        )),
    }
}

/// Validates every item, keeping the survivors in order. Returns them together
/// with the number of dropped items.
pub fn validate_items(items: &[Value]) -> (Vec<Question>, usize) {
    let mut questions = Vec::with_capacity(items.len());
    let mut dropped = 0;
    for (index, item) in items.iter().enumerate() {
        match validate_question(item) {
            Ok(question) => questions.push(question),
            Err(reason) => {
                dropped += 1;
                debug!(index, %reason, "Dropping invalid generated question");
            }
        }
    }
    (questions, dropped)
}
