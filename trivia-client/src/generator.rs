use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};
use trivia_core::QuestionRequest;
use trivia_types::{AgeGroup, DEFAULT_KID_AGE, Language, QUESTION_TIME_LIMIT_SECS, Question, QuestionType};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::GeneratorError;

/// Produces the question for one turn. Failures are expected; callers fall
/// back to the bundled table.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, request: &QuestionRequest) -> Result<Question, GeneratorError>;
}

/// Runs `generator` with an upper bound; running out of time is a failure
pub async fn generate_within(
    generator: &dyn QuestionGenerator,
    request: &QuestionRequest,
    limit: Duration,
) -> Result<Question, GeneratorError> {
    match tokio::time::timeout(limit, generator.generate(request)).await {
        Ok(result) => result,
        Err(_) => Err(GeneratorError::Timeout),
    }
}

/// Question as the model is asked to return it
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
}

impl GeneratedQuestion {
    pub fn into_question(self, request: &QuestionRequest) -> Question {
        Question {
            id: Uuid::new_v4(),
            text: self.text,
            question_type: self.question_type,
            options: self.options,
            correct_answer: self.correct_answer,
            explanation: self.explanation,
            subject: request.subject,
            difficulty: request.difficulty,
            time_limit: QUESTION_TIME_LIMIT_SECS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone)]
pub struct GeminiQuestionGenerator {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiQuestionGenerator {
    pub fn new(api_key: Option<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.gemini_base_url.clone(),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl QuestionGenerator for GeminiQuestionGenerator {
    async fn generate(&self, request: &QuestionRequest) -> Result<Question, GeneratorError> {
        let api_key = self.api_key.as_ref().ok_or(GeneratorError::NotConfigured)?;
        let question_type = request
            .question_type
            .or_else(|| QuestionType::ALL.choose(&mut rand::thread_rng()).copied())
            .unwrap_or(QuestionType::MultipleChoice);
        let prompt = build_prompt(request, question_type);
        debug!(
            "Requesting {} question about {}",
            question_type.as_str(),
            request.subject.label()
        );

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key.as_str())])
            .json(&json!({
                "contents": [{"parts": [{"text": prompt}]}],
                "generationConfig": {"responseMimeType": "application/json"}
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or("No response body".into());
            error!("Gemini request failed: {} - {}", status, body);
            return Err(GeneratorError::Api(status, body));
        }

        let body: GenerateContentResponse = response.json().await?;
        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| GeneratorError::Parse("response has no candidates".to_string()))?;
        parse_generated(text, request)
    }
}

/// Parses the model's JSON text into a question for `request`
pub fn parse_generated(text: &str, request: &QuestionRequest) -> Result<Question, GeneratorError> {
    let generated: GeneratedQuestion =
        serde_json::from_str(text.trim()).map_err(|e| GeneratorError::Parse(e.to_string()))?;
    Ok(generated.into_question(request))
}

pub fn build_prompt(request: &QuestionRequest, question_type: QuestionType) -> String {
    let age_context = match request.age {
        AgeGroup::Kid => {
            let age = request.kid_age.unwrap_or(DEFAULT_KID_AGE);
            format!(
                "for a {age}-year-old child. Use simple words a {age}-year-old would understand. Keep it fun and age-appropriate."
            )
        }
        AgeGroup::Adult => "for an adult, with challenging and interesting content".to_string(),
    };

    let type_instruction = match question_type {
        QuestionType::MultipleChoice => {
            "Create a multiple choice question with exactly 4 options. One must be correct."
                .to_string()
        }
        QuestionType::TrueFalse => {
            let (yes, no) = request.language.true_false_labels();
            format!("Create a true/false question. Options must be exactly [\"{yes}\", \"{no}\"].")
        }
        QuestionType::CompletePhrase => "Create a \"complete the phrase\" question where the player fills in the blank. Provide 4 possible completions as options.".to_string(),
        QuestionType::Estimation => "Create an estimation question with 4 numeric range options (e.g., \"100-200\", \"200-500\").".to_string(),
    };

    let avoid_list = if request.history.is_empty() {
        String::new()
    } else {
        format!(
            "\nDo NOT repeat or closely resemble these previous questions:\n{}",
            request.history.join("\n")
        )
    };

    let language_instruction = if request.language == Language::En {
        String::new()
    } else {
        format!(
            "\nIMPORTANT: Generate the question, ALL options, and the explanation ENTIRELY in {}. Do NOT include any English text.",
            request.language.display_name()
        )
    };

    format!(
        r#"Generate a trivia question about "{subject}" {age_context}.
Difficulty level: {label} ({difficulty}/10).
{language_instruction}
STYLE RULES:
- Keep the question short, ideally under 10 words and never more than 15.
- No filler words. Think pub quiz, not textbook.
- Options should be 1-3 words each when possible.
- The explanation is one short sentence.

{type_instruction}
{avoid_list}

Respond with valid JSON only matching this exact schema:
{{
  "text": "the question text",
  "type": "{kind}",
  "options": ["option1", "option2", "option3", "option4"],
  "correctAnswer": "the correct option (must exactly match one of the options)",
  "explanation": "a brief one-sentence explanation"
}}"#,
        subject = request.subject.label(),
        label = request.difficulty_label(),
        difficulty = request.difficulty,
        kind = question_type.as_str(),
    )
}
