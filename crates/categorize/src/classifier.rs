use std::future::Future;
use std::time::Duration;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hearth_core::Category;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classification request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("classification response malformed: {0}")]
    Malformed(String),
    #[error("no classifier configured")]
    Disabled,
}

/// A best-guess category for one transaction description, with the
/// model's confidence and the estimated cost of obtaining it.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: String,
    pub confidence: f64,
    pub estimated_cost: Decimal,
}

/// Abstraction over the external classification service.
/// The pipeline only ever calls this for transactions the cheaper
/// stages could not place.
pub trait Classifier: Send + Sync {
    fn is_enabled(&self) -> bool {
        true
    }

    fn classify(
        &self,
        description: &str,
        candidates: &[Category],
    ) -> impl Future<Output = Result<Classification, ClassifierError>> + Send;
}

// ── HTTP backend ──────────────────────────────────────────────────────────────

/// Connection settings for a chat-completions style inference endpoint.
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Estimated price per token, in dollars. Kept coarse on purpose: the
/// figure feeds the run's audit record, not billing.
const PROMPT_TOKEN_PRICE: Decimal = Decimal::from_parts(15, 0, 0, false, 8);
const COMPLETION_TOKEN_PRICE: Decimal = Decimal::from_parts(60, 0, 0, false, 8);

const SYSTEM_PROMPT: &str = "You label household bank transactions. Given a transaction \
description and the list of allowed category names, answer with a single JSON object \
{\"category\": \"<one of the allowed names>\", \"confidence\": <number between 0 and 1>} \
and nothing else.";

/// Classifier backed by an OpenAI-compatible chat endpoint. Constructed
/// without settings it reports itself disabled and the pipeline skips
/// the AI stage entirely.
pub struct HttpClassifier {
    settings: Option<AiSettings>,
    client: reqwest::Client,
    scrubbers: Vec<(Regex, &'static str)>,
}

impl HttpClassifier {
    pub fn new(settings: Option<AiSettings>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            settings,
            client,
            scrubbers: scrubbers(),
        })
    }

    /// Card numbers, long references and dates carry no categorization
    /// signal; strip them before the description leaves the process.
    fn scrub(&self, description: &str) -> String {
        let mut text = description.to_string();
        for (regex, replacement) in &self.scrubbers {
            text = regex.replace_all(&text, *replacement).to_string();
        }
        text
    }
}

fn scrubbers() -> Vec<(Regex, &'static str)> {
    vec![
        (Regex::new(r"(?i)\bCB\*?\s?X?\d{4}\b").unwrap(), "CB 0000"),
        (Regex::new(r"\b\d{2}[/.]\d{2}(?:[/.]\d{2,4})?\b").unwrap(), "01/01"),
        (Regex::new(r"\d{5,}").unwrap(), "00000"),
    ]
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct Answer {
    category: String,
    confidence: f64,
}

/// Models wrap the JSON in a markdown fence often enough that we accept
/// both fenced and bare answers.
fn parse_answer(text: &str) -> Result<Answer, ClassifierError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.strip_suffix("```").unwrap_or(rest))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body).map_err(|e| ClassifierError::Malformed(e.to_string()))
}

fn estimate_cost(usage: Option<&ChatUsage>) -> Decimal {
    match usage {
        Some(usage) => {
            Decimal::from(usage.prompt_tokens) * PROMPT_TOKEN_PRICE
                + Decimal::from(usage.completion_tokens) * COMPLETION_TOKEN_PRICE
        }
        None => Decimal::ZERO,
    }
}

impl Classifier for HttpClassifier {
    fn is_enabled(&self) -> bool {
        self.settings.is_some()
    }

    async fn classify(
        &self,
        description: &str,
        candidates: &[Category],
    ) -> Result<Classification, ClassifierError> {
        let settings = self.settings.as_ref().ok_or(ClassifierError::Disabled)?;

        let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        let user_prompt = format!(
            "Transaction: {}\nAllowed categories: {}",
            self.scrub(description),
            names.join(", ")
        );

        let request = ChatRequest {
            model: &settings.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: &user_prompt },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", settings.base_url.trim_end_matches('/'));
        let response: ChatResponse = self
            .client
            .post(&url)
            .bearer_auth(&settings.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = response
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .ok_or_else(|| ClassifierError::Malformed("response had no choices".to_string()))?;
        let answer = parse_answer(content)?;

        Ok(Classification {
            category: answer.category,
            confidence: answer.confidence.clamp(0.0, 1.0),
            estimated_cost: estimate_cost(response.usage.as_ref()),
        })
    }
}

// ── Mock backend (used for tests) ─────────────────────────────────────────────

/// Scripted classifier: answers are looked up by substring of the
/// description; unscripted descriptions come back as a zero-confidence
/// guess so they fall through the pipeline's threshold.
#[derive(Default)]
pub struct MockClassifier {
    answers: Vec<(String, Classification)>,
    failures: Vec<String>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(mut self, needle: &str, category: &str, confidence: f64) -> Self {
        self.answers.push((
            needle.to_lowercase(),
            Classification {
                category: category.to_string(),
                confidence,
                estimated_cost: Decimal::from_parts(2, 0, 0, false, 4),
            },
        ));
        self
    }

    pub fn with_failure(mut self, needle: &str) -> Self {
        self.failures.push(needle.to_lowercase());
        self
    }
}

impl Classifier for MockClassifier {
    async fn classify(
        &self,
        description: &str,
        _candidates: &[Category],
    ) -> Result<Classification, ClassifierError> {
        let haystack = description.to_lowercase();
        if self.failures.iter().any(|needle| haystack.contains(needle)) {
            return Err(ClassifierError::Malformed("scripted failure".to_string()));
        }
        Ok(self
            .answers
            .iter()
            .find(|(needle, _)| haystack.contains(needle))
            .map(|(_, classification)| classification.clone())
            .unwrap_or(Classification {
                category: "Other".to_string(),
                confidence: 0.0,
                estimated_cost: Decimal::ZERO,
            }))
    }
}
