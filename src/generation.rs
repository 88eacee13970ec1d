//! Answer generation through a hosted language model.
//!
//! The [`AnswerGenerator`] trait receives the verbatim question and the
//! retrieved passages and returns answer text. One synchronous call per
//! question, without retries or streaming. A failed call surfaces as a
//! [`RagError`].
//!
//! # Prompt Layout
//!
//! ```text
//! {instructions}
//!
//! Context: {passage 1} {passage 2} …
//!
//! Focus only on the question asked.
//!
//! User question:
//! {question}
//! ```
//!
//! Each passage is cut to `max_chars_per_chunk` characters (default 600) so
//! the prompt stays bounded.

use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::error::{RagError, Result};
use crate::models::SourcePassage;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Produces an answer from a question and its supporting passages.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-2.0-flash"`).
    fn model_name(&self) -> &str;
    /// Generate an answer grounded in `context`.
    async fn generate(&self, question: &str, context: &[SourcePassage]) -> Result<String>;
}

/// Assemble the single-turn prompt sent to the model.
pub fn build_prompt(
    instructions: &str,
    question: &str,
    context: &[SourcePassage],
    max_chars_per_chunk: usize,
) -> String {
    let combined = context
        .iter()
        .map(|p| truncate_chars(&p.text, max_chars_per_chunk))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "{}\n\nContext: {}\n\nFocus only on the question asked.\n\nUser question:\n{}",
        instructions.trim(),
        combined,
        question
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{} …", &text[..cut]),
        None => text.to_string(),
    }
}

// ============ Disabled Generator ============

/// Generator used when `generation.provider = "disabled"`.
pub struct DisabledGenerator;

#[async_trait]
impl AnswerGenerator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _question: &str, _context: &[SourcePassage]) -> Result<String> {
        Err(RagError::unavailable(
            "generation",
            "generation provider is disabled; set [generation] provider in config",
        ))
    }
}

// ============ Gemini Generator ============

/// Generator backed by the Gemini `generateContent` endpoint.
///
/// Authenticates with the `x-goog-api-key` header. The key is read once, at
/// construction, from the environment variable named by
/// `generation.api_key_env`.
pub struct GeminiGenerator {
    model: String,
    instructions: String,
    max_chars_per_chunk: usize,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiGenerator {
    /// # Errors
    ///
    /// Returns an error if the API key variable is unset or empty.
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => bail!(
                "{} environment variable not set; the gemini generation provider needs an API key",
                config.api_key_env
            ),
        };
        Self::with_base_url(config, api_key, GEMINI_BASE_URL)
    }

    /// Build a generator against an explicit endpoint root.
    pub fn with_base_url(
        config: &GenerationConfig,
        api_key: impl Into<String>,
        base_url: &str,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            instructions: config.instructions.clone(),
            max_chars_per_chunk: config.max_chars_per_chunk,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, question: &str, context: &[SourcePassage]) -> Result<String> {
        let prompt = build_prompt(
            &self.instructions,
            question,
            context,
            self.max_chars_per_chunk,
        );
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: &prompt }],
            }],
        };

        debug!(
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            passages = context.len(),
            "calling gemini"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RagError::unavailable("gemini", "request timed out")
                } else {
                    RagError::unavailable("gemini", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            warn!(%status, "gemini rejected the request");
            return Err(RagError::unavailable(
                "gemini",
                format!("API error {}: {}", status, body_text),
            ));
        }

        let text = response
            .text()
            .await
            .map_err(|e| RagError::unavailable("gemini", e))?;
        parse_gemini_response(&text)
    }
}

/// Extract the answer text from a `generateContent` response body.
fn parse_gemini_response(body: &str) -> Result<String> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| RagError::generation("gemini", format!("malformed response: {}", e)))?;

    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| RagError::generation("gemini", "response has no candidates"))?;

    let answer: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if answer.trim().is_empty() {
        return Err(RagError::generation(
            "gemini",
            format!(
                "empty answer (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ),
        ));
    }
    Ok(answer)
}

/// Create the configured [`AnswerGenerator`].
///
/// | Config Value | Generator |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledGenerator`] |
/// | `"gemini"` | [`GeminiGenerator`] |
pub fn create_generator(config: &GenerationConfig) -> anyhow::Result<Box<dyn AnswerGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "gemini" => Ok(Box::new(GeminiGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
