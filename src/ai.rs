//! AI code reviewer backed by an OpenAI-compatible chat completions API.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, ReviewError};
use crate::review::{StructuredReview, response_schema};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const SYSTEM_PROMPT: &str = "You are a Principal Software Architect and Security Expert performing a deep code review.
Analyze the provided git diff with a focus on structural integrity, security, and long-term maintainability.

Focus areas:
1. Security: vulnerabilities (OWASP Top 10), exposed secrets, and insecure patterns.
2. Architecture: violations of clean layering and SOLID principles, high coupling, low cohesion.
3. Maintainability: complex logic, technical debt, duplicated code.
4. Scalability: performance bottlenecks such as N+1 queries or unoptimized loops.

Guidelines:
- Do not report minor formatting, spacing, or style preferences unless they severely impact readability.
- Every finding must include a clear, specific suggestion for improvement.
- When proposing a fix, put a concise snippet of the corrected code in the codeSuggestion field.
- Consider the surrounding context implied by the diff.
- Severity definitions:
  - critical: security vulnerabilities, data loss risks, or major architectural violations that must be fixed immediately.
  - warning: performance issues, maintainability risks, or significant code smells to address before merging.
  - info: best practice recommendations or minor improvements.
- If the code is excellent, say so and return a \"clean\" overall severity.

Provide a structured review that acts as a helpful, senior-level conversation starter.";

/// Turns a diff into a structured review.
#[async_trait]
pub trait DiffAnalyzer: Send + Sync {
    async fn analyze_diff(&self, diff: &str) -> Result<StructuredReview>;
}

pub struct AiCodeReviewer {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl AiCodeReviewer {
    pub fn new(
        api_key: &str,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| ReviewError::ConfigError(format!("Invalid AI API key: {e}")))?;
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ReviewError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    fn request_body(&self, diff: &str) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("Review this diff:\n\n{diff}"),
                },
            ],
            response_format: json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "review_result",
                    "strict": true,
                    "schema": response_schema()
                }
            }),
        }
    }
}

#[async_trait]
impl DiffAnalyzer for AiCodeReviewer {
    async fn analyze_diff(&self, diff: &str) -> Result<StructuredReview> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, diff_bytes = diff.len(), "Requesting AI review");

        let response = self
            .client
            .post(&url)
            .json(&self.request_body(diff))
            .send()
            .await
            .map_err(|e| ReviewError::Analysis(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReviewError::Analysis(format!(
                "API responded with {status}: {body}"
            )));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReviewError::Analysis(format!("Failed to parse response: {e}")))?;

        parse_review(completion)
    }
}

/// Extracts and schema-checks the review from the first choice.
fn parse_review(completion: ChatResponse) -> Result<StructuredReview> {
    let message = completion
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| ReviewError::Analysis("AI returned an empty response.".into()))?;

    if let Some(refusal) = message.refusal.filter(|r| !r.is_empty()) {
        return Err(ReviewError::Analysis(format!("AI refused to review: {refusal}")));
    }

    let content = message
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ReviewError::Analysis("AI returned an empty response.".into()))?;

    serde_json::from_str(&content)
        .map_err(|e| {
            ReviewError::Analysis(format!("AI output does not match the review schema: {e}"))
        })
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: Value,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}
