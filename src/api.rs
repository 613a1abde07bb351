//! Chat-completion client for the analysis backend.
//!
//! One synchronous POST per code block. The runner talks to the endpoint
//! through the [`Completion`] trait so it can be exercised without network.

use std::env;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default completion endpoint.
pub const DEFAULT_API_URL: &str = "https://api.perplexity.ai/chat/completions";
/// Default model identifier.
pub const DEFAULT_MODEL: &str = "sonar-small-online";

/// Environment variable holding the bearer token.
pub const API_KEY_VAR: &str = "PPLX_API_KEY";
const API_URL_VAR: &str = "CODEINSIGHT_API_URL";
const MODEL_VAR: &str = "CODEINSIGHT_MODEL";

const SYSTEM_PROMPT: &str = "You are a helpful code analyzer.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Endpoint configuration, read once at startup and immutable thereafter.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl ApiConfig {
    /// Build a configuration from the environment. Returns `None` when the
    /// API key is absent or empty; shells must refuse to start a run in
    /// that case.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var(API_KEY_VAR).ok().filter(|key| !key.is_empty())?;
        Some(Self {
            api_key,
            base_url: env::var(API_URL_VAR).unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            model: env::var(MODEL_VAR).unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        })
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("completion request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("completion endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("failed to decode completion response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected completion response shape: {0}")]
    UnexpectedShape(String),
}

/// Sends one prompt and returns the first completion's text.
pub trait Completion {
    fn complete(&self, prompt: &str) -> Result<String, ApiError>;
}

/// HTTP-backed [`Completion`] implementation.
pub struct CompletionClient {
    config: ApiConfig,
    client: reqwest::blocking::Client,
}

impl CompletionClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn build_request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        })
    }
}

impl Completion for CompletionClient {
    fn complete(&self, prompt: &str) -> Result<String, ApiError> {
        let body = self.build_request_body(prompt);

        let response = self
            .client
            .post(&self.config.base_url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()?;

        let status = response.status().as_u16();
        let body_text = response.text()?;

        if !(200..300).contains(&status) {
            return Err(ApiError::Http {
                status,
                body: body_text,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body_text)?;
        extract_content(parsed)
    }
}

/// Pull `choices[0].message.content` out of a decoded response.
pub fn extract_content(response: ChatResponse) -> Result<String, ApiError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .ok_or_else(|| {
            ApiError::UnexpectedShape("no choices with message content".to_string())
        })
}

/// Completion API response format.
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    pub content: Option<String>,
}
