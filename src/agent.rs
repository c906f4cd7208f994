//! Provider back ends for text generation.
//!
//! Each back end turns one prompt into one HTTP request and classifies the
//! outcome. Retrying is left to [`crate::summary::SummaryClient`].

use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Why a single generation attempt failed
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rate limited by provider")]
    RateLimited,
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response did not contain generated text: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),
}

/// Something that can turn a prompt into generated text, once.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AttemptError>;
}

/// Build the back end selected by `[agent] provider`
pub fn backend_from_config(
    config: &Config,
    client: Client,
) -> Result<Box<dyn GenerationBackend>, AgentError> {
    let agent = &config.agent;
    match agent.provider.as_str() {
        "gemini" => Ok(Box::new(GeminiBackend {
            client,
            api_key: config.api_key()?.to_string(),
            url: agent.endpoint.clone().unwrap_or_else(|| {
                format!("{}/{}:generateContent", GEMINI_API_BASE, agent.model())
            }),
        })),
        "openai" => Ok(Box::new(OpenAiBackend {
            client,
            api_key: config.api_key()?.to_string(),
            model: agent.model().to_string(),
            url: agent
                .endpoint
                .clone()
                .unwrap_or_else(|| OPENAI_API_URL.to_string()),
        })),
        other => Err(AgentError::UnsupportedProvider(other.to_string())),
    }
}

#[async_trait]
impl GenerationBackend for Box<dyn GenerationBackend> {
    async fn generate(&self, prompt: &str) -> Result<String, AttemptError> {
        (**self).generate(prompt).await
    }
}

// ---------- Gemini ----------

pub struct GeminiBackend {
    client: Client,
    api_key: String,
    url: String,
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text parts of the first candidate
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        Some(text)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn generate(&self, prompt: &str) -> Result<String, AttemptError> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
        };
        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let body = read_success_body(response).await?;
        let parsed: GeminiResponse = serde_json::from_str(&body)
            .map_err(|e| AttemptError::Malformed(e.to_string()))?;
        non_blank(parsed.text())
    }
}

// ---------- OpenAI ----------

pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    model: String,
    url: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn text(&self) -> Option<String> {
        self.choices.first()?.message.as_ref()?.content.clone()
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    async fn generate(&self, prompt: &str) -> Result<String, AttemptError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let body = read_success_body(response).await?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AttemptError::Malformed(e.to_string()))?;
        non_blank(parsed.text())
    }
}

/// Classify the status line and hand back the body of a 2xx response
async fn read_success_body(response: reqwest::Response) -> Result<String, AttemptError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(AttemptError::RateLimited);
    }
    let body = response.text().await?;
    if !status.is_success() {
        return Err(AttemptError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

fn non_blank(text: Option<String>) -> Result<String, AttemptError> {
    match text.map(|t| t.trim().to_string()) {
        Some(t) if !t.is_empty() => Ok(t),
        Some(_) => Err(AttemptError::Malformed("generated text was blank".to_string())),
        None => Err(AttemptError::Malformed("no text field in response".to_string())),
    }
}
