use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::state::ChatMessage;

/// One chat completion call: the full transcript and the model to run it on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("No API key configured. Set API_KEY or GEMINI_API_KEY.")]
    MissingApiKey,
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Response contained no choices")]
    NoChoices,
    #[error("{0}")]
    Task(String),
}

/// Anything that can answer a transcript with the first choice's content.
///
/// `Ok(None)` means the service replied but the message had no content.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, CompletionError>;
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the first choice's content from a `/chat/completions` body
pub fn parse_completion(body: &str) -> Result<Option<String>, CompletionError> {
    let completion: ChatCompletion = serde_json::from_str(body)?;
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or(CompletionError::NoChoices)?;
    Ok(choice.message.content)
}

/// Client for an OpenAI-compatible chat completions endpoint
#[derive(Clone)]
pub struct OpenAICompatClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAICompatClient {
    pub fn new(base_url: &str, api_key: Option<&str>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.to_string(),
            api_key: api_key.map(str::to_string),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.base_url, config.api_key.as_deref())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionService for OpenAICompatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, CompletionError> {
        let api_key = self.api_key.as_deref().ok_or(CompletionError::MissingApiKey)?;

        let response = self.client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(CompletionError::Api { status, body });
        }

        parse_completion(&body)
    }
}
