/// LLM Client: the single point of entry for chat-completion calls.
///
/// No other module talks to the provider directly; the decision gateway
/// drives this client through the `ChatCompletion` trait so tests can swap
/// in a scripted transport.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod prompts;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("API key is not configured")]
    MissingApiKey,
}

/// One chat-completion request. Optional knobs are omitted from the wire
/// body when unset.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(skip)]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatRequest {
    pub fn user(model: &str, prompt: String, max_completion_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            max_completion_tokens,
            temperature: None,
            reasoning_effort: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_reasoning_effort(mut self, effort: &str) -> Self {
        self.reasoning_effort = Some(effort.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

/// A transport that turns a request into the assistant's text.
/// Makes exactly one attempt; retry policy lives with the caller.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// HTTPS client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_url: String, api_key: String, model: String) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            api_url,
            api_key,
            model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatCompletion for LlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .timeout(request.timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        extract_content(status.as_u16(), &body)
    }
}

/// Pulls the first choice's text out of a response body. An embedded `error`
/// object counts as a failure even under a 2xx status.
fn extract_content(status: u16, body: &str) -> Result<String, LlmError> {
    let parsed: ChatResponse = serde_json::from_str(body)?;

    if let Some(error) = parsed.error {
        let message = match error.code {
            Some(code) => format!("{code}: {}", error.message),
            None => error.message,
        };
        return Err(LlmError::Api { status, message });
    }

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(LlmError::EmptyContent);
    }

    debug!("LLM call succeeded: {} chars", text.len());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_content_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  YES \n"}}]}"#;
        assert_eq!(extract_content(200, body).unwrap(), "YES");
    }

    #[test]
    fn test_extract_content_embedded_error() {
        let body = r#"{"error":{"code":"RateLimit","message":"slow down"}}"#;
        match extract_content(200, body) {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 200);
                assert_eq!(message, "RateLimit: slow down");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_extract_content_empty() {
        let body = r#"{"choices":[{"message":{"content":"   "}}]}"#;
        assert!(matches!(extract_content(200, body), Err(LlmError::EmptyContent)));
        assert!(matches!(
            extract_content(200, r#"{"choices":[]}"#),
            Err(LlmError::EmptyContent)
        ));
    }

    #[test]
    fn test_extract_content_malformed() {
        assert!(matches!(extract_content(200, "not json"), Err(LlmError::Parse(_))));
    }

    #[test]
    fn test_request_omits_unset_knobs() {
        let request = ChatRequest::user("m", "hi".to_string(), 16);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("reasoning_effort").is_none());
        assert!(json.get("timeout").is_none());
        assert_eq!(json["messages"][0]["role"], "user");

        let json = serde_json::to_value(request.with_temperature(0.1)).unwrap();
        assert!(json.get("temperature").is_some());
    }

    #[test]
    fn test_client_rejects_blank_key() {
        assert!(matches!(
            LlmClient::new("http://x".to_string(), " ".to_string(), "m".to_string()),
            Err(LlmError::MissingApiKey)
        ));
    }
}
