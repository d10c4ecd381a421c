//! Completion client for OpenRouter-compatible chat endpoints.
//!
//! The client is deliberately thin: one blocking round-trip per call, no
//! retries, errors surfaced unchanged. Callers that need resilience or
//! offloading handle it themselves.

use crate::config::LlmConfig;
use anyhow::{Context, Result};
use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Message content is either plain text or an ordered list of typed parts
/// (the OpenAI vision format; used for image turns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Caption-plus-image content in the vision part format.
    pub fn image(caption: impl Into<String>, url: impl Into<String>) -> Self {
        MessageContent::Parts(vec![
            ContentPart::Text {
                text: caption.into(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url: url.into() },
            },
        ])
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Parts(_) => None,
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }

    /// A user turn carrying a caption plus an image reference.
    pub fn user_image(caption: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::image(caption, url),
        }
    }
}

/// Non-2xx answer from the completion endpoint, kept as a typed error so
/// adapters can distinguish "the model errored" from internal failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionApiError {
    pub status: u16,
    pub body: String,
}

impl fmt::Display for CompletionApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "completion API error {}: {}", self.status, self.body)
    }
}

impl std::error::Error for CompletionApiError {}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

pub struct CompletionClient {
    client: Client,
    api_key: String,
    config: LlmConfig,
    wire_log: Option<WireLog>,
}

impl CompletionClient {
    pub fn new(api_key: String, config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            config,
            wire_log: None,
        }
    }

    pub fn with_wire_log(mut self, wire_log: WireLog) -> Self {
        self.wire_log = Some(wire_log);
        self
    }

    /// Send the ordered history and return the first choice's content.
    ///
    /// `model` and `temperature` override the configured defaults. The
    /// temperature field is left out of the request body entirely when the
    /// configured model does not accept one.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
        temperature: Option<f32>,
    ) -> Result<String> {
        let request = ChatRequest {
            model: model.unwrap_or(&self.config.model),
            messages,
            temperature: self
                .config
                .temperature_supported
                .then(|| temperature.unwrap_or(self.config.temperature)),
        };

        if let Some(wire_log) = &self.wire_log {
            wire_log.record("request", &serde_json::to_value(&request)?);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CompletionApiError {
                status: status.as_u16(),
                body: error_text,
            }
            .into());
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to decode completion response body")?;

        if let Some(wire_log) = &self.wire_log {
            wire_log.record("response", &body);
        }

        let chat_response: ChatResponse = serde_json::from_value(body)
            .context("Completion response did not match the expected shape")?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("Completion response contained no choices"))
    }
}

/// Append-only JSONL log of completion traffic. Created once per process
/// lifetime; every request and response body becomes one line.
pub struct WireLog {
    file: Mutex<std::fs::File>,
    path: PathBuf,
}

impl WireLog {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {:?}", dir))?;

        let path = dir.join(format!(
            "requests_{}.jsonl",
            Local::now().format("%Y%m%d_%H%M%S")
        ));
        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create wire log {:?}", path))?;

        tracing::info!("[WireLog] Recording completion traffic to {:?}", path);
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(&self, kind: &str, body: &Value) {
        let line = serde_json::json!({
            "ts": Local::now().to_rfc3339(),
            "kind": kind,
            "body": body,
        });

        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{}", line) {
            tracing::warn!("[WireLog] Failed to append {} line: {}", kind, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config(base_url: String, temperature_supported: bool) -> LlmConfig {
        LlmConfig {
            model: "openai/gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            temperature_supported,
            base_url,
        }
    }

    #[test]
    fn image_turn_serializes_to_vision_format() {
        let message = ChatMessage::user_image("what is this?", "https://example.com/cat.jpg");
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "what is this?"},
                    {"type": "image_url", "image_url": {"url": "https://example.com/cat.jpg"}},
                ],
            })
        );
    }

    #[test]
    fn history_round_trips_through_json() {
        let history = vec![
            ChatMessage::text(Role::System, "You are a helpful assistant."),
            ChatMessage::text(Role::User, "hello"),
            ChatMessage::user_image("look", "https://example.com/dog.jpg"),
            ChatMessage::text(Role::Assistant, "hi"),
        ];

        let encoded = serde_json::to_string(&history).unwrap();
        let decoded: Vec<ChatMessage> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, history);
    }

    #[tokio::test]
    async fn chat_returns_first_choice_content() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hi"}}],
            })))
            .mount(&mock_server)
            .await;

        let client =
            CompletionClient::new("test-key".to_string(), test_config(mock_server.uri(), true));
        let messages = vec![ChatMessage::text(Role::User, "hello")];

        let reply = client.chat(&messages, None, None).await.unwrap();
        assert_eq!(reply, "hi");
    }

    #[tokio::test]
    async fn temperature_is_omitted_for_incapable_models() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}],
            })))
            .mount(&mock_server)
            .await;

        let client =
            CompletionClient::new("test-key".to_string(), test_config(mock_server.uri(), false));
        let messages = vec![ChatMessage::text(Role::User, "hello")];
        client.chat(&messages, None, Some(0.2)).await.unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("temperature").is_none());
    }

    #[tokio::test]
    async fn temperature_is_sent_when_supported() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}],
            })))
            .mount(&mock_server)
            .await;

        let client =
            CompletionClient::new("test-key".to_string(), test_config(mock_server.uri(), true));
        let messages = vec![ChatMessage::text(Role::User, "hello")];
        client.chat(&messages, None, Some(0.2)).await.unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["temperature"], json!(0.2));
    }

    #[tokio::test]
    async fn api_errors_surface_unchanged() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&mock_server)
            .await;

        let client =
            CompletionClient::new("test-key".to_string(), test_config(mock_server.uri(), true));
        let messages = vec![ChatMessage::text(Role::User, "hello")];

        let err = client.chat(&messages, None, None).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("429"));
        assert!(text.contains("rate limited"));
    }

    #[tokio::test]
    async fn wire_log_records_one_line_per_direction() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hi"}}],
            })))
            .mount(&mock_server)
            .await;

        let log_dir = tempfile::tempdir().unwrap();
        let wire_log = WireLog::create(log_dir.path()).unwrap();
        let log_path = wire_log.path().to_path_buf();

        let client = CompletionClient::new("test-key".to_string(), test_config(mock_server.uri(), true))
            .with_wire_log(wire_log);
        let messages = vec![ChatMessage::text(Role::User, "hello")];
        client.chat(&messages, None, None).await.unwrap();

        let contents = std::fs::read_to_string(log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let request_line: Value = serde_json::from_str(lines[0]).unwrap();
        let response_line: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(request_line["kind"], "request");
        assert_eq!(response_line["kind"], "response");
        assert_eq!(request_line["body"]["messages"][0]["content"], "hello");
    }
}
