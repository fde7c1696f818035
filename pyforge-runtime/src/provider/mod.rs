//! # LLM Provider Interface
//!
//! A trait-based abstraction for communicating with the local model runtime.
//!
//! ## Design
//! - `LlmProvider` trait defines the core interface
//! - `OllamaProvider` talks to an Ollama daemon over its native HTTP API
//! - Streaming via async iterators (Ollama emits newline-delimited JSON)
//! - Usage tracking from the runtime's token counters

pub mod ollama;

pub use ollama::OllamaProvider;

use pyforge_error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

// ============================================================================
// Core Types
// ============================================================================

/// A chat message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Request parameters for a completion
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Response from a completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub model: String,
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Unknown,
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl Usage {
    pub fn total_tokens(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}

/// A streaming chunk from the model
#[derive(Debug, Clone)]
pub enum StreamChunk {
    /// Text content delta
    Text(String),
    /// Stream finished
    Done {
        finish_reason: FinishReason,
        usage: Option<Usage>,
    },
    /// Error occurred
    Error(String),
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Error type for provider operations
#[derive(Debug)]
pub enum ProviderError {
    /// Network/connection error
    Network(String),
    /// API returned an error
    Api { status: u16, message: String },
    /// Failed to parse response
    Parse(String),
    /// Model not installed in the runtime
    ModelNotFound(String),
    /// Model produced no content
    EmptyResponse,
    /// Other error
    Other(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(e) => write!(f, "Network error: {}", e),
            Self::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            Self::Parse(e) => write!(f, "Parse error: {}", e),
            Self::ModelNotFound(m) => write!(f, "Model not found: {}", m),
            Self::EmptyResponse => write!(f, "Model returned no content"),
            Self::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        let (kind, message) = match &err {
            ProviderError::Network(e) => (ErrorKind::ModelUnavailable, e.clone()),
            ProviderError::Api { status, message } => (
                ErrorKind::ApiFailed,
                format!("status {}: {}", status, message),
            ),
            ProviderError::Parse(e) => (ErrorKind::ParseFailed, e.clone()),
            ProviderError::ModelNotFound(m) => {
                (ErrorKind::ModelNotFound, format!("model '{}' is not installed", m))
            }
            ProviderError::EmptyResponse => {
                (ErrorKind::EmptyResponse, "model returned an empty response".to_string())
            }
            ProviderError::Other(e) => (ErrorKind::Unexpected, e.clone()),
        };
        Error::new(kind, message)
            .with_operation("provider")
            .set_source(err)
    }
}

/// The main LLM provider trait
#[allow(async_fn_in_trait)]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "ollama")
    fn name(&self) -> &str;

    /// Get the default model
    fn default_model(&self) -> &str;

    /// Send a completion request and get a full response
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Send a completion request and stream the response
    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver, ProviderError>;

    /// Simple prompt -> response helper
    async fn prompt(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)]);
        let response = self.complete(request).await?;
        Ok(response.content)
    }

    /// Chat with message history
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ProviderError> {
        let request = CompletionRequest::new(messages);
        let response = self.complete(request).await?;
        Ok(response.content)
    }
}

/// Receiver for streaming responses
pub struct StreamReceiver {
    inner: Pin<Box<dyn futures_core::Stream<Item = StreamChunk> + Send>>,
}

impl StreamReceiver {
    pub fn new<S>(stream: S) -> Self
    where
        S: futures_core::Stream<Item = StreamChunk> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Pull the next chunk off the stream
    pub async fn next(&mut self) -> Option<StreamChunk> {
        use futures_util::StreamExt;
        self.inner.next().await
    }

    /// Collect all text chunks into a single string, invoking `on_token`
    /// for each delta as it arrives.
    pub async fn collect_text_with(
        mut self,
        mut on_token: impl FnMut(&str),
    ) -> Result<(String, Option<Usage>), ProviderError> {
        let mut text = String::new();
        let mut usage = None;

        while let Some(chunk) = self.next().await {
            match chunk {
                StreamChunk::Text(t) => {
                    on_token(&t);
                    text.push_str(&t);
                }
                StreamChunk::Done { usage: u, .. } => {
                    usage = u;
                    break;
                }
                StreamChunk::Error(e) => return Err(ProviderError::Other(e)),
            }
        }
        Ok((text, usage))
    }

    /// Collect all text chunks into a single string
    pub async fn collect_text(self) -> Result<String, ProviderError> {
        let (text, _) = self.collect_text_with(|_| {}).await?;
        Ok(text)
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Configuration for creating providers
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub default_model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Connect to a local Ollama daemon.
    /// Default endpoint: http://localhost:11434
    pub fn ollama() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            default_model: "qwen3-coder-v4".into(),
            temperature: 0.7,
            top_p: 0.9,
            timeout_secs: 300,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let sys = ChatMessage::system("You are an expert Python programmer");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.content, "You are an expert Python programmer");

        let user = ChatMessage::user("print hello");
        assert_eq!(user.role, Role::User);

        let asst = ChatMessage::assistant("print('hello')");
        assert_eq!(asst.role, Role::Assistant);
    }

    #[test]
    fn test_role_serialization() {
        let msg = ChatMessage::user("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new(vec![ChatMessage::user("hello")])
            .with_model("qwen3:4b")
            .with_temperature(0.7)
            .with_top_p(0.9)
            .with_streaming(true);

        assert_eq!(request.model, Some("qwen3:4b".into()));
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.top_p, Some(0.9));
        assert!(request.stream);
    }

    #[test]
    fn test_provider_config() {
        let config = ProviderConfig::ollama();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.default_model, "qwen3-coder-v4");

        let config = ProviderConfig::ollama()
            .with_base_url("http://localhost:9999")
            .with_model("qwen3:4b")
            .with_timeout(60);
        assert_eq!(config.base_url, "http://localhost:9999");
        assert_eq!(config.default_model, "qwen3:4b");
        assert_eq!(config.timeout_secs, 60);
    }

    #[test]
    fn test_usage_total() {
        let usage = Usage {
            prompt_tokens: 120,
            completion_tokens: 30,
        };
        assert_eq!(usage.total_tokens(), 150);
    }

    #[test]
    fn test_provider_error_into_error() {
        let err: Error = ProviderError::Network("connection refused".into()).into();
        assert_eq!(err.kind(), ErrorKind::ModelUnavailable);
        assert!(err.is_retryable());

        let err: Error = ProviderError::ModelNotFound("qwen3-coder-v4".into()).into();
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_stream_receiver_collect() {
        let chunks = vec![
            StreamChunk::Text("print".into()),
            StreamChunk::Text("(2+2)".into()),
            StreamChunk::Done {
                finish_reason: FinishReason::Stop,
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 4,
                }),
            },
        ];
        let receiver = StreamReceiver::new(futures_util::stream::iter(chunks));

        let mut seen = Vec::new();
        let (text, usage) = receiver
            .collect_text_with(|t| seen.push(t.to_string()))
            .await
            .unwrap();

        assert_eq!(text, "print(2+2)");
        assert_eq!(seen, vec!["print", "(2+2)"]);
        assert_eq!(usage.unwrap().completion_tokens, 4);
    }

    #[tokio::test]
    async fn test_stream_receiver_error() {
        let chunks = vec![
            StreamChunk::Text("partial".into()),
            StreamChunk::Error("connection reset".into()),
        ];
        let receiver = StreamReceiver::new(futures_util::stream::iter(chunks));
        assert!(receiver.collect_text().await.is_err());
    }
}
