//! Ollama provider implementation
//!
//! Talks to a local Ollama daemon over its native HTTP API:
//! `POST /api/chat` for completions, `GET /api/tags` for installed models.
//!
//! Default endpoint: http://localhost:11434

use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Ollama provider - connects to a locally running Ollama daemon
pub struct OllamaProvider {
    client: Client,
    config: ProviderConfig,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// Create with default local daemon settings
    pub fn local() -> Self {
        Self::new(ProviderConfig::ollama())
    }

    fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn network_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_connect() {
            ProviderError::Network(format!(
                "cannot connect to Ollama at {}. Run 'ollama serve' first.",
                self.base_url()
            ))
        } else if err.is_timeout() {
            ProviderError::Network(format!(
                "request to Ollama timed out after {}s",
                self.config.timeout_secs
            ))
        } else {
            ProviderError::Network(err.to_string())
        }
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        model: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        // Ollama reports an unknown model as a 404 with an error body
        if status.as_u16() == 404 && text.contains("not found") {
            return Err(ProviderError::ModelNotFound(model.to_string()));
        }
        Err(ProviderError::Api {
            status: status.as_u16(),
            message: text,
        })
    }

    /// List models installed in the local daemon
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url()))
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        if !response.status().is_success() {
            return Err(ProviderError::Api {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Check if the daemon answers at all
    pub async fn health_check(&self) -> bool {
        self.list_models().await.is_ok()
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> OllamaRequest {
        OllamaRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.config.default_model.clone()),
            messages: request.messages.clone(),
            stream,
            options: OllamaOptions {
                temperature: request.temperature.unwrap_or(self.config.temperature),
                top_p: request.top_p.unwrap_or(self.config.top_p),
            },
        }
    }
}

impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let api_request = self.build_request(&request, false);
        let model = api_request.model.clone();

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url()))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let response = self.check_status(response, &model).await?;

        let api_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let content = api_response
            .message
            .map(|m| m.content)
            .filter(|c| !c.is_empty())
            .ok_or(ProviderError::EmptyResponse)?;

        Ok(CompletionResponse {
            model: api_response.model.unwrap_or(model),
            content,
            finish_reason: finish_reason(api_response.done_reason.as_deref()),
            usage: Usage {
                prompt_tokens: api_response.prompt_eval_count.unwrap_or(0),
                completion_tokens: api_response.eval_count.unwrap_or(0),
            },
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamReceiver, ProviderError> {
        let api_request = self.build_request(&request, true);
        let model = api_request.model.clone();

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url()))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let response = self.check_status(response, &model).await?;

        // Ollama streams newline-delimited JSON objects, one per token batch
        let stream = async_stream::stream! {
            use futures_util::StreamExt;

            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim().to_string();
                            buffer = buffer[pos + 1..].to_string();

                            if line.is_empty() {
                                continue;
                            }

                            match serde_json::from_str::<OllamaChatResponse>(&line) {
                                Ok(piece) => {
                                    if let Some(msg) = &piece.message {
                                        if !msg.content.is_empty() {
                                            yield StreamChunk::Text(msg.content.clone());
                                        }
                                    }
                                    if piece.done {
                                        yield StreamChunk::Done {
                                            finish_reason: finish_reason(piece.done_reason.as_deref()),
                                            usage: Some(Usage {
                                                prompt_tokens: piece.prompt_eval_count.unwrap_or(0),
                                                completion_tokens: piece.eval_count.unwrap_or(0),
                                            }),
                                        };
                                        return;
                                    }
                                }
                                Err(e) => {
                                    yield StreamChunk::Error(format!("bad stream line: {}", e));
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield StreamChunk::Error(e.to_string());
                        return;
                    }
                }
            }
        };

        Ok(StreamReceiver::new(stream))
    }
}

fn finish_reason(done_reason: Option<&str>) -> FinishReason {
    match done_reason {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        _ => FinishReason::Unknown,
    }
}

// ============================================================================
// Ollama API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    model: Option<String>,
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<usize>,
    eval_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

// ============================================================================
// Tests
// ============================================================================
