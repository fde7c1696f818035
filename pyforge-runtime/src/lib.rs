//! # Pyforge Runtime
//!
//! The mechanical layer of the assistant:
//! - **Provider**: trait-based communication with the local model runtime (Ollama)
//! - **Extract**: turning raw model output into runnable Python source
//! - **Sandbox**: subprocess execution with output capture and a wall-clock timeout

pub mod extract;
pub mod provider;
pub mod sandbox;

pub use extract::{extract_code, strip_think};
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, OllamaProvider,
    ProviderConfig, ProviderError, Role, StreamChunk, StreamReceiver, Usage,
};
pub use sandbox::{save_code, CodeExecutor, ExecutionOutcome, FailureReason, Sandbox};

pub use pyforge_error::{Error, ErrorKind, ErrorStatus, Result};
