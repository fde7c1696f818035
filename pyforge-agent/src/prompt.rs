//! Prompt construction and conversation history.
//!
//! The fix context (prior code + prior diagnostic) is an immutable value
//! threaded through retry iterations; only the rolling conversation window
//! is stateful, and it belongs to the agent alone.

use pyforge_runtime::ChatMessage;

/// System prompt demanding raw, directly runnable Python
pub const SYSTEM_PROMPT: &str = "You are an expert Python programmer. \
    Output ONLY valid Python code. \
    Do NOT include any explanation, markdown formatting, or code fences. \
    Do NOT include ``` markers. \
    Just output the raw Python code that can be executed directly.";

/// How much of a diagnostic is quoted back to the model
const MAX_DIAGNOSTIC_CHARS: usize = 500;

/// How many history messages accompany each request
const WINDOW_MESSAGES: usize = 10;

/// How many history messages are retained at all
const MAX_HISTORY_MESSAGES: usize = 20;

/// Build the prompt for an auto-fix attempt
pub fn fix_prompt(diagnostic: &str, source: &str) -> String {
    format!(
        "The code produced an error:\n```\n{}\n```\n\n\
         Original code:\n```python\n{}\n```\n\n\
         Fix the error. Output the complete corrected Python code only.",
        truncate_chars(diagnostic, MAX_DIAGNOSTIC_CHARS),
        source
    )
}

/// Truncate a string to at most `max_chars` characters (Unicode-safe)
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Rolling conversation history shared across tasks in a session
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one user/assistant exchange, trimming old history
    pub fn push_exchange(&mut self, user: &str, assistant: &str) {
        self.messages.push(ChatMessage::user(user));
        self.messages.push(ChatMessage::assistant(assistant));
        if self.messages.len() > MAX_HISTORY_MESSAGES {
            let excess = self.messages.len() - MAX_HISTORY_MESSAGES;
            self.messages.drain(..excess);
        }
    }

    /// The recent window that accompanies a request
    pub fn window(&self) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(WINDOW_MESSAGES);
        &self.messages[start..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Assemble the full message list for a request:
    /// system prompt + recent window + the new user prompt
    pub fn build_messages(&self, user_prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.window().len() + 2);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend_from_slice(self.window());
        messages.push(ChatMessage::user(user_prompt));
        messages
    }
}
