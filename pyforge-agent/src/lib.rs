//! # Pyforge Agent
//!
//! The agent orchestrates the model <-> sandbox loop:
//! 1. User provides a task description
//! 2. The model generates Python source for it
//! 3. The sandbox runs the source with a wall-clock timeout
//! 4. On failure, the error is fed back to the model for another attempt
//! 5. The loop is bounded by the retry budget
//!
//! The model proposes, the sandbox disposes.

mod agent;
mod prompt;

pub use agent::{Agent, AgentConfig, AgentEvent, ChatReply, TaskOutcome};
pub use prompt::{fix_prompt, Conversation, SYSTEM_PROMPT};
