//! Agent implementation - the bounded generate -> execute -> fix loop

use crate::prompt::{fix_prompt, Conversation};
use pyforge_error::{Error, ErrorKind, Result};
use pyforge_runtime::{
    extract_code, CodeExecutor, CompletionRequest, ExecutionOutcome, LlmProvider,
};

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum number of generate+execute attempts per task
    pub retry_budget: usize,
    /// Stream generation token-by-token (emits `AgentEvent::Token`)
    pub stream: bool,
    /// Model override; falls back to the provider default when unset
    pub model: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            retry_budget: 3,
            stream: false,
            model: None,
        }
    }
}

/// Progress notifications emitted while a task runs
#[derive(Debug)]
pub enum AgentEvent<'a> {
    /// A streamed generation delta
    Token(&'a str),
    /// Source for this attempt is ready to execute
    CodeReady { attempt: usize, source: &'a str },
    /// Execution of this attempt finished
    Outcome {
        attempt: usize,
        outcome: &'a ExecutionOutcome,
    },
    /// A failed attempt is being regenerated with its diagnostic
    Retrying { attempt: usize, budget: usize },
}

type EventCallback = Box<dyn FnMut(AgentEvent<'_>) + Send>;

/// One generation result: the raw model text and any code found in it
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub raw: String,
    pub code: Option<String>,
}

/// Terminal state of one task
#[derive(Debug)]
pub enum TaskOutcome {
    /// An attempt exited zero before the timeout
    Succeeded { attempts: usize, stdout: String },
    /// Every attempt within the budget failed
    ExhaustedRetries {
        attempts: usize,
        last_source: String,
        last_diagnostic: String,
    },
    /// The model collaborator could not produce usable code; never retried
    GenerationFailed { error: Error },
}

/// Immutable context carried from a failed attempt into the next generation
struct FixContext {
    source: String,
    diagnostic: String,
}

/// How the first attempt of a task obtains its source
enum FirstAttempt {
    Generate,
    Execute(String),
}

/// The agent orchestrator - owns the provider, the executor, and the
/// rolling conversation. Strictly sequential: one attempt in flight.
pub struct Agent<P: LlmProvider, E: CodeExecutor> {
    provider: P,
    executor: E,
    config: AgentConfig,
    conversation: Conversation,
    events: Option<EventCallback>,
}

impl<P: LlmProvider, E: CodeExecutor> Agent<P, E> {
    pub fn new(provider: P, executor: E, config: AgentConfig) -> Self {
        Self {
            provider,
            executor,
            config,
            conversation: Conversation::new(),
            events: None,
        }
    }

    /// Install a progress callback (used by the CLI for rendering)
    pub fn with_event_callback(mut self, callback: impl FnMut(AgentEvent<'_>) + Send + 'static) -> Self {
        self.events = Some(Box::new(callback));
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.config.model = Some(model.into());
    }

    pub fn model(&self) -> &str {
        self.config
            .model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn set_retry_budget(&mut self, budget: usize) {
        self.config.retry_budget = budget;
    }

    /// Run source directly, outside the retry loop (the `/run` command)
    pub async fn execute_only(&mut self, source: &str) -> Result<ExecutionOutcome> {
        self.executor.execute(source).await
    }

    /// One generation without execution: ask the model, record the
    /// exchange, extract code if there is any. The REPL uses this to tell
    /// conversational answers apart from runnable replies.
    pub async fn chat_once(&mut self, input: &str) -> Result<ChatReply> {
        self.request(input).await
    }

    /// Run a task through the full loop: generate, execute, auto-fix
    /// failures, bounded by the retry budget.
    pub async fn run_task(&mut self, task: &str) -> Result<TaskOutcome> {
        self.drive(task, FirstAttempt::Generate).await
    }

    /// Run the loop starting from already-generated source: execute it
    /// first, then auto-fix failures within the remaining budget.
    pub async fn auto_fix(&mut self, task: &str, source: String) -> Result<TaskOutcome> {
        self.drive(task, FirstAttempt::Execute(source)).await
    }

    async fn drive(&mut self, task: &str, first: FirstAttempt) -> Result<TaskOutcome> {
        if task.trim().is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgument, "task must not be empty")
                .with_operation("agent::run_task"));
        }
        let budget = self.config.retry_budget;
        if budget == 0 {
            return Err(Error::config_invalid("retry budget must be positive")
                .with_operation("agent::run_task"));
        }

        let mut pending = match first {
            FirstAttempt::Generate => None,
            FirstAttempt::Execute(source) => Some(source),
        };
        let mut fix: Option<FixContext> = None;

        for attempt in 0..budget {
            let source = match pending.take() {
                Some(source) => source,
                None => {
                    let prompt = match &fix {
                        Some(context) => fix_prompt(&context.diagnostic, &context.source),
                        None => task.to_string(),
                    };
                    let reply = match self.request(&prompt).await {
                        Ok(reply) => reply,
                        Err(error) => return Ok(TaskOutcome::GenerationFailed { error }),
                    };
                    match reply.code {
                        Some(code) => code,
                        None => {
                            let error = Error::code_not_found("model response contained no code")
                                .with_operation("agent::generate")
                                .with_context("attempt", attempt.to_string());
                            return Ok(TaskOutcome::GenerationFailed { error });
                        }
                    }
                }
            };

            self.emit(AgentEvent::CodeReady {
                attempt,
                source: &source,
            });

            let outcome = self.executor.execute(&source).await?;
            self.emit(AgentEvent::Outcome {
                attempt,
                outcome: &outcome,
            });

            match outcome {
                ExecutionOutcome::Success { stdout, .. } => {
                    return Ok(TaskOutcome::Succeeded {
                        attempts: attempt + 1,
                        stdout,
                    });
                }
                failure => {
                    let diagnostic = failure.diagnostic().to_string();
                    if attempt + 1 == budget {
                        return Ok(TaskOutcome::ExhaustedRetries {
                            attempts: budget,
                            last_source: source,
                            last_diagnostic: diagnostic,
                        });
                    }
                    self.emit(AgentEvent::Retrying {
                        attempt: attempt + 1,
                        budget,
                    });
                    fix = Some(FixContext { source, diagnostic });
                }
            }
        }

        Err(Error::unexpected("retry loop ended without a terminal state")
            .with_operation("agent::run_task"))
    }

    async fn request(&mut self, user_prompt: &str) -> Result<ChatReply> {
        let messages = self.conversation.build_messages(user_prompt);
        let mut completion = CompletionRequest::new(messages);
        if let Some(model) = &self.config.model {
            completion = completion.with_model(model.clone());
        }

        let raw = if self.config.stream {
            let receiver = self
                .provider
                .stream(completion.with_streaming(true))
                .await
                .map_err(Error::from)?;
            let events = &mut self.events;
            let (text, _usage) = receiver
                .collect_text_with(|token| {
                    if let Some(callback) = events.as_mut() {
                        callback(AgentEvent::Token(token));
                    }
                })
                .await
                .map_err(Error::from)?;
            text
        } else {
            self.provider
                .complete(completion)
                .await
                .map_err(Error::from)?
                .content
        };

        if raw.trim().is_empty() {
            return Err(Error::empty_response().with_operation("agent::generate"));
        }

        self.conversation.push_exchange(user_prompt, &raw);
        let code = extract_code(&raw);
        Ok(ChatReply { raw, code })
    }

    fn emit(&mut self, event: AgentEvent<'_>) {
        if let Some(callback) = self.events.as_mut() {
            callback(event);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
