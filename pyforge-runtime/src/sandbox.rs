//! Sandboxed Python execution with output capture and a wall-clock timeout.
//!
//! Each `Sandbox` owns a private scratch directory; candidate source is
//! written there and run as a child process with piped output. A process
//! that outlives the timeout is killed and reported as `TimedOut`. Partial
//! output of a timed-out run is discarded - the retry diagnostic carries a
//! synthetic "execution timed out" message instead.

use pyforge_error::{Error, ErrorKind, Result};
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;

/// Why an execution counted as a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The process exited with a non-zero status
    ExitCode(i32),
    /// The process was killed after the wall-clock timeout elapsed
    TimedOut,
    /// The user cancelled an interactive input prompt
    Cancelled,
}

/// Outcome of running one candidate source
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Success {
        stdout: String,
        stderr: String,
        duration: Duration,
    },
    Failure {
        stdout: String,
        stderr: String,
        reason: FailureReason,
        duration: Duration,
    },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    pub fn duration(&self) -> Duration {
        match self {
            ExecutionOutcome::Success { duration, .. } => *duration,
            ExecutionOutcome::Failure { duration, .. } => *duration,
        }
    }

    /// The diagnostic text fed back to the model on a fix attempt
    pub fn diagnostic(&self) -> &str {
        match self {
            ExecutionOutcome::Success { .. } => "",
            ExecutionOutcome::Failure { stderr, .. } => stderr,
        }
    }
}

/// Mechanical execution of candidate source.
///
/// The trait exists so the retry controller can be driven by a stub in
/// tests; `Sandbox` is the real implementation.
#[allow(async_fn_in_trait)]
pub trait CodeExecutor {
    async fn execute(&mut self, source: &str) -> Result<ExecutionOutcome>;
}

/// Callback used to satisfy `input()` prompts found in generated code.
/// Returning `None` cancels the run.
pub type InputCallback = Box<dyn FnMut(&str) -> Option<String> + Send>;

/// Runs Python source in an isolated subprocess
pub struct Sandbox {
    workdir: TempDir,
    python: String,
    timeout: Duration,
    input_callback: Option<InputCallback>,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("workdir", &self.workdir)
            .field("python", &self.python)
            .field("timeout", &self.timeout)
            .field(
                "input_callback",
                &self.input_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Sandbox {
    /// Create a sandbox with its own scratch directory.
    /// The timeout must be positive.
    pub fn new(timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::config_invalid("execution timeout must be positive")
                .with_operation("sandbox::new"));
        }
        let workdir = TempDir::with_prefix("pyforge_exec_").map_err(|e| {
            Error::new(ErrorKind::SandboxFailed, "could not create scratch directory")
                .with_operation("sandbox::new")
                .set_source(e)
        })?;

        Ok(Self {
            workdir,
            python: "python3".to_string(),
            timeout,
            input_callback: None,
        })
    }

    /// Use a specific interpreter binary instead of `python3`
    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    /// Change the execution timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set a callback for handling `input()` prompts in generated code.
    /// callback(prompt_text) -> user value, or None to cancel.
    pub fn set_input_callback(&mut self, callback: InputCallback) {
        self.input_callback = Some(callback);
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    async fn run(&mut self, source: &str) -> Result<ExecutionOutcome> {
        // Satisfy input() prompts up front by rewriting the calls
        let mut rewritten = None;
        if let Some(callback) = self.input_callback.as_mut() {
            let prompts = detect_inputs(source);
            if !prompts.is_empty() {
                let mut values = Vec::with_capacity(prompts.len());
                for prompt in &prompts {
                    match callback(&prompt.text) {
                        Some(value) => values.push(value),
                        None => {
                            return Ok(ExecutionOutcome::Failure {
                                stdout: String::new(),
                                stderr: "cancelled by user".to_string(),
                                reason: FailureReason::Cancelled,
                                duration: Duration::ZERO,
                            })
                        }
                    }
                }
                rewritten = Some(replace_inputs(source, &prompts, &values));
            }
        }
        let source = rewritten.unwrap_or_else(|| source.to_string());

        let code_file = self.workdir.path().join("run_code.py");
        tokio::fs::write(&code_file, &source).await.map_err(|e| {
            Error::new(ErrorKind::IoFailed, "could not write candidate source")
                .with_operation("sandbox::execute")
                .with_context("path", code_file.display().to_string())
                .set_source(e)
        })?;

        let mut command = Command::new(&self.python);
        command
            .arg(&code_file)
            .current_dir(self.workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONUTF8", "1")
            // Dropping the wait future on timeout must take the child with it
            .kill_on_drop(true);

        let start = Instant::now();

        let child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::interpreter_not_found(&self.python).with_operation("sandbox::execute")
            } else {
                Error::new(ErrorKind::IoFailed, "could not spawn interpreter")
                    .with_operation("sandbox::execute")
                    .set_source(e)
            }
        })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let duration = start.elapsed();
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

                if output.status.success() {
                    Ok(ExecutionOutcome::Success {
                        stdout,
                        stderr,
                        duration,
                    })
                } else {
                    Ok(ExecutionOutcome::Failure {
                        stdout,
                        stderr,
                        reason: FailureReason::ExitCode(output.status.code().unwrap_or(-1)),
                        duration,
                    })
                }
            }
            Ok(Err(e)) => Err(Error::new(ErrorKind::IoFailed, "could not collect process output")
                .with_operation("sandbox::execute")
                .set_source(e)),
            Err(_elapsed) => Ok(ExecutionOutcome::Failure {
                stdout: String::new(),
                stderr: format!("execution timed out after {}s", self.timeout.as_secs_f64()),
                reason: FailureReason::TimedOut,
                duration: start.elapsed(),
            }),
        }
    }
}

impl CodeExecutor for Sandbox {
    async fn execute(&mut self, source: &str) -> Result<ExecutionOutcome> {
        self.run(source).await
    }
}

// ============================================================================
// input() handling
// ============================================================================

/// One `input(...)` call found in candidate source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPrompt {
    /// The full matched call text, e.g. `input("name: ")`
    pub call: String,
    /// The prompt string inside the call, or a generic fallback
    pub text: String,
}

fn input_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"input\s*\(\s*(?:f?["'](.*?)["'])?\s*\)"#).expect("hardcoded regex compiles")
    })
}

/// Detect `input()` calls and their prompt strings
pub fn detect_inputs(source: &str) -> Vec<InputPrompt> {
    input_pattern()
        .captures_iter(source)
        .map(|captures| InputPrompt {
            call: captures[0].to_string(),
            text: captures
                .get(1)
                .map(|m| m.as_str().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Enter value".to_string()),
        })
        .collect()
}

/// Replace each `input()` call with the corresponding literal value
pub fn replace_inputs(source: &str, prompts: &[InputPrompt], values: &[String]) -> String {
    let mut result = source.to_string();
    for (prompt, value) in prompts.iter().zip(values) {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        result = result.replacen(&prompt.call, &format!("\"{}\"", escaped), 1);
    }
    result
}

// ============================================================================
// Saving
// ============================================================================

/// Save source to a user-chosen path, creating parent directories.
pub fn save_code(source: &str, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::new(ErrorKind::IoFailed, "could not create parent directory")
                    .with_operation("sandbox::save_code")
                    .with_context("path", path.display().to_string())
                    .set_source(e)
            })?;
        }
    }
    std::fs::write(path, source).map_err(|e| {
        Error::new(ErrorKind::IoFailed, "could not save code")
            .with_operation("sandbox::save_code")
            .with_context("path", path.display().to_string())
            .set_source(e)
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // The tests drive the sandbox with `sh` as a stand-in interpreter so
    // they do not depend on a Python installation.
    #[cfg(unix)]
    fn shell_sandbox(timeout: Duration) -> Sandbox {
        Sandbox::new(timeout).unwrap().with_python("sh")
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_captures_stdout() {
        let mut sandbox = shell_sandbox(Duration::from_secs(5));
        let outcome = sandbox.execute("echo 4").await.unwrap();
        match outcome {
            ExecutionOutcome::Success { stdout, .. } => assert_eq!(stdout, "4\n"),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let mut sandbox = shell_sandbox(Duration::from_secs(5));
        let outcome = sandbox.execute("echo oops >&2; exit 3").await.unwrap();
        match outcome {
            ExecutionOutcome::Failure { stderr, reason, .. } => {
                assert_eq!(reason, FailureReason::ExitCode(3));
                assert_eq!(stderr, "oops\n");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_kept_on_failure() {
        let mut sandbox = shell_sandbox(Duration::from_secs(5));
        let outcome = sandbox.execute("echo before; exit 1").await.unwrap();
        match outcome {
            ExecutionOutcome::Failure { stdout, .. } => assert_eq!(stdout, "before\n"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let mut sandbox = shell_sandbox(Duration::from_millis(200));
        let start = Instant::now();
        let outcome = sandbox.execute("sleep 10").await.unwrap();
        // Bounded grace: the controller must get the outcome promptly
        assert!(start.elapsed() < Duration::from_millis(700));
        match outcome {
            ExecutionOutcome::Failure { reason, stderr, .. } => {
                assert_eq!(reason, FailureReason::TimedOut);
                assert!(stderr.contains("timed out"));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_interpreter_is_error() {
        let mut sandbox = Sandbox::new(Duration::from_secs(1))
            .unwrap()
            .with_python("definitely-not-a-real-binary");
        let err = sandbox.execute("echo hi").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InterpreterNotFound);
    }

    #[tokio::test]
    async fn test_input_cancel_is_failure() {
        let mut sandbox = Sandbox::new(Duration::from_secs(1)).unwrap();
        sandbox.set_input_callback(Box::new(|_prompt| None));
        let outcome = sandbox.execute("name = input(\"name: \")").await.unwrap();
        match outcome {
            ExecutionOutcome::Failure { reason, .. } => {
                assert_eq!(reason, FailureReason::Cancelled)
            }
            other => panic!("expected cancellation, got {:?}", other),
        }
    }

    #[test]
    fn test_detect_inputs() {
        let source = "a = input(\"first: \")\nb = input('second')\nc = input()";
        let prompts = detect_inputs(source);
        assert_eq!(prompts.len(), 3);
        assert_eq!(prompts[0].text, "first: ");
        assert_eq!(prompts[1].text, "second");
        assert_eq!(prompts[2].text, "Enter value");
    }

    #[test]
    fn test_detect_inputs_fstring() {
        let prompts = detect_inputs("x = input(f\"value for x: \")");
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].text, "value for x: ");
    }

    #[test]
    fn test_replace_inputs() {
        let source = "a = input(\"first: \")\nb = input()";
        let prompts = detect_inputs(source);
        let values = vec!["hello".to_string(), "42".to_string()];
        let rewritten = replace_inputs(source, &prompts, &values);
        assert_eq!(rewritten, "a = \"hello\"\nb = \"42\"");
    }

    #[test]
    fn test_replace_inputs_escapes_quotes() {
        let source = "a = input()";
        let prompts = detect_inputs(source);
        let rewritten = replace_inputs(source, &prompts, &["say \"hi\"".to_string()]);
        assert_eq!(rewritten, "a = \"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = Sandbox::new(Duration::ZERO).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_diagnostic_text() {
        let outcome = ExecutionOutcome::Failure {
            stdout: String::new(),
            stderr: "NameError: name 'x' is not defined".to_string(),
            reason: FailureReason::ExitCode(1),
            duration: Duration::from_millis(10),
        };
        assert!(outcome.diagnostic().contains("NameError"));
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_save_code_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.py");
        save_code("print('hi')\n", &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "print('hi')\n");
    }
}
