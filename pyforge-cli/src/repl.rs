//! Interactive session: prompt loop, slash commands, and rendering.

use crate::model_config::FALLBACK_MODEL;
use colored::Colorize;
use pyforge_agent::{Agent, AgentEvent, TaskOutcome};
use pyforge_runtime::{
    save_code, strip_think, ExecutionOutcome, FailureReason, OllamaProvider, Sandbox,
};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Code most recently shown to the user, shared with the event renderer
/// so `/run` and `/save` always see the latest attempt.
pub type LastCode = Arc<Mutex<Option<String>>>;

type ReplAgent = Agent<OllamaProvider, Sandbox>;

// ============================================================================
// Slash commands
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Quit,
    Help,
    Run,
    Save(Option<String>),
    Model(Option<String>),
    Auto(Option<bool>),
    MaxFix(Option<usize>),
    Unknown(String),
}

/// Parse a slash command; returns None for ordinary input
pub fn parse_command(line: &str) -> Option<ReplCommand> {
    if !line.starts_with('/') {
        return None;
    }
    let mut parts = line.split_whitespace();
    let head = parts.next()?.to_lowercase();
    let arg = parts.next();

    Some(match head.as_str() {
        "/quit" | "/exit" => ReplCommand::Quit,
        "/help" => ReplCommand::Help,
        "/run" => ReplCommand::Run,
        "/save" => ReplCommand::Save(arg.map(str::to_string)),
        "/model" => ReplCommand::Model(arg.map(str::to_string)),
        "/auto" => ReplCommand::Auto(match arg.map(str::to_lowercase).as_deref() {
            Some("on") => Some(true),
            Some("off") => Some(false),
            _ => None,
        }),
        "/max_fix" => ReplCommand::MaxFix(arg.and_then(|n| n.parse().ok())),
        other => ReplCommand::Unknown(other.to_string()),
    })
}

// ============================================================================
// Rendering
// ============================================================================

pub fn banner(model: &str) {
    let top = "╔══════════════════════════════════════════╗";
    let mid1 = "║            Pyforge  v0.1  CLI            ║";
    let mid2 = "║   Local AI Coding Assistant (Offline)    ║";
    let bottom = "╚══════════════════════════════════════════╝";
    println!("{}", top.cyan().bold());
    println!("{}", mid1.cyan().bold());
    println!("{}", mid2.cyan().bold());
    println!("{}", bottom.cyan().bold());
    println!("{}", format!("Model: {} | Engine: Ollama", model).dimmed());
    println!("{}", "Type your request. Commands: /help for list".dimmed());
}

fn help() {
    println!("{}", "Commands:".bold());
    println!("  {}            Re-run last code", "/run".cyan());
    println!("  {}    Save last code to file", "/save <path>".cyan());
    println!("  {}          Show/change model", "/model".cyan());
    println!("  {}    Toggle auto-execution (default: on)", "/auto on|off".cyan());
    println!("  {}    Set max auto-fix attempts (default: 3)", "/max_fix <n>".cyan());
    println!("  {}           Show this help", "/help".cyan());
    println!("  {}           Exit", "/quit".cyan());
    println!();
    println!("{}", "Usage:".bold());
    println!("  Type a request in natural language.");
    println!("  The model generates Python code, executes it, and auto-fixes errors.");
}

/// Print source with dim right-aligned line numbers
pub fn print_code(source: &str) {
    let lines: Vec<&str> = source.lines().collect();
    let width = lines.len().to_string().len();
    for (i, line) in lines.iter().enumerate() {
        println!("  {} {}", format!("{:>width$} |", i + 1).dimmed(), line);
    }
}

/// Render one execution outcome the way the session shows results
pub fn print_outcome(outcome: &ExecutionOutcome) {
    let elapsed = format!("({:.1}s)", outcome.duration().as_secs_f64());
    match outcome {
        ExecutionOutcome::Success { stdout, .. } => {
            println!();
            println!("{} {}", "[OK]".green().bold(), elapsed.dimmed());
            if !stdout.trim().is_empty() {
                println!("{}", "Output:".green());
                for line in stdout.trim_end().lines() {
                    println!("  {}", line);
                }
            }
        }
        ExecutionOutcome::Failure {
            stdout,
            stderr,
            reason,
            ..
        } => {
            // Timeouts are labelled apart from wrong code: the user needs
            // to know the program hung rather than crashed
            let label = match reason {
                FailureReason::TimedOut => "[TIMEOUT]",
                FailureReason::Cancelled => "[CANCELLED]",
                FailureReason::ExitCode(_) => "[ERROR]",
            };
            println!();
            println!("{} {}", label.red().bold(), elapsed.dimmed());
            if !stderr.trim().is_empty() {
                println!("{}", "Error:".red());
                for line in stderr.trim_end().lines() {
                    println!("  {}", line);
                }
            }
            if !stdout.trim().is_empty() {
                println!("{}", "Output before error:".dimmed());
                for line in stdout.trim_end().lines() {
                    println!("  {}", line);
                }
            }
        }
    }
}

/// Build the agent's progress renderer. Quiet mode suppresses everything;
/// the one-shot summary handles output instead.
pub fn render_event(last_code: LastCode, quiet: bool) -> impl FnMut(AgentEvent<'_>) + Send {
    move |event| {
        if let AgentEvent::CodeReady { source, .. } = &event {
            *last_code.lock().unwrap() = Some(source.to_string());
        }
        if quiet {
            return;
        }
        match event {
            AgentEvent::Token(token) => {
                print!("{}", token.dimmed());
                let _ = std::io::stdout().flush();
            }
            AgentEvent::CodeReady { attempt, source } => {
                if attempt == 0 {
                    println!();
                    println!("{}", "Executing...".cyan());
                } else {
                    println!();
                    println!("{} Fixed code:", "Agent >".magenta().bold());
                    println!();
                    print_code(source);
                    println!();
                    println!("{}", "Re-executing...".cyan());
                }
            }
            AgentEvent::Outcome { outcome, .. } => print_outcome(outcome),
            AgentEvent::Retrying { attempt, budget } => {
                println!();
                println!(
                    "{}",
                    format!("Auto-fixing (attempt {}/{})...", attempt, budget).yellow()
                );
            }
        }
    }
}

/// Read a value for an `input()` prompt found in generated code
pub fn prompt_for_input(prompt: &str) -> Option<String> {
    print!("{}", format!("[input] {}", prompt).yellow());
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

// ============================================================================
// Session loop
// ============================================================================

enum Flow {
    Continue,
    Quit,
}

pub async fn run(mut agent: ReplAgent, last_code: LastCode) {
    banner(agent.model());

    // The daemon must answer before the session is worth starting
    let installed = match agent.provider().list_models().await {
        Ok(models) => models,
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            return;
        }
    };
    if installed.is_empty() {
        println!(
            "{}",
            "No models installed. Run 'pyforge setup' first.".yellow()
        );
        return;
    }
    check_model(&mut agent, &installed);

    let mut auto = true;

    loop {
        print!("\n{} ", "You >".green().bold());
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => {
                println!("\n{}", "Bye!".dimmed());
                break;
            }
            Ok(_) => {}
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = parse_command(input) {
            match handle_command(&mut agent, command, &mut auto, &last_code).await {
                Flow::Quit => break,
                Flow::Continue => continue,
            }
        }

        chat_flow(&mut agent, input, auto, &last_code).await;
    }
}

/// Warn when the configured model is not installed; fall back if possible
fn check_model(agent: &mut ReplAgent, installed: &[String]) {
    let has = |wanted: &str| {
        let base = wanted.split(':').next().unwrap_or(wanted);
        installed
            .iter()
            .any(|name| name == wanted || name.split(':').next() == Some(base))
    };

    let configured = agent.model().to_string();
    if has(&configured) {
        return;
    }

    println!(
        "{}",
        format!("Warning: Model '{}' not found.", configured).yellow()
    );
    println!("{}", format!("Available: {}", installed.join(", ")).dimmed());
    if has(FALLBACK_MODEL) {
        agent.set_model(FALLBACK_MODEL);
        println!("{}", format!("Using fallback: {}", FALLBACK_MODEL).yellow());
    }
}

async fn handle_command(
    agent: &mut ReplAgent,
    command: ReplCommand,
    auto: &mut bool,
    last_code: &LastCode,
) -> Flow {
    match command {
        ReplCommand::Quit => {
            println!("{}", "Bye!".dimmed());
            return Flow::Quit;
        }
        ReplCommand::Help => help(),
        ReplCommand::Run => {
            let code = last_code.lock().unwrap().clone();
            match code {
                Some(code) => {
                    println!("\n{}", "Re-running last code...".cyan());
                    match agent.execute_only(&code).await {
                        Ok(outcome) => print_outcome(&outcome),
                        Err(e) => eprintln!("{} {}", "Error:".red(), e),
                    }
                }
                None => println!("{}", "No code to run.".yellow()),
            }
        }
        ReplCommand::Save(None) => println!("{}", "Usage: /save <filepath>".yellow()),
        ReplCommand::Save(Some(path)) => {
            let code = last_code.lock().unwrap().clone();
            match code {
                Some(code) => match save_code(&code, &path) {
                    Ok(()) => println!("{}", format!("Saved to {}", path).green()),
                    Err(e) => eprintln!("{} {}", "Error:".red(), e),
                },
                None => println!("{}", "No code to save.".yellow()),
            }
        }
        ReplCommand::Model(Some(model)) => {
            agent.set_model(&model);
            println!("{}", format!("Model set to: {}", model).green());
        }
        ReplCommand::Model(None) => {
            println!("{}", format!("Current model: {}", agent.model()).cyan());
            match agent.provider().list_models().await {
                Ok(models) => {
                    println!("{}", format!("Available: {}", models.join(", ")).dimmed())
                }
                Err(e) => eprintln!("{} {}", "Error:".red(), e),
            }
        }
        ReplCommand::Auto(Some(enabled)) => {
            *auto = enabled;
            println!(
                "{}",
                format!("Auto-execution: {}", if *auto { "ON" } else { "OFF" }).green()
            );
        }
        ReplCommand::Auto(None) => {
            println!(
                "{}",
                format!("Auto-execution: {}", if *auto { "ON" } else { "OFF" }).cyan()
            );
        }
        ReplCommand::MaxFix(Some(0)) => {
            println!("{}", "Max fix attempts must be at least 1.".yellow())
        }
        ReplCommand::MaxFix(Some(n)) => {
            agent.set_retry_budget(n);
            println!("{}", format!("Max fix attempts: {}", n).green());
        }
        ReplCommand::MaxFix(None) => {
            println!(
                "{}",
                format!("Max fix attempts: {}", agent.config().retry_budget).cyan()
            );
        }
        ReplCommand::Unknown(_) => println!("{}", "Unknown command. Type /help".yellow()),
    }
    Flow::Continue
}

async fn chat_flow(agent: &mut ReplAgent, input: &str, auto: bool, last_code: &LastCode) {
    println!();
    print!("{} ", "Agent >".magenta().bold());
    let _ = std::io::stdout().flush();

    let reply = match agent.chat_once(input).await {
        Ok(reply) => reply,
        Err(e) => {
            println!();
            eprintln!("{} {}", "Error:".red(), e);
            return;
        }
    };
    println!();

    match reply.code {
        Some(code) => {
            *last_code.lock().unwrap() = Some(code.clone());
            println!("{} Here's the code:\n", "Agent >".magenta().bold());
            print_code(&code);

            if auto {
                match agent.auto_fix(input, code).await {
                    Ok(outcome) => summarize(&outcome),
                    Err(e) => eprintln!("{} {}", "Error:".red(), e),
                }
            }
        }
        None => {
            println!("{} {}", "Agent >".magenta().bold(), strip_think(&reply.raw));
        }
    }
}

/// Final lines after the retry loop ends; per-attempt detail was already
/// rendered by the event callback.
pub fn summarize(outcome: &TaskOutcome) {
    match outcome {
        TaskOutcome::Succeeded { .. } => {}
        TaskOutcome::ExhaustedRetries { attempts, .. } => {
            println!(
                "{}",
                format!("Max fix attempts reached ({}).", attempts).red()
            );
        }
        TaskOutcome::GenerationFailed { error } => {
            eprintln!("{} {}", "Could not generate fix:".red(), error);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinary_input_is_not_a_command() {
        assert_eq!(parse_command("print hello world"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("/quit"), Some(ReplCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ReplCommand::Quit));
        assert_eq!(parse_command("/help"), Some(ReplCommand::Help));
        assert_eq!(parse_command("/run"), Some(ReplCommand::Run));
    }

    #[test]
    fn test_command_head_is_case_insensitive() {
        assert_eq!(parse_command("/QUIT"), Some(ReplCommand::Quit));
        assert_eq!(parse_command("/Help"), Some(ReplCommand::Help));
    }

    #[test]
    fn test_parse_save_preserves_path_case() {
        assert_eq!(
            parse_command("/save /tmp/MyScript.py"),
            Some(ReplCommand::Save(Some("/tmp/MyScript.py".to_string())))
        );
        assert_eq!(parse_command("/save"), Some(ReplCommand::Save(None)));
    }

    #[test]
    fn test_parse_model() {
        assert_eq!(
            parse_command("/model qwen3:4b"),
            Some(ReplCommand::Model(Some("qwen3:4b".to_string())))
        );
        assert_eq!(parse_command("/model"), Some(ReplCommand::Model(None)));
    }

    #[test]
    fn test_parse_auto() {
        assert_eq!(parse_command("/auto on"), Some(ReplCommand::Auto(Some(true))));
        assert_eq!(parse_command("/auto off"), Some(ReplCommand::Auto(Some(false))));
        assert_eq!(parse_command("/auto ON"), Some(ReplCommand::Auto(Some(true))));
        assert_eq!(parse_command("/auto"), Some(ReplCommand::Auto(None)));
        assert_eq!(parse_command("/auto maybe"), Some(ReplCommand::Auto(None)));
    }

    #[test]
    fn test_parse_max_fix() {
        assert_eq!(parse_command("/max_fix 5"), Some(ReplCommand::MaxFix(Some(5))));
        assert_eq!(parse_command("/max_fix"), Some(ReplCommand::MaxFix(None)));
        assert_eq!(parse_command("/max_fix lots"), Some(ReplCommand::MaxFix(None)));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            parse_command("/frobnicate"),
            Some(ReplCommand::Unknown("/frobnicate".to_string()))
        );
    }
}
