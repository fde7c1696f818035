//! # Pyforge CLI
//!
//! Command-line interface for the local coding assistant.
//!
//! Usage:
//!   pyforge                    interactive session
//!   pyforge <task>             run one task and exit
//!   pyforge run <task>
//!   pyforge setup              download + register the model
//!   pyforge models             list installed models
//!
//! Examples:
//!   pyforge "print the sum of 2 and 2"
//!   pyforge --max-fix 5 "sort these words: banana apple cherry"
//!   pyforge -m qwen3:4b "print today's date"

mod model_config;
mod repl;
mod setup;

use clap::{Parser, Subcommand};
use colored::Colorize;
use pyforge_agent::{Agent, AgentConfig, TaskOutcome};
use pyforge_error::Result;
use pyforge_runtime::{OllamaProvider, ProviderConfig, Sandbox};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pyforge")]
#[command(author, version, about = "Pyforge - local AI coding assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Task to run non-interactively (when not using subcommands)
    #[arg(trailing_var_arg = true)]
    task: Vec<String>,

    /// Model to use (overrides the configured one)
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Execution timeout in seconds
    #[arg(short, long, global = true, default_value = "30")]
    timeout: u64,

    /// Maximum auto-fix attempts per task
    #[arg(long, global = true, default_value = "3")]
    max_fix: usize,

    /// Quiet mode - only print the final program output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single task and exit
    Run {
        /// The task description
        #[arg(trailing_var_arg = true, required = true)]
        task: Vec<String>,
    },
    /// Start the interactive session
    Chat,
    /// Download the model and register it with Ollama
    Setup,
    /// List models installed in the local Ollama daemon
    Models,
}

fn build_agent(
    cli: &Cli,
    last_code: repl::LastCode,
    interactive: bool,
) -> Result<Agent<OllamaProvider, Sandbox>> {
    if cli.timeout == 0 {
        return Err(pyforge_error::Error::config_invalid(
            "execution timeout must be positive",
        ));
    }

    let model = cli.model.clone().unwrap_or_else(model_config::load_model);
    let provider = OllamaProvider::new(
        ProviderConfig::ollama()
            .with_base_url(model_config::base_url())
            .with_model(model),
    );

    let mut sandbox = Sandbox::new(Duration::from_secs(cli.timeout))?;
    if interactive {
        sandbox.set_input_callback(Box::new(repl::prompt_for_input));
    }

    let config = AgentConfig {
        retry_budget: cli.max_fix,
        stream: !cli.quiet,
        model: None,
    };

    Ok(Agent::new(provider, sandbox, config)
        .with_event_callback(repl::render_event(last_code, cli.quiet)))
}

async fn run_one_shot(cli: &Cli, task: String) -> i32 {
    let last_code = repl::LastCode::default();
    let mut agent = match build_agent(cli, last_code.clone(), false) {
        Ok(agent) => agent,
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            return 1;
        }
    };

    match agent.run_task(&task).await {
        Ok(TaskOutcome::Succeeded { stdout, .. }) => {
            if cli.quiet {
                print!("{}", stdout);
            }
            0
        }
        Ok(TaskOutcome::ExhaustedRetries {
            attempts,
            last_source,
            last_diagnostic,
        }) => {
            eprintln!();
            eprintln!(
                "{}",
                format!("Gave up after {} attempts.", attempts).red().bold()
            );
            eprintln!("{}", "Last error:".red());
            for line in last_diagnostic.trim_end().lines() {
                eprintln!("  {}", line);
            }
            eprintln!("{}", "Last code:".dimmed());
            for line in last_source.lines() {
                eprintln!("  {}", line);
            }
            1
        }
        Ok(TaskOutcome::GenerationFailed { error }) => {
            eprintln!("{} {}", "Error:".red(), error);
            1
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            1
        }
    }
}

async fn list_models() -> i32 {
    let provider = OllamaProvider::new(
        ProviderConfig::ollama().with_base_url(model_config::base_url()),
    );
    match provider.list_models().await {
        Ok(models) if models.is_empty() => {
            println!("No models installed. Run 'pyforge setup' first.");
            0
        }
        Ok(models) => {
            for model in models {
                println!("{}", model);
            }
            0
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            1
        }
    }
}

async fn run_repl(cli: &Cli) -> i32 {
    let last_code = repl::LastCode::default();
    match build_agent(cli, last_code.clone(), true) {
        Ok(agent) => {
            repl::run(agent, last_code).await;
            0
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let exit_code = match &cli.command {
        Some(Commands::Setup) => match setup::run_setup().await {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{} {}", "Setup failed:".red().bold(), e);
                1
            }
        },
        Some(Commands::Models) => list_models().await,
        Some(Commands::Run { task }) => {
            let task = task.join(" ");
            run_one_shot(&cli, task).await
        }
        Some(Commands::Chat) => run_repl(&cli).await,
        None => {
            if cli.task.is_empty() {
                run_repl(&cli).await
            } else {
                let task = cli.task.join(" ");
                run_one_shot(&cli, task).await
            }
        }
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}
