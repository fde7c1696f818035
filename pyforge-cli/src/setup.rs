//! Setup workflow: fetch the fine-tuned model weights and register them
//! with the local Ollama daemon.
//!
//! Steps mirror what a user would do by hand:
//! 1. Verify the ollama binary is installed
//! 2. Download the GGUF weights from HuggingFace (skipped when present)
//! 3. Register a Modelfile with `ollama create` (skipped when registered)
//! Any failure falls back to pulling the official base model.

use crate::model_config::{self, DEFAULT_MODEL, FALLBACK_MODEL};
use colored::Colorize;
use futures_util::StreamExt;
use pyforge_error::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::process::Command;

const HF_REPO: &str = "08210821iy/Qwen3-4B-Coder";
const GGUF_FILE: &str = "model-q4_k_m.gguf";
const MODEL_DIR: &str = "models";

fn gguf_url() -> String {
    format!("https://huggingface.co/{}/resolve/main/{}", HF_REPO, GGUF_FILE)
}

fn gguf_path() -> PathBuf {
    Path::new(MODEL_DIR).join(GGUF_FILE)
}

fn modelfile_content(gguf: &Path) -> String {
    format!(
        "FROM {}\n\n\
         PARAMETER temperature 0.7\n\
         PARAMETER top_p 0.9\n\
         PARAMETER stop <|im_end|>\n\
         PARAMETER num_ctx 2048\n\n\
         TEMPLATE \"\"\"<|im_start|>system\n\
         {{{{ .System }}}}<|im_end|>\n\
         <|im_start|>user\n\
         {{{{ .Prompt }}}}<|im_end|>\n\
         <|im_start|>assistant\n\
         \"\"\"\n",
        gguf.display()
    )
}

pub async fn run_setup() -> Result<()> {
    println!();
    println!("{}", "╔══════════════════════════════════════╗".cyan().bold());
    println!("{}", "║          Pyforge - Setup             ║".cyan().bold());
    println!("{}", "╚══════════════════════════════════════╝".cyan().bold());
    println!();

    println!("{}", "[1/3] Checking Ollama...".bold());
    if !ollama_available().await {
        println!("  {}", "Ollama not found!".red());
        println!("  {}", "Install Ollama from: https://ollama.com/download".yellow());
        println!("  {}", "Then run 'ollama serve' and try setup again.".yellow());
        return Err(Error::ollama_missing().with_operation("setup::run"));
    }
    println!("  {}", "Ollama is installed".green());

    println!();
    println!("{}", "[2/3] Downloading model...".bold());
    let mut model = DEFAULT_MODEL.to_string();
    match download_gguf().await {
        Ok(()) => {
            println!();
            println!("{}", "[3/3] Registering model...".bold());
            if let Err(e) = register_model().await {
                println!("  {}", format!("Registration failed: {}", e).yellow());
                model = pull_fallback().await?;
            }
        }
        Err(e) => {
            println!("  {}", format!("Custom model download failed: {}", e).yellow());
            model = pull_fallback().await?;
        }
    }

    model_config::store_model(&model)?;

    println!();
    println!("{}", "Setup complete!".green().bold());
    println!("  Model: {}", model.cyan());
    println!();
    println!("  Run the agent with:");
    println!("  {}", "pyforge".bold());
    println!();
    Ok(())
}

async fn ollama_available() -> bool {
    Command::new("ollama")
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

async fn model_registered(name: &str) -> bool {
    match Command::new("ollama").arg("list").output().await {
        Ok(output) => String::from_utf8_lossy(&output.stdout).contains(name),
        Err(_) => false,
    }
}

async fn download_gguf() -> Result<()> {
    let path = gguf_path();
    if path.exists() {
        let size_gb = std::fs::metadata(&path)
            .map(|m| m.len() as f64 / 1024.0 / 1024.0 / 1024.0)
            .unwrap_or(0.0);
        println!(
            "  {}",
            format!("Model already downloaded ({:.2} GB)", size_gb).green()
        );
        return Ok(());
    }

    std::fs::create_dir_all(MODEL_DIR).map_err(Error::from)?;

    let url = gguf_url();
    println!("  {}", "Downloading model from HuggingFace...".cyan());
    println!("  {}", url.dimmed());
    println!("  {}", "Size: ~2.33 GB (may take 5-10 minutes)".dimmed());

    // No overall client timeout: the transfer legitimately takes minutes
    let client = reqwest::Client::new();
    let response = client.get(&url).send().await.map_err(|e| {
        Error::download_failed(e.to_string()).with_operation("setup::download_gguf")
    })?;
    if !response.status().is_success() {
        return Err(
            Error::download_failed(format!("HTTP {}", response.status()))
                .with_operation("setup::download_gguf")
                .with_context("url", url),
        );
    }

    let total = response.content_length();
    let result = async {
        let mut file = std::fs::File::create(&path).map_err(Error::from)?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| {
                Error::download_failed(e.to_string()).with_operation("setup::download_gguf")
            })?;
            file.write_all(&bytes).map_err(Error::from)?;
            downloaded += bytes.len() as u64;
            print_progress(downloaded, total);
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            println!();
            println!("  {}", "Download complete".green());
            Ok(())
        }
        Err(e) => {
            // Never leave a truncated file behind to be mistaken for weights
            let _ = std::fs::remove_file(&path);
            println!();
            Err(e)
        }
    }
}

fn print_progress(downloaded: u64, total: Option<u64>) {
    let Some(total) = total.filter(|t| *t > 0) else {
        return;
    };
    let pct = (downloaded as f64 / total as f64 * 100.0).min(100.0);
    let filled = ((30.0 * pct / 100.0) as usize).min(30);
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(30 - filled));
    print!(
        "\r  {}",
        format!(
            "[{}] {:.1}% ({}/{} MB)",
            bar,
            pct,
            downloaded / 1024 / 1024,
            total / 1024 / 1024
        )
        .cyan()
    );
    let _ = std::io::stdout().flush();
}

async fn register_model() -> Result<()> {
    if model_registered(DEFAULT_MODEL).await {
        println!(
            "  {}",
            format!("Model '{}' already registered in Ollama", DEFAULT_MODEL).green()
        );
        return Ok(());
    }

    println!("  {}", "Registering model with Ollama...".cyan());
    let modelfile_path = Path::new(MODEL_DIR).join("Modelfile");
    std::fs::write(&modelfile_path, modelfile_content(&gguf_path())).map_err(Error::from)?;

    let output = Command::new("ollama")
        .arg("create")
        .arg(DEFAULT_MODEL)
        .arg("-f")
        .arg(&modelfile_path)
        .output()
        .await
        .map_err(|e| {
            Error::registration_failed("could not run 'ollama create'")
                .with_operation("setup::register_model")
                .set_source(e)
        })?;

    if !output.status.success() {
        return Err(Error::registration_failed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )
        .with_operation("setup::register_model"));
    }

    println!(
        "  {}",
        format!("Model '{}' registered successfully", DEFAULT_MODEL).green()
    );
    Ok(())
}

async fn pull_fallback() -> Result<String> {
    println!(
        "  {}",
        format!("Falling back to official model: {}", FALLBACK_MODEL).yellow()
    );
    println!("  {}", format!("Pulling {}...", FALLBACK_MODEL).cyan());

    let status = Command::new("ollama")
        .arg("pull")
        .arg(FALLBACK_MODEL)
        .status()
        .await
        .map_err(|e| {
            Error::download_failed("could not run 'ollama pull'")
                .with_operation("setup::pull_fallback")
                .set_source(e)
        })?;

    if !status.success() {
        return Err(Error::download_failed(format!(
            "'ollama pull {}' exited with {}",
            FALLBACK_MODEL, status
        ))
        .with_operation("setup::pull_fallback"));
    }

    println!("  {}", "Fallback model ready".green());
    Ok(FALLBACK_MODEL.to_string())
}
