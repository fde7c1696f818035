//! Persisted model selection.
//!
//! Setup writes the chosen model name to `.pyforge/model`; the REPL and
//! one-shot mode read it back. The Ollama endpoint itself is injected
//! explicitly (flag or `OLLAMA_BASE_URL`), never discovered ambiently.

use pyforge_error::{Error, ErrorKind, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "qwen3-coder-v4";
pub const FALLBACK_MODEL: &str = "qwen3:4b";

const CONFIG_DIR: &str = ".pyforge";
const MODEL_FILE: &str = "model";

fn model_path(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR).join(MODEL_FILE)
}

/// Read the configured model from a config root, if any
pub fn load_model_from(root: &Path) -> Option<String> {
    let content = std::fs::read_to_string(model_path(root)).ok()?;
    let name = content.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// The model to use: configured name, or the default
pub fn load_model() -> String {
    load_model_from(Path::new(".")).unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

/// Persist the selected model under a config root
pub fn store_model_in(root: &Path, model: &str) -> Result<()> {
    let path = model_path(root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::new(ErrorKind::IoFailed, "could not create config directory")
                .with_operation("model_config::store")
                .with_context("path", parent.display().to_string())
                .set_source(e)
        })?;
    }
    std::fs::write(&path, format!("{}\n", model)).map_err(|e| {
        Error::new(ErrorKind::IoFailed, "could not write model config")
            .with_operation("model_config::store")
            .with_context("path", path.display().to_string())
            .set_source(e)
    })
}

/// Persist the selected model in the current directory's config root
pub fn store_model(model: &str) -> Result<()> {
    store_model_in(Path::new("."), model)
}

/// The Ollama endpoint: `OLLAMA_BASE_URL` env var or the local default
pub fn base_url() -> String {
    std::env::var("OLLAMA_BASE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| "http://localhost:11434".to_string())
}
