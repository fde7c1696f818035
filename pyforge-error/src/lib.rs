//! # pyforge-error
//!
//! Unified error handling for pyforge - following OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., ModelUnavailable, InterpreterNotFound)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use pyforge_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::ModelUnavailable, "cannot connect to Ollama")
//!         .with_operation("provider::complete")
//!         .with_context("base_url", "http://localhost:11434")
//!         .with_context("model", "qwen3-coder-v4"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, pyforge_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using pyforge Error
pub type Result<T> = std::result::Result<T, Error>;
