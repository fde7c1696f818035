//! Error kinds for pyforge operations

use std::fmt;

/// The kind of error that occurred.
///
/// This enum categorizes errors to help users write clear error handling logic.
/// Users can match on ErrorKind to decide how to handle specific error cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    // =========================================================================
    // Generation errors (model collaborator)
    // =========================================================================
    /// The model runtime could not be reached
    ModelUnavailable,

    /// The model runtime answered with an API-level error
    ApiFailed,

    /// The requested model is not installed in the runtime
    ModelNotFound,

    /// The model returned an empty response
    EmptyResponse,

    /// No runnable code could be extracted from the model response
    CodeNotFound,

    /// Rate limit exceeded
    RateLimited,

    // =========================================================================
    // Sandbox errors
    // =========================================================================
    /// The Python interpreter binary was not found
    InterpreterNotFound,

    /// The sandbox scratch directory could not be prepared
    SandboxFailed,

    /// The user cancelled an interactive prompt
    Cancelled,

    // =========================================================================
    // Setup errors
    // =========================================================================
    /// The ollama binary is not installed
    OllamaMissing,

    /// Model weights download failed
    DownloadFailed,

    /// Registering the model with Ollama failed
    RegistrationFailed,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    /// Network error
    NetworkFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,

    /// Serialization/deserialization failed
    SerializationFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Generation
            ErrorKind::ModelUnavailable => "ModelUnavailable",
            ErrorKind::ApiFailed => "ApiFailed",
            ErrorKind::ModelNotFound => "ModelNotFound",
            ErrorKind::EmptyResponse => "EmptyResponse",
            ErrorKind::CodeNotFound => "CodeNotFound",
            ErrorKind::RateLimited => "RateLimited",

            // Sandbox
            ErrorKind::InterpreterNotFound => "InterpreterNotFound",
            ErrorKind::SandboxFailed => "SandboxFailed",
            ErrorKind::Cancelled => "Cancelled",

            // Setup
            ErrorKind::OllamaMissing => "OllamaMissing",
            ErrorKind::DownloadFailed => "DownloadFailed",
            ErrorKind::RegistrationFailed => "RegistrationFailed",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::ModelUnavailable
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::DownloadFailed
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
