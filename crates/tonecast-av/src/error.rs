//! Error types for tonecast-av.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building and driving an encoder process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested output encoding has no catalog entry.
    #[error("unsupported output format: {encoding}")]
    UnsupportedFormat { encoding: String },

    /// The input file is missing or not a regular file.
    #[error("invalid input file {}: {reason}", path.display())]
    InvalidInput { path: PathBuf, reason: String },

    /// The encoder process could not be created.
    #[error("failed to spawn {tool}: {message}")]
    SpawnFailed { tool: String, message: String },

    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// An external tool failed to execute.
    #[error("tool execution failed: {tool}: {message}")]
    ToolFailed { tool: String, message: String },

    /// Failed to parse tool output.
    #[error("failed to parse {tool} output: {message}")]
    Parse { tool: String, message: String },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an unsupported format error.
    pub fn unsupported_format(encoding: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            encoding: encoding.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a spawn failed error.
    pub fn spawn_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a tool execution failed error.
    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse_error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            tool: tool.into(),
            message: message.into(),
        }
    }
}
