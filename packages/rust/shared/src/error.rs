//! Error types for stixgraph.
//!
//! Library crates use [`StixGraphError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all stixgraph operations.
#[derive(Debug, thiserror::Error)]
pub enum StixGraphError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON/TOML parsing error on an input document.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (bad record shape, missing required object, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A STIX identifier or type token that does not follow `<type>--<uuid>`.
    #[error("invalid STIX id: {0}")]
    InvalidId(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StixGraphError>;

impl StixGraphError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
