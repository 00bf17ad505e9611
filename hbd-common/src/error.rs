//! Common error types for HBD

use thiserror::Error;

/// Common result type for HBD operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the analysis workspace
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    ///
    /// Never fatal: callers log it and fall back to built-in defaults.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No supported encoding decodes the transcript
    #[error("Could not decode {path} with any supported encoding (tried: {tried})")]
    Encoding { path: String, tried: String },

    /// Line matched no header dialect and there was no open message to continue
    #[error("Malformed line {line_number}: {content}")]
    MalformedLine { line_number: usize, content: String },

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Record store rejected a write
    #[error("Storage error: {0}")]
    Storage(String),
}
