//! Error types for hbd-analyzer
//!
//! Unresolved targets and conflicting birthday dates are normal outcomes,
//! not errors; they never surface here.

use thiserror::Error;

/// Analyzer error type
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// hbd-common error (I/O, encoding, config, storage)
    #[error(transparent)]
    Common(#[from] hbd_common::Error),

    /// Per-file task panicked or was cancelled
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Enrichment collaborator failed or timed out
    #[error("Enrichment failed: {0}")]
    Enrichment(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for analyzer operations
pub type AnalyzerResult<T> = Result<T, AnalyzerError>;
