//! Error types for cstack.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cstack operations.
pub type Result<T> = std::result::Result<T, CstackError>;

/// Main error type for cstack.
///
/// Only configuration and selection errors abort a run outright. Every
/// per-stack condition (missing compose file, spawn failure, non-zero exit,
/// timeout, cancellation) is captured as data in an [`ExecutionOutcome`]
/// instead and surfaces through the aggregate report.
///
/// [`ExecutionOutcome`]: crate::report::ExecutionOutcome
#[derive(Error, Debug)]
pub enum CstackError {
    // Configuration errors
    #[error("Cannot find configuration file {path:?}. {hint}")]
    ConfigNotFound { path: PathBuf, hint: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Duplicate stack name in configuration: {name}")]
    DuplicateStack { name: String },

    // Selection errors
    #[error("Unknown stack: {name}")]
    UnknownStack { name: String },

    // File system errors
    #[error("I/O error at {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
