//! Error types for Sonara operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all Sonara crates. Uses `thiserror` for derive macros.
//!
//! The variants follow the pipeline's failure taxonomy:
//!
//! - **Fatal configuration errors** ([`Error::Config`],
//!   [`Error::ResumeInconsistency`]) are raised immediately and never retried.
//! - **Per-item failures** ([`Error::Extraction`]) are recovered locally by
//!   the extraction pipeline as Absent feature vectors.
//! - **Query-time misses** ([`Error::NotFound`]) are surfaced to callers as a
//!   typed result.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur in Sonara operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error without path context.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error on a specific file.
    #[error("I/O error on {path}: {source}")]
    IoWithPath {
        /// The underlying I/O error.
        source: std::io::Error,
        /// The path being accessed.
        path: PathBuf,
    },

    /// Configuration error (missing column, unknown model, metric mismatch).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Checkpoint does not match the current source collection.
    #[error("Resume inconsistency: {0}")]
    ResumeInconsistency(String),

    /// A single item could not be extracted.
    #[error("Extraction failed for row {row}: {message}")]
    Extraction {
        /// Row position of the failed item.
        row: usize,
        /// Underlying failure message.
        message: String,
    },

    /// Item, space, or file not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic operation failure.
    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Create an I/O error.
    pub fn io(err: std::io::Error) -> Self {
        Self::Io(err)
    }

    /// Create an I/O error carrying the offending path.
    pub fn io_with_path(err: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::IoWithPath {
            source: err,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a resume inconsistency error.
    pub fn resume_inconsistency(msg: impl Into<String>) -> Self {
        Self::ResumeInconsistency(msg.into())
    }

    /// Create a per-item extraction error.
    pub fn extraction(row: usize, msg: impl Into<String>) -> Self {
        Self::Extraction {
            row,
            message: msg.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create a parse error (reported as invalid data).
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create an operation error.
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Returns `true` for not-found errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` for configuration errors.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns `true` if the error must abort the current run.
    ///
    /// Per-item extraction failures and not-found results are recoverable;
    /// everything else stops the pipeline.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Extraction { .. } | Self::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Self::InvalidData(format!("CSV: {err}"))
    }
}

/// Result type alias using Sonara's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_and_inspectors() {
        assert!(Error::config("bad").is_config());
        assert!(Error::not_found("x").is_not_found());
        assert!(!Error::not_found("x").is_fatal());
        assert!(!Error::extraction(3, "decode").is_fatal());
        assert!(Error::resume_inconsistency("shrunk").is_fatal());
        assert!(Error::config("bad").is_fatal());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::extraction(7, "unreadable image");
        assert_eq!(
            err.to_string(),
            "Extraction failed for row 7: unreadable image"
        );

        let err = Error::io_with_path(
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            "/tmp/x.json",
        );
        assert!(err.to_string().contains("/tmp/x.json"));
    }

    #[test]
    fn test_from_serde_json() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
