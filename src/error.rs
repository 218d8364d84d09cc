//! Error types for MarketLog
//!
//! Provides a unified error type for all operations.
//!
//! Read paths never surface a missing file or stream as an error: they
//! return `None` or an empty `Vec` instead. Everything below is a hard
//! failure the caller has to decide about.

use std::io;

use thiserror::Error;

/// Result type alias using LogError
pub type Result<T> = std::result::Result<T, LogError>;

/// Unified error type for MarketLog operations
#[derive(Debug, Error)]
pub enum LogError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cannot replace last record in empty file: {0}")]
    EmptyFile(String),

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Index file missing for non-empty data file: {0} (run reindex)")]
    MissingIndex(String),

    #[error("Cannot rotate before the current file is indexed: {0}")]
    RotationWithoutIndex(String),

    // -------------------------------------------------------------------------
    // Stream Errors
    // -------------------------------------------------------------------------
    #[error("Invalid stream id: {0:?}")]
    InvalidStreamId(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Map `NotFound` to `Ok(None)`, keep every other I/O failure.
pub(crate) fn not_found_as_none<T>(result: io::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LogError::Io(e)),
    }
}
