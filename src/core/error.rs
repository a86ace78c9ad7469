//! Error handling - Zero-cost, hierarchical errors

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Fillscan error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input file missing before any processing started
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tabular read/write errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Model store errors (missing or unreadable model set)
    #[error("Model store error: {0}")]
    ModelStore(String),

    /// Training errors (degenerate data, unsolvable system)
    #[error("Training error: {0}")]
    Training(String),
}
