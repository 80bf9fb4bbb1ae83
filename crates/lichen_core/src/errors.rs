//! Error types for the lichen core crate

use thiserror::Error;

/// Errors that can occur while loading, encoding, aligning or persisting
#[derive(Error, Debug)]
pub enum CoreError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited file could not be parsed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Dataset content is unusable
    #[error("Data error: {0}")]
    Data(String),

    /// A required column is absent
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// The label vector lacks a class the computation needs
    #[error("Degenerate class distribution: {0}")]
    DegenerateClass(String),

    /// Strict alignment found columns outside the canonical schema
    #[error("Schema mismatch: missing {missing:?}, unexpected {unexpected:?}")]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// Model blob could not be written or read
    #[error("Model encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model structure failed validation
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Stored digest does not match the model blob
    #[error("Model digest mismatch: expected {expected}, computed {computed}")]
    DigestMismatch { expected: String, computed: String },
}

/// Result type for lichen core operations
pub type Result<T> = std::result::Result<T, CoreError>;
