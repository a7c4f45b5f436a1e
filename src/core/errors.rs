// src/core/errors.rs
use thiserror::Error;

/// Errors raised while reshaping explanation artifacts.
///
/// Every variant describes a caller-input defect; nothing here is transient,
/// so there is no retry path.
#[derive(Debug, Error)]
pub enum ExplainError {
    /// Mutually exclusive or missing options.
    #[error("Configuration Error: {0}")]
    Configuration(String),
    /// Data of the wrong rank or length.
    #[error("Shape Error: {0}")]
    Shape(String),
    /// A prefix or column name that cannot be resolved against the schema.
    #[error("Schema Error: {0}")]
    Schema(String),
    /// A model or tree lacking the introspection the caller asked for.
    #[error("Model Capability Error: {0}")]
    ModelCapability(String),
    /// An error reported by a collaborating model or attribution engine.
    #[error("Model Error: {0}")]
    Model(String),
    #[error("Ndarray Error: {0}")]
    Ndarray(#[from] ndarray::ShapeError),
}

// Convenience type alias for Result
pub type Result<T> = std::result::Result<T, ExplainError>;
