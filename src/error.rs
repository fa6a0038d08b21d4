//! Error types for VisaFlow.

use uuid::Uuid;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Errors loading or resolving catalog data (flow packs, check bank, corpus).
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog is empty: no flow packs found under {dir}")]
    Empty { dir: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Session store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),
}

/// Input validation errors, rejected before the pipeline runs.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Intent must be between {min} and {max} characters (got {got})")]
    IntentLength { min: usize, max: usize, got: usize },

    #[error("Invalid value for {field}: {message}")]
    InvalidField { field: String, message: String },
}

/// Errors from the refresh pipeline itself.
///
/// Scoring and adaptation are total and never produce these; the only
/// pipeline failure is a lookup that surfaces as not-found.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Micro-check not found: {0}")]
    CheckNotFound(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
