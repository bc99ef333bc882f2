//! Error types for ScholarGraph
//!
//! Provides:
//! - Distinct error types for the collaborator boundaries (embedding
//!   provider, graph store, external works API)
//! - Machine-readable error codes for degraded-result reporting
//!
//! Collaborator failures are caught at the boundary of the component that
//! calls them and converted to degraded-but-valid partial results. The only
//! error that aborts a retrieval request is `InvalidQuery`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation (1xxx)
    InvalidQuery,
    InvalidClearance,
    InvalidPage,

    // Collaborator degradation (2xxx)
    EmbeddingUnavailable,
    GraphStoreUnavailable,
    ExternalFetchFailed,
    ExternalFetchTimeout,

    // Ingestion (3xxx)
    UpsertConflict,
    WorkRejected,

    // Explanation (4xxx)
    NoPathFound,

    // Internal (9xxx)
    ConfigurationError,
    SerializationError,
    InternalError,
}

impl ErrorCode {
    /// Numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::InvalidQuery => 1001,
            ErrorCode::InvalidClearance => 1002,
            ErrorCode::InvalidPage => 1003,

            ErrorCode::EmbeddingUnavailable => 2001,
            ErrorCode::GraphStoreUnavailable => 2002,
            ErrorCode::ExternalFetchFailed => 2003,
            ErrorCode::ExternalFetchTimeout => 2004,

            ErrorCode::UpsertConflict => 3001,
            ErrorCode::WorkRejected => 3002,

            ErrorCode::NoPathFound => 4001,

            ErrorCode::ConfigurationError => 9001,
            ErrorCode::SerializationError => 9002,
            ErrorCode::InternalError => 9003,
        }
    }
}

/// Engine error types
#[derive(Error, Debug)]
pub enum EngineError {
    // Validation errors - the only fatal class for a retrieval request
    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    #[error("Invalid clearance: {value}")]
    InvalidClearance { value: String },

    #[error("Invalid page: {page}")]
    InvalidPage { page: u32 },

    // Collaborator failures - degraded, never fatal to a request
    #[error("Embedding provider unavailable: {message}")]
    EmbeddingUnavailable { message: String },

    #[error("Graph store unavailable: {message}")]
    GraphStoreUnavailable { message: String },

    #[error("External works fetch failed: {message}")]
    ExternalFetchFailed { message: String },

    #[error("External works fetch timed out after {timeout_ms}ms")]
    ExternalFetchTimeout { timeout_ms: u64 },

    // Ingestion errors
    #[error("Upsert conflict on key '{key}': {message}")]
    UpsertConflict { key: String, message: String },

    #[error("Work rejected: {reason}")]
    WorkRejected { reason: String },

    // Path explanation
    #[error("No path found from query node to {target}")]
    NoPathFound { target: String },

    // Internal errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::InvalidQuery { .. } => ErrorCode::InvalidQuery,
            EngineError::InvalidClearance { .. } => ErrorCode::InvalidClearance,
            EngineError::InvalidPage { .. } => ErrorCode::InvalidPage,
            EngineError::EmbeddingUnavailable { .. } => ErrorCode::EmbeddingUnavailable,
            EngineError::GraphStoreUnavailable { .. } => ErrorCode::GraphStoreUnavailable,
            EngineError::ExternalFetchFailed { .. } => ErrorCode::ExternalFetchFailed,
            EngineError::ExternalFetchTimeout { .. } => ErrorCode::ExternalFetchTimeout,
            EngineError::UpsertConflict { .. } => ErrorCode::UpsertConflict,
            EngineError::WorkRejected { .. } => ErrorCode::WorkRejected,
            EngineError::NoPathFound { .. } => ErrorCode::NoPathFound,
            EngineError::Configuration { .. } => ErrorCode::ConfigurationError,
            EngineError::Serialization(_) => ErrorCode::SerializationError,
            EngineError::HttpClient(_) => ErrorCode::ExternalFetchFailed,
            EngineError::Internal { .. } => ErrorCode::InternalError,
            EngineError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether the engine should absorb this error into a degraded partial
    /// result rather than propagate it to the caller.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            EngineError::EmbeddingUnavailable { .. }
                | EngineError::GraphStoreUnavailable { .. }
                | EngineError::ExternalFetchFailed { .. }
                | EngineError::ExternalFetchTimeout { .. }
                | EngineError::NoPathFound { .. }
        )
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Internal {
            message: err.to_string(),
        }
    }
}
