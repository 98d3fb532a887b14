//! Error handling for the element index.
//!
//! This module provides:
//! - [`IndexError`]: The main error enum for all index operations
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Serializable error with code and suggestion
//!
//! Source failures (`SourceUnavailable`, `RateLimited`, `Timeout`) and
//! per-entry `ParseFailure`s are absorbed inside the indexers and only
//! surface in logs and stats. `Configuration` is the one hard failure.

mod codes;

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::SourceKind;

pub use codes::ErrorCode;

/// Main error type for index operations.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Source {source_kind} unavailable: {reason}")]
    SourceUnavailable { source_kind: SourceKind, reason: String },

    #[error("Source {source_kind} rate limited (resets at {reset_at:?})")]
    RateLimited {
        source_kind: SourceKind,
        reset_at: Option<chrono::DateTime<chrono::Utc>>,
    },

    #[error("Failed to parse {path}: {reason}")]
    ParseFailure { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Source {source_kind} failed: {reason}")]
    SourceFailed { source_kind: SourceKind, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl IndexError {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::SourceUnavailable { .. } | Self::Http(_) => ErrorCode::SourceUnavailable,
            Self::RateLimited { .. } => ErrorCode::SourceRateLimited,
            Self::ParseFailure { .. } | Self::Yaml(_) => ErrorCode::ElementParseError,
            Self::Configuration(_) => ErrorCode::ConfigInvalid,
            Self::NotFound(_) => ErrorCode::ElementNotFound,
            Self::Timeout(_) => ErrorCode::SourceTimeout,
            Self::SourceFailed { .. } => ErrorCode::SourceFailed,
            Self::Io(_) => ErrorCode::StorageError,
            Self::Json(_) => ErrorCode::SerializationError,
        }
    }

    /// Whether a single retry after a backoff may succeed.
    ///
    /// Rate limits, timeouts, transport errors and 5xx responses qualify.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout(_) => true,
            Self::SourceUnavailable { reason, .. } => reason.starts_with("HTTP 5"),
            Self::Http(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.status().is_some_and(|s| s.is_server_error())
            }
            _ => false,
        }
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::SourceUnavailable { source_kind, reason }
            | Self::SourceFailed { source_kind, reason } => {
                Some(serde_json::json!({ "source": source_kind, "reason": reason }))
            }
            Self::RateLimited {
                source_kind,
                reset_at,
            } => Some(serde_json::json!({ "source": source_kind, "reset_at": reset_at })),
            Self::ParseFailure { path, .. } => Some(serde_json::json!({ "path": path })),
            Self::NotFound(name) => Some(serde_json::json!({ "element": name })),
            _ => None,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_index_error(self)
    }
}

/// A structured error with machine-readable code, suggestion, and context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "SOURCE_RATE_LIMITED")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 202)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether this error is potentially recoverable by the user
    pub recoverable: bool,

    /// Error category (e.g., "source", "config")
    pub category: String,
}

impl StructuredError {
    /// Create a structured error from an [`IndexError`].
    #[must_use]
    pub fn from_index_error(err: &IndexError) -> Self {
        let code = err.code();
        Self {
            code,
            numeric_code: code.numeric(),
            message: err.to_string(),
            suggestion: code.suggestion().to_string(),
            context: err.context(),
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
        }
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&IndexError> for StructuredError {
    fn from(err: &IndexError) -> Self {
        Self::from_index_error(err)
    }
}

/// Result type alias using IndexError.
pub type Result<T> = std::result::Result<T, IndexError>;
