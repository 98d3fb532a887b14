//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Element errors
//! - 2xx: Source errors
//! - 3xx: Config errors
//! - 6xx: Storage errors
//! - 9xx: Internal errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for machine output.
///
/// Each variant maps to a numeric code (e.g., `ElementNotFound` -> E101).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Element errors (1xx)
    // ========================================
    /// E101: No source holds the requested element
    ElementNotFound,
    /// E102: An element header could not be parsed
    ElementParseError,

    // ========================================
    // Source errors (2xx)
    // ========================================
    /// E201: A source could not be reached or refused the request
    SourceUnavailable,
    /// E202: A remote source is rate limiting this client
    SourceRateLimited,
    /// E203: A source failed and fallback was disabled
    SourceFailed,
    /// E204: A source fetch or rebuild exceeded its deadline
    SourceTimeout,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E302: Config file or priority policy is invalid
    ConfigInvalid,

    // ========================================
    // Storage errors (6xx)
    // ========================================
    /// E601: Filesystem operation failed
    StorageError,
    /// E605: Serialization/deserialization failed
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric error code (e.g., `ElementNotFound` -> 101).
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            Self::ElementNotFound => 101,
            Self::ElementParseError => 102,

            Self::SourceUnavailable => 201,
            Self::SourceRateLimited => 202,
            Self::SourceFailed => 203,
            Self::SourceTimeout => 204,

            Self::ConfigInvalid => 302,

            Self::StorageError => 601,
            Self::SerializationError => 605,
        }
    }

    /// Get the error code as a formatted string (e.g., "E101").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    /// Get the default suggestion for this error code.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::ElementNotFound => "Run `eix search <query>` to find similarly named elements",
            Self::ElementParseError => "Check the element's front matter block for YAML syntax errors",
            Self::SourceUnavailable => "Check network connectivity and credentials. Cached results are still served",
            Self::SourceRateLimited => "Wait for the rate-limit window to reset, or set EIX_GITHUB_TOKEN for a higher limit",
            Self::SourceFailed => "Enable priority.fallback_on_error to continue past failing sources",
            Self::SourceTimeout => "The remote source is slow. Increase the timeout or retry later",
            Self::ConfigInvalid => "Check TOML syntax and the [priority] order: each source at most once, at least one",
            Self::StorageError => "Check that the path exists and permissions are correct",
            Self::SerializationError => "The snapshot data may be corrupted. Delete the snapshot directory to rebuild",
        }
    }

    /// Check if this error is potentially recoverable by the user.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::SerializationError)
    }

    /// Get the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() / 100 {
            1 => "element",
            2 => "source",
            3 => "config",
            6 => "storage",
            _ => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code_string())
    }
}
