//! Error types for the triage crates.

use alloc::string::String;
use core::fmt;

/// Result type alias for triage operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for ingestion and query management.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A query failed to apply a record to its internal state.
    IngestFailed {
        message: String,
    },
    /// A record was rejected before being applied (missing or mistyped field).
    InvalidRecord {
        message: String,
    },
    /// A query with the same key is already registered.
    DuplicateQuery {
        key: String,
    },
    /// No query is registered under the key.
    QueryNotFound {
        key: String,
    },
    /// Rejected configuration value.
    InvalidConfig {
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IngestFailed { message } => {
                write!(f, "Ingest failed: {}", message)
            }
            Error::InvalidRecord { message } => {
                write!(f, "Invalid record: {}", message)
            }
            Error::DuplicateQuery { key } => {
                write!(f, "Query already registered: {}", key)
            }
            Error::QueryNotFound { key } => {
                write!(f, "Query not found: {}", key)
            }
            Error::InvalidConfig { message } => {
                write!(f, "Invalid configuration: {}", message)
            }
        }
    }
}

impl Error {
    /// Creates an ingest failure error.
    pub fn ingest_failed(message: impl Into<String>) -> Self {
        Error::IngestFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Error::InvalidRecord {
            message: message.into(),
        }
    }

    /// Creates a duplicate query error.
    pub fn duplicate_query(key: impl Into<String>) -> Self {
        Error::DuplicateQuery { key: key.into() }
    }

    /// Creates a query not found error.
    pub fn query_not_found(key: impl Into<String>) -> Self {
        Error::QueryNotFound { key: key.into() }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns true if this error was raised while applying a record.
    pub fn is_ingest_error(&self) -> bool {
        matches!(self, Error::IngestFailed { .. } | Error::InvalidRecord { .. })
    }
}
