//! Error types for the memoization cache
//!
//! Provides unified error handling using thiserror.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache-internal failures.
///
/// None of these ever reach the caller of a memoized operation; the wrapper
/// logs them and behaves as if there were no cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Arguments or result cannot be canonically encoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// I/O failure while touching the storage root
    #[error("Store error at {}: {source}", .path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Stored bytes are unreadable or fail validation
    #[error("Corrupt entry {key}: {reason}")]
    Corruption { key: String, reason: String },

    /// Configuration rejected at open time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn store(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CacheError::Store {
            path: path.into(),
            source,
        }
    }

    /// Builds a corruption error for the given key.
    pub fn corruption(key: impl Into<String>, reason: impl Into<String>) -> Self {
        CacheError::Corruption {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Encoding(err.to_string())
    }
}

impl serde::ser::Error for CacheError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CacheError::Encoding(msg.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
