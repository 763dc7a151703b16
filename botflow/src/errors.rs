//! Error types for the botflow turn-processing core.
//!
//! Every failure the core can surface maps onto one [`ErrorKind`]. Programmer
//! errors (`InvalidState`, `KeyAlreadyRegistered`) are reported immediately;
//! storage failures are handed to the caller untouched. The core never retries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = BotflowError> = std::result::Result<T, E>;

/// The main error type for botflow operations.
#[derive(Debug, Error)]
pub enum BotflowError {
    /// A storage key could not be derived, or state was used before it existed.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A turn service was registered twice under the same key.
    #[error("{0}")]
    KeyAlreadyRegistered(#[from] KeyAlreadyRegisteredError),

    /// An optimistic-concurrency token no longer matched the stored item.
    #[error("{0}")]
    ConcurrencyConflict(#[from] ConcurrencyConflictError),

    /// The turn was cancelled while an operation was in flight.
    #[error("Turn cancelled: {0}")]
    Cancelled(String),

    /// The storage backend failed.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A property value could not be converted to or from JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Application logic or a third-party handler failed.
    #[error("Turn handler failed: {0}")]
    Handler(#[from] anyhow::Error),
}

/// The kind of a [`BotflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`BotflowError::InvalidState`].
    InvalidState,
    /// See [`BotflowError::KeyAlreadyRegistered`].
    KeyAlreadyRegistered,
    /// See [`BotflowError::ConcurrencyConflict`].
    ConcurrencyConflict,
    /// See [`BotflowError::Cancelled`].
    Cancelled,
    /// See [`BotflowError::StorageUnavailable`].
    StorageUnavailable,
    /// See [`BotflowError::Serialization`].
    Serialization,
    /// See [`BotflowError::Handler`].
    Handler,
}

impl BotflowError {
    /// Creates an invalid state error.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Creates a cancellation error.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    /// Creates a storage unavailable error.
    #[must_use]
    pub fn storage_unavailable(message: impl Into<String>) -> Self {
        Self::StorageUnavailable(message.into())
    }

    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::KeyAlreadyRegistered(_) => ErrorKind::KeyAlreadyRegistered,
            Self::ConcurrencyConflict(_) => ErrorKind::ConcurrencyConflict,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Handler(_) => ErrorKind::Handler,
        }
    }

    /// Returns true for errors caused by misuse of the API rather than by the environment.
    #[must_use]
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidState | ErrorKind::KeyAlreadyRegistered
        )
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        match self {
            Self::KeyAlreadyRegistered(err) => {
                map.insert("key".to_string(), serde_json::json!(err.key));
            }
            Self::ConcurrencyConflict(err) => {
                map.insert("key".to_string(), serde_json::json!(err.key));
                map.insert("expected".to_string(), serde_json::json!(err.expected));
                map.insert("actual".to_string(), serde_json::json!(err.actual));
            }
            _ => {}
        }

        map
    }
}

impl From<serde_json::Error> for BotflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error raised when registering a turn service under a key that is already taken.
#[derive(Debug, Clone, Error)]
#[error("Key already registered: '{key}'")]
pub struct KeyAlreadyRegisteredError {
    /// The conflicting key.
    pub key: String,
}

impl KeyAlreadyRegisteredError {
    /// Creates a new key conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Error raised when a write carries a stale ETag.
#[derive(Debug, Clone, Error)]
#[error("Concurrency conflict on '{key}': expected etag {expected:?}, found {actual:?}")]
pub struct ConcurrencyConflictError {
    /// The storage key being written.
    pub key: String,
    /// The token supplied by the writer.
    pub expected: Option<String>,
    /// The token currently stored.
    pub actual: Option<String>,
}

impl ConcurrencyConflictError {
    /// Creates a new concurrency conflict error.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        expected: Option<String>,
        actual: Option<String>,
    ) -> Self {
        Self {
            key: key.into(),
            expected,
            actual,
        }
    }
}
