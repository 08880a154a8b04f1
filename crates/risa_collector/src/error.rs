//! Error types for the collector.
//!
//! Only startup and serving surface [`ServerError`]. Failures inside the
//! request path are absorbed by the handler and never reach the client.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for cookie encoding and decoding.
pub type CookieResult<T> = Result<T, CookieError>;

/// Errors that can occur while starting or running the collector.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid or missing configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The durable store could not be reached.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error (bind, accept).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        ServerError::Config(msg.into())
    }
}

/// Errors reported by a [`crate::TrackStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database rejected or failed the statement.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A session identifier that the store cannot represent.
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// The event references a session the store does not know about.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// The store is not accepting writes.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors decoding or encoding the session cookie.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CookieError {
    /// The value is not in `payload.timestamp.mac` form.
    #[error("malformed cookie: {0}")]
    Malformed(&'static str),

    /// The MAC does not match the payload.
    #[error("cookie signature mismatch")]
    BadSignature,

    /// The signed timestamp is older than the configured max age.
    #[error("cookie expired (issued at {issued_at}, max age {max_age}s)")]
    Expired {
        /// Unix seconds embedded in the cookie.
        issued_at: i64,
        /// Max age in seconds.
        max_age: i64,
    },

    /// No signing key is configured.
    #[error("cookie signing key is not set")]
    MissingKey,

    /// The payload could not be serialized.
    #[error("cookie encode failed: {0}")]
    Encode(String),
}

impl StoreError {
    /// Returns true if the failure concerns the row rather than the store.
    ///
    /// Row-level failures (a forged session id, a dangling foreign key) are
    /// expected under normal traffic and logged at a lower level.
    pub fn is_row_error(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidSessionId(_) | StoreError::UnknownSession(_)
        )
    }
}
