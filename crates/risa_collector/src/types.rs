//! Records written by the collector.

use chrono::{DateTime, Utc};
use std::fmt;

/// Identifier of an anonymous session.
///
/// Issued by the store as a numeric key and carried as a string in the
/// session cookie. Once issued it never changes for the cookie's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for SessionId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// A session row about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    /// `User-Agent` of the request that opened the session.
    pub user_agent: String,
    /// When the session was opened.
    pub start_time: DateTime<Utc>,
}

impl NewSession {
    /// Creates a session record starting now.
    pub fn now(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            start_time: Utc::now(),
        }
    }
}

/// One tracked `(category, action)` pair.
///
/// Events are immutable once built and are never read back by the
/// collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Session the event is attributed to.
    pub session_id: SessionId,
    /// Event category (`c` parameter).
    pub category: String,
    /// Event action (`a` parameter).
    pub action: String,
    /// When the request was handled.
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    /// Creates an event occurring now.
    pub fn now(
        session_id: SessionId,
        category: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            category: category.into(),
            action: action.into(),
            occurred_at: Utc::now(),
        }
    }
}
