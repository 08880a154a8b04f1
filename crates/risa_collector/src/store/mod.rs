//! Persistence for sessions and events.
//!
//! The collector treats the store as an opaque, insert-only row sink. It
//! never reads rows back apart from the identifier generated for a new
//! session.
//!
//! # Implementors
//!
//! - [`InMemoryStore`] - For testing
//! - [`PgStore`] - PostgreSQL via a shared `sqlx` pool

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use crate::error::StoreResult;
use crate::types::{Event, NewSession, SessionId};
use async_trait::async_trait;

/// A durable sink for session and event rows.
///
/// # Invariants
///
/// - `insert_session` returns a fresh identifier for every call
/// - `insert_event` writes exactly one row or fails
/// - Implementations must be `Send + Sync`; one instance serves every
///   concurrent request
#[async_trait]
pub trait TrackStore: Send + Sync {
    /// Inserts a session row and returns its generated identifier.
    async fn insert_session(&self, session: &NewSession) -> StoreResult<SessionId>;

    /// Inserts an event row.
    async fn insert_event(&self, event: &Event) -> StoreResult<()>;
}
