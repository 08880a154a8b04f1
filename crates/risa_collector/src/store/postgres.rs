//! PostgreSQL store.
//!
//! Expects the schema to be provisioned externally:
//!
//! ```sql
//! CREATE TABLE risa_sessions (
//!     id          BIGSERIAL PRIMARY KEY,
//!     user_agent  TEXT NOT NULL,
//!     start_time  TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE risa_events (
//!     id               BIGSERIAL PRIMARY KEY,
//!     risa_session_id  BIGINT NOT NULL REFERENCES risa_sessions (id),
//!     category         TEXT NOT NULL,
//!     action           TEXT NOT NULL,
//!     event_time       TIMESTAMPTZ NOT NULL
//! );
//! ```

use super::TrackStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{Event, NewSession, SessionId};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::debug;

/// A [`TrackStore`] backed by a PostgreSQL connection pool.
///
/// The pool is shared by every request and every detached event write.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects a pool to `url` and checks the connection.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.ping().await?;
        Ok(store)
    }

    /// Round-trips a trivial query.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        debug!("postgres store reachable");
        Ok(())
    }
}

#[async_trait]
impl TrackStore for PgStore {
    async fn insert_session(&self, session: &NewSession) -> StoreResult<SessionId> {
        let row = sqlx::query(
            "INSERT INTO risa_sessions (user_agent, start_time) VALUES ($1, $2) RETURNING id::text AS id",
        )
        .bind(&session.user_agent)
        .bind(session.start_time)
        .fetch_one(&self.pool)
        .await?;

        let id: String = row.try_get("id")?;
        Ok(SessionId::new(id))
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        let session_key = numeric_session_id(&event.session_id)?;

        sqlx::query(
            "INSERT INTO risa_events (risa_session_id, category, action, event_time) VALUES ($1, $2, $3, $4)",
        )
        .bind(session_key)
        .bind(&event.category)
        .bind(&event.action)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Parses a cookie-supplied identifier into the key column type.
///
/// Cookie values are trusted without an existence check, so a forged
/// non-numeric value surfaces here rather than at the database.
fn numeric_session_id(id: &SessionId) -> StoreResult<i64> {
    id.as_str()
        .parse()
        .map_err(|_| StoreError::InvalidSessionId(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_ids() {
        assert_eq!(numeric_session_id(&SessionId::new("42")).unwrap(), 42);
        assert_eq!(
            numeric_session_id(&SessionId::from(9_007_199_254_740_993)).unwrap(),
            9_007_199_254_740_993
        );
    }

    #[test]
    fn rejects_non_numeric_ids() {
        let err = numeric_session_id(&SessionId::new("abc")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidSessionId(_)));
        assert!(numeric_session_id(&SessionId::new("")).is_err());
    }
}
