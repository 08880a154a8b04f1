//! In-memory store for testing.

use super::TrackStore;
use crate::error::{StoreError, StoreResult};
use crate::types::{Event, NewSession, SessionId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// An in-memory [`TrackStore`].
///
/// Identifiers are generated from a counter starting at 1, like a serial
/// primary key. Events referencing an unknown session are rejected the way
/// a foreign key would reject them.
///
/// Writes can be made to fail with [`set_sessions_available`] and
/// [`set_events_available`] to exercise degradation paths.
///
/// [`set_sessions_available`]: InMemoryStore::set_sessions_available
/// [`set_events_available`]: InMemoryStore::set_events_available
#[derive(Debug)]
pub struct InMemoryStore {
    sessions: RwLock<Vec<(SessionId, NewSession)>>,
    events: RwLock<Vec<Event>>,
    next_id: AtomicI64,
    sessions_available: AtomicBool,
    events_available: AtomicBool,
    event_written: Notify,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(Vec::new()),
            events: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            sessions_available: AtomicBool::new(true),
            events_available: AtomicBool::new(true),
            event_written: Notify::new(),
        }
    }

    /// Makes session inserts succeed or fail.
    pub fn set_sessions_available(&self, available: bool) {
        self.sessions_available.store(available, Ordering::SeqCst);
    }

    /// Makes event inserts succeed or fail.
    pub fn set_events_available(&self, available: bool) {
        self.events_available.store(available, Ordering::SeqCst);
    }

    /// Returns a copy of every session row.
    pub fn sessions(&self) -> Vec<(SessionId, NewSession)> {
        self.sessions.read().clone()
    }

    /// Returns a copy of every event row.
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Returns the number of session rows.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns the number of event rows.
    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    /// Waits until at least `count` events are stored.
    ///
    /// Returns false if `timeout` elapses first.
    pub async fn wait_for_events(&self, count: usize, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.event_written.notified();
                if self.event_count() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl TrackStore for InMemoryStore {
    async fn insert_session(&self, session: &NewSession) -> StoreResult<SessionId> {
        if !self.sessions_available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("session writes disabled".into()));
        }
        let id = SessionId::from(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sessions.write().push((id.clone(), session.clone()));
        Ok(id)
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        if !self.events_available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("event writes disabled".into()));
        }
        let known = self
            .sessions
            .read()
            .iter()
            .any(|(id, _)| *id == event.session_id);
        if !known {
            return Err(StoreError::UnknownSession(event.session_id.to_string()));
        }
        self.events.write().push(event.clone());
        self.event_written.notify_waiters();
        Ok(())
    }
}
