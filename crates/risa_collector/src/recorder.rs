//! Detached event persistence.
//!
//! Each event is written by its own spawned task. The request that produced
//! it never waits for the write, and the write's outcome is never reported
//! back. A failed insert is logged and dropped: there is no retry and no
//! queue, so an unavailable store loses events rather than buffering them.
//! Writes still in flight when the process exits are lost.

use crate::store::TrackStore;
use crate::types::Event;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Persists events in the background.
#[derive(Clone)]
pub struct EventRecorder {
    store: Arc<dyn TrackStore>,
}

impl EventRecorder {
    /// Creates a recorder writing to `store`.
    pub fn new(store: Arc<dyn TrackStore>) -> Self {
        Self { store }
    }

    /// Spawns the insert for `event` and returns immediately.
    ///
    /// Must be called from within a tokio runtime. The returned handle only
    /// exists for callers that want to observe completion; dropping it
    /// detaches the task.
    pub fn record(&self, event: Event) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match store.insert_event(&event).await {
                Ok(()) => debug!(
                    session_id = %event.session_id,
                    category = %event.category,
                    action = %event.action,
                    "recorded event"
                ),
                Err(e) if e.is_row_error() => debug!(
                    session_id = %event.session_id,
                    error = %e,
                    "dropped event"
                ),
                Err(e) => warn!(
                    session_id = %event.session_id,
                    error = %e,
                    "dropped event"
                ),
            }
        })
    }
}

impl std::fmt::Debug for EventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecorder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{NewSession, SessionId};

    #[tokio::test]
    async fn records_event() {
        let store = Arc::new(InMemoryStore::new());
        let id = store.insert_session(&NewSession::now("ua")).await.unwrap();
        let recorder = EventRecorder::new(Arc::clone(&store) as Arc<dyn TrackStore>);

        recorder
            .record(Event::now(id.clone(), "user", "login"))
            .await
            .unwrap();

        let events = store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session_id, id);
        assert_eq!(events[0].category, "user");
        assert_eq!(events[0].action, "login");
    }

    #[tokio::test]
    async fn failure_is_swallowed() {
        let store = Arc::new(InMemoryStore::new());
        let recorder = EventRecorder::new(Arc::clone(&store) as Arc<dyn TrackStore>);

        // Unknown session: the task completes normally without a row.
        let handle = recorder.record(Event::now(SessionId::new("99"), "c", "a"));
        assert!(handle.await.is_ok());
        assert_eq!(store.event_count(), 0);
    }
}
