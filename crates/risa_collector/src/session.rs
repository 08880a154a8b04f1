//! Session resolution.
//!
//! Maps a request to a session identifier, opening a new session when the
//! client does not present one. Resolution runs in the request path: the
//! session row must exist and the cookie must be ready before the response
//! is written.

use crate::cookie::{CookieCodec, SessionCookie};
use crate::error::{CookieError, StoreError};
use crate::store::TrackStore;
use crate::types::{NewSession, SessionId};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why no session could be resolved.
#[derive(Debug)]
pub enum SessionFailure {
    /// The presented cookie failed verification, or a new one could not be
    /// encoded.
    Cookie(CookieError),
    /// The store rejected the new session row.
    Store(StoreError),
    /// The cookie verified but carries an empty session key.
    BlankKey,
}

/// Outcome of resolving a request's session.
#[derive(Debug)]
pub enum SessionResolution {
    /// The client presented a session cookie.
    Existing(SessionId),
    /// A new session was stored. `set_cookie` must be sent to the client.
    Created {
        /// Newly issued identifier.
        id: SessionId,
        /// `Set-Cookie` header value carrying the identifier.
        set_cookie: String,
    },
    /// No session; the request must not record an event.
    Unavailable(SessionFailure),
}

impl SessionResolution {
    /// Returns the resolved identifier, if any.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            SessionResolution::Existing(id) | SessionResolution::Created { id, .. } => Some(id),
            SessionResolution::Unavailable(_) => None,
        }
    }

    /// Returns the `Set-Cookie` value to send, if a session was created.
    pub fn set_cookie(&self) -> Option<&str> {
        match self {
            SessionResolution::Created { set_cookie, .. } => Some(set_cookie.as_str()),
            _ => None,
        }
    }
}

/// Resolves or creates sessions.
#[derive(Clone)]
pub struct SessionResolver {
    store: Arc<dyn TrackStore>,
    codec: CookieCodec,
}

impl SessionResolver {
    /// Creates a resolver writing new sessions to `store`.
    pub fn new(store: Arc<dyn TrackStore>, codec: CookieCodec) -> Self {
        Self { store, codec }
    }

    /// Returns the cookie codec.
    pub fn codec(&self) -> &CookieCodec {
        &self.codec
    }

    /// Resolves the session for a request.
    ///
    /// `cookie` is the raw `_risa` cookie value, if the client sent one.
    /// A session key read from a valid cookie is returned as-is; the store
    /// is not consulted.
    pub async fn resolve(&self, cookie: Option<&str>, user_agent: &str) -> SessionResolution {
        let now = Utc::now();

        let mut container = match cookie {
            Some(value) => match self.codec.decode(value, now) {
                Ok(container) => container,
                Err(e) => {
                    warn!(error = %e, "rejected session cookie");
                    return SessionResolution::Unavailable(SessionFailure::Cookie(e));
                }
            },
            None => SessionCookie::new(),
        };

        match container.session_key() {
            Some("") => {
                warn!("session cookie carries an empty key");
                return SessionResolution::Unavailable(SessionFailure::BlankKey);
            }
            Some(key) => {
                debug!(session_id = key, "reusing session from cookie");
                return SessionResolution::Existing(SessionId::new(key));
            }
            None => {}
        }

        let id = match self.store.insert_session(&NewSession::now(user_agent)).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "failed to create session");
                return SessionResolution::Unavailable(SessionFailure::Store(e));
            }
        };

        container.set_session_key(id.as_str());
        match self.codec.encode(&container, now) {
            Ok(value) => {
                info!(session_id = %id, "created session");
                SessionResolution::Created {
                    set_cookie: self.codec.set_cookie_header(&value),
                    id,
                }
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "failed to encode session cookie");
                SessionResolution::Unavailable(SessionFailure::Cookie(e))
            }
        }
    }
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver")
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::find_cookie;
    use crate::store::InMemoryStore;
    use serde_json::Value;

    fn resolver() -> (Arc<InMemoryStore>, SessionResolver) {
        let store = Arc::new(InMemoryStore::new());
        let codec = CookieCodec::new(b"cookie-secret".to_vec());
        let resolver = SessionResolver::new(Arc::clone(&store) as Arc<dyn TrackStore>, codec);
        (store, resolver)
    }

    /// Extracts the cookie value from a `Set-Cookie` header.
    fn cookie_value(set_cookie: &str) -> &str {
        let first = set_cookie.split(';').next().unwrap();
        find_cookie([first], "_risa").unwrap()
    }

    #[tokio::test]
    async fn creates_session_without_cookie() {
        let (store, resolver) = resolver();

        let resolution = resolver.resolve(None, "Mozilla/5.0").await;
        let SessionResolution::Created { id, set_cookie } = &resolution else {
            panic!("expected a new session, got {resolution:?}");
        };
        assert_eq!(id.as_str(), "1");
        assert!(set_cookie.starts_with("_risa="));

        let sessions = store.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].1.user_agent, "Mozilla/5.0");
    }

    #[tokio::test]
    async fn resolving_twice_reuses_session() {
        let (store, resolver) = resolver();

        let first = resolver.resolve(None, "ua").await;
        let value = cookie_value(first.set_cookie().unwrap()).to_string();

        let second = resolver.resolve(Some(&value), "ua").await;
        let third = resolver.resolve(Some(&value), "ua").await;

        assert!(matches!(second, SessionResolution::Existing(_)));
        assert_eq!(second.session_id(), first.session_id());
        assert_eq!(third.session_id(), first.session_id());
        assert!(second.set_cookie().is_none());
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn cookie_id_is_trusted_without_lookup() {
        let (store, resolver) = resolver();
        let mut container = SessionCookie::new();
        container.set_session_key("12345");
        let value = resolver.codec().encode(&container, Utc::now()).unwrap();

        let resolution = resolver.resolve(Some(&value), "ua").await;
        assert_eq!(resolution.session_id().unwrap().as_str(), "12345");
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn empty_cookie_key_yields_no_session() {
        let (store, resolver) = resolver();
        let mut container = SessionCookie::new();
        container.set_session_key("");
        let value = resolver.codec().encode(&container, Utc::now()).unwrap();

        let resolution = resolver.resolve(Some(&value), "ua").await;
        assert!(matches!(
            resolution,
            SessionResolution::Unavailable(SessionFailure::BlankKey)
        ));
        assert!(resolution.session_id().is_none());
        assert!(resolution.set_cookie().is_none());
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn cookie_without_key_gets_session_and_keeps_entries() {
        let (store, resolver) = resolver();
        let mut container = SessionCookie::new();
        container.insert("theme", Value::String("dark".into()));
        let value = resolver.codec().encode(&container, Utc::now()).unwrap();

        let resolution = resolver.resolve(Some(&value), "ua").await;
        let reissued = cookie_value(resolution.set_cookie().unwrap());
        let decoded = resolver.codec().decode(reissued, Utc::now()).unwrap();

        assert_eq!(decoded.session_key(), Some("1"));
        assert_eq!(decoded.get("theme"), Some(&Value::String("dark".into())));
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn store_failure_yields_no_session() {
        let (store, resolver) = resolver();
        store.set_sessions_available(false);

        let resolution = resolver.resolve(None, "ua").await;
        assert!(matches!(
            resolution,
            SessionResolution::Unavailable(SessionFailure::Store(_))
        ));
        assert!(resolution.session_id().is_none());
        assert!(resolution.set_cookie().is_none());
    }

    #[tokio::test]
    async fn forged_cookie_yields_no_session() {
        let (store, resolver) = resolver();

        let resolution = resolver.resolve(Some("e30.0.AAAA"), "ua").await;
        assert!(matches!(
            resolution,
            SessionResolution::Unavailable(SessionFailure::Cookie(_))
        ));
        assert_eq!(store.session_count(), 0);
    }
}
