//! # Risa Collector
//!
//! A minimal analytics collector: one HTTP endpoint that records a
//! `(category, action)` event against an anonymous, cookie-backed session.
//!
//! This crate provides:
//! - The `GET /track` endpoint (axum)
//! - Request signature verification (HMAC-SHA256)
//! - Session resolution backed by a signed `_risa` cookie
//! - Detached, fire-and-forget event persistence
//!
//! # Request Pipeline
//!
//! 1. Verify the `s` signature when a shared secret is configured; reject
//!    with `403` on mismatch
//! 2. Resolve the session from the cookie, or open a new one and set the
//!    cookie
//! 3. Spawn the event write without waiting for it
//! 4. Respond `200`, with CORS headers when an origin is configured
//!
//! Failures after step 1 never reach the client: a failed session insert
//! suppresses the event, a failed event insert is dropped.
//!
//! # Signing
//!
//! ```rust
//! use risa_collector::{sign, QueryParams};
//!
//! let params: QueryParams = [("c", "user"), ("a", "login")].into_iter().collect();
//! let signature = sign(&params, b"shared-secret");
//! // GET /track?c=user&a=login&s=<urlencoded signature>
//! # assert_eq!(signature.len(), 44);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod cookie;
mod error;
mod handler;
mod recorder;
mod server;
mod session;
mod signer;
mod store;
mod types;

pub use config::{
    CollectorConfig, ENV_ALLOW_ORIGIN, ENV_COOKIE_SECRET, ENV_PG_MAX_CONNECTIONS, ENV_PG_URL,
    ENV_PORT, ENV_SECRET,
};
pub use cookie::{
    find_cookie, CookieCodec, SessionCookie, DEFAULT_COOKIE_MAX_AGE, SESSION_COOKIE, SESSION_KEY,
};
pub use error::{
    CookieError, CookieResult, ServerError, ServerResult, StoreError, StoreResult,
};
pub use handler::{
    TrackContext, TrackHandler, TrackRequest, TrackResponse, ACTION_PARAM, CATEGORY_PARAM,
};
pub use recorder::EventRecorder;
pub use server::{router, CollectorServer, TRACK_PATH};
pub use session::{SessionFailure, SessionResolution, SessionResolver};
pub use signer::{canonicalize, sign, verify, QueryParams, Signer, SIGNATURE_PARAM};
pub use store::{InMemoryStore, PgStore, TrackStore};
pub use types::{Event, NewSession, SessionId};
