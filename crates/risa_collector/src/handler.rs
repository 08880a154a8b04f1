//! Request handling for the track endpoint.

use crate::config::CollectorConfig;
use crate::cookie::{find_cookie, CookieCodec};
use crate::error::{ServerError, ServerResult};
use crate::recorder::EventRecorder;
use crate::session::{SessionResolution, SessionResolver};
use crate::signer::{QueryParams, Signer};
use crate::store::TrackStore;
use crate::types::Event;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN, SET_COOKIE, VARY,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{debug, warn};

/// Query parameter carrying the event category.
pub const CATEGORY_PARAM: &str = "c";
/// Query parameter carrying the event action.
pub const ACTION_PARAM: &str = "a";

/// Shared, immutable state for request handling.
///
/// Built once at startup from a [`CollectorConfig`] and a store.
pub struct TrackContext {
    signer: Signer,
    resolver: SessionResolver,
    recorder: EventRecorder,
    allow_origin: Option<HeaderValue>,
}

impl TrackContext {
    /// Creates a handler context.
    pub fn new(config: &CollectorConfig, store: Arc<dyn TrackStore>) -> ServerResult<Self> {
        config.validate()?;

        let allow_origin = config
            .allow_origin
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|_| ServerError::config("allowed origin is not a valid header value"))?;

        let codec = CookieCodec::new(config.cookie_secret.to_vec())
            .with_max_age(config.cookie_max_age);

        Ok(Self {
            signer: Signer::new(config.signing_secret.as_ref().map(|s| s.to_vec())),
            resolver: SessionResolver::new(Arc::clone(&store), codec),
            recorder: EventRecorder::new(store),
            allow_origin,
        })
    }
}

/// An inbound track request, as delivered by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct TrackRequest {
    /// Decoded query parameters.
    pub params: QueryParams,
    /// `User-Agent` header, empty when absent.
    pub user_agent: String,
    /// Raw `_risa` cookie value, if sent.
    pub session_cookie: Option<String>,
}

impl TrackRequest {
    /// Builds a request from query parameters and request headers.
    pub fn from_parts(params: QueryParams, headers: &HeaderMap) -> Self {
        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let cookies = headers
            .get_all(axum::http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok());
        let session_cookie =
            find_cookie(cookies, crate::cookie::SESSION_COOKIE).map(str::to_string);

        Self {
            params,
            user_agent,
            session_cookie,
        }
    }
}

/// Response to a track request. The body is always empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackResponse {
    /// `200 OK` or `403 Forbidden`.
    pub status: StatusCode,
    /// `Set-Cookie` value when a session was created.
    pub set_cookie: Option<String>,
    /// CORS origin to echo on success.
    pub allow_origin: Option<HeaderValue>,
}

impl TrackResponse {
    fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            set_cookie: None,
            allow_origin: None,
        }
    }

    /// Renders the response headers.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &self.set_cookie {
            match HeaderValue::from_str(cookie) {
                Ok(value) => {
                    headers.insert(SET_COOKIE, value);
                }
                Err(_) => warn!("session cookie is not a valid header value"),
            }
        }
        if let Some(origin) = &self.allow_origin {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            headers.insert(
                ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
            headers.insert(VARY, HeaderValue::from_static("Origin"));
        }
        headers
    }
}

impl IntoResponse for TrackResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers()).into_response()
    }
}

/// Handler for track requests.
pub struct TrackHandler {
    context: Arc<TrackContext>,
}

impl TrackHandler {
    /// Creates a new track handler.
    pub fn new(context: Arc<TrackContext>) -> Self {
        Self { context }
    }

    /// Handles one track request.
    ///
    /// Signature and session work complete before this returns; the event
    /// write is dispatched and left running.
    pub async fn handle(&self, request: TrackRequest) -> TrackResponse {
        let ctx = &self.context;

        if !ctx.signer.verify(&request.params) {
            debug!("rejected request signature");
            return TrackResponse::forbidden();
        }

        let category = request.params.get_or_empty(CATEGORY_PARAM);
        let action = request.params.get_or_empty(ACTION_PARAM);

        let resolution = ctx
            .resolver
            .resolve(request.session_cookie.as_deref(), &request.user_agent)
            .await;

        if let Some(id) = resolution.session_id() {
            // Detached: the response does not wait for the write.
            drop(ctx.recorder.record(Event::now(id.clone(), category, action)));
        }

        let set_cookie = match resolution {
            SessionResolution::Created { set_cookie, .. } => Some(set_cookie),
            _ => None,
        };

        TrackResponse {
            status: StatusCode::OK,
            set_cookie,
            allow_origin: ctx.allow_origin.clone(),
        }
    }
}
