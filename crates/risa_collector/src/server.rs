//! HTTP server.

use crate::config::CollectorConfig;
use crate::error::ServerResult;
use crate::handler::{TrackContext, TrackHandler, TrackRequest, TrackResponse};
use crate::signer::QueryParams;
use crate::store::TrackStore;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Path of the tracking endpoint.
pub const TRACK_PATH: &str = "/track";

/// The collector server.
///
/// Routes `GET /track` to a [`TrackHandler`]. Every request runs on its own
/// tokio task; the handler state is shared read-only.
///
/// # Example
///
/// ```no_run
/// use risa_collector::{CollectorConfig, CollectorServer, InMemoryStore};
/// use std::sync::Arc;
///
/// # async fn run() -> risa_collector::ServerResult<()> {
/// let config = CollectorConfig::new(b"cookie-secret".to_vec());
/// let server = CollectorServer::new(config, Arc::new(InMemoryStore::new()))?;
/// server.serve().await
/// # }
/// ```
pub struct CollectorServer {
    config: CollectorConfig,
    handler: Arc<TrackHandler>,
}

impl CollectorServer {
    /// Creates a server writing to `store`.
    pub fn new(config: CollectorConfig, store: Arc<dyn TrackStore>) -> ServerResult<Self> {
        let context = Arc::new(TrackContext::new(&config, store)?);
        let handler = Arc::new(TrackHandler::new(context));
        Ok(Self { config, handler })
    }

    /// Returns the track handler.
    pub fn handler(&self) -> &Arc<TrackHandler> {
        &self.handler
    }

    /// Builds the axum router.
    pub fn router(&self) -> Router {
        router(Arc::clone(&self.handler))
    }

    /// Binds the configured address and serves until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `signal` resolves.
    ///
    /// In-flight requests finish before this returns. Detached event writes
    /// are not awaited.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = listener.local_addr()?;
        info!(
            %addr,
            signing = self.config.signing_secret.is_some(),
            cors = self.config.allow_origin.is_some(),
            "risa collector listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await?;

        info!("risa collector stopped");
        Ok(())
    }
}

/// Builds a router serving `GET /track` with `handler`.
pub fn router(handler: Arc<TrackHandler>) -> Router {
    Router::new()
        .route(TRACK_PATH, get(track))
        .with_state(handler)
}

async fn track(
    State(handler): State<Arc<TrackHandler>>,
    Query(pairs): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> TrackResponse {
    let params: QueryParams = pairs.into_iter().collect();
    handler
        .handle(TrackRequest::from_parts(params, &headers))
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available: run until the process is killed.
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
