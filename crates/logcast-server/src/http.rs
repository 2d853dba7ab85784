use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{self, HeaderName};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use logcast_core::EventBus;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::session::{CloseReason, ConnectionSession};
use crate::transport::ChannelSink;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<EventBus>,
    pub config: Arc<ServerConfig>,
    /// Cancelled when the server shuts down; closes every live session.
    pub shutdown: CancellationToken,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let stream_path = state.config.stream_path.clone();
    Router::new()
        .route(&stream_path, get(stream_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Open a log stream session for one observer.
async fn stream_handler(State(state): State<AppState>) -> Response {
    let (sink, rx) = ChannelSink::channel();
    let disconnected = sink.receiver_dropped();

    let session = ConnectionSession::open(
        Arc::clone(&state.bus),
        Box::new(sink),
        state.config.heartbeat_interval(),
    );

    let shutdown = state.shutdown.clone();
    let _watcher = session.close_on(async move {
        tokio::select! {
            () = disconnected => CloseReason::Disconnected,
            () = shutdown.cancelled() => CloseReason::Shutdown,
        }
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(UnboundedReceiverStream::new(rx)),
    )
        .into_response()
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "sessions": state.bus.listener_count(),
    }))
}
