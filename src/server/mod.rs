//! HTTP surface: viewer page, MJPEG feed and JSON state endpoints.
//!
//! Handlers only read shared state ([`FrameBus`], [`StatusHandle`],
//! [`AnalysisState`]); the single write is the `enabled` flag flipped by
//! `/toggle_ai`.

pub mod handlers;
pub mod stream;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::analysis::AnalysisState;
use crate::capture::StatusHandle;
use crate::pipeline::FrameBus;
use crate::ServerConfig;

pub use stream::StreamSettings;

/// Shared state handed to every handler; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub frames: Arc<FrameBus>,
    pub capture: StatusHandle,
    pub analysis: Arc<AnalysisState>,
    pub model: Arc<str>,
    pub stream: StreamSettings,
}

impl AppState {
    pub fn new(
        frames: Arc<FrameBus>,
        capture: StatusHandle,
        analysis: Arc<AnalysisState>,
        model: &str,
        config: &ServerConfig,
    ) -> Self {
        Self {
            frames,
            capture,
            analysis,
            model: Arc::from(model),
            stream: StreamSettings {
                jpeg_quality: config.jpeg_quality,
                frame_poll: config.frame_poll(),
            },
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/video_feed", get(stream::video_feed))
        .route("/status", get(handlers::status))
        .route("/analysis", get(handlers::analysis))
        .route("/toggle_ai", get(handlers::toggle_ai).post(handlers::toggle_ai))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Serve until the listener fails. Open MJPEG streams never finish on their
/// own, so shutdown is left to the caller dropping this future.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}
