use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::analysis::AnalysisSnapshot;

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
pub enum StatusResponse {
    #[serde(rename = "running")]
    Running { width: u32, height: u32, fps: f64 },
    #[serde(rename = "no camera")]
    NoCamera,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    #[serde(flatten)]
    pub snapshot: AnalysisSnapshot,
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub ai_enabled: bool,
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let response = match state.capture.running() {
        Some(metrics) => StatusResponse::Running {
            width: metrics.width,
            height: metrics.height,
            fps: metrics.fps,
        },
        None => StatusResponse::NoCamera,
    };
    Json(response)
}

pub async fn analysis(State(state): State<AppState>) -> Json<AnalysisResponse> {
    Json(AnalysisResponse {
        snapshot: state.analysis.snapshot(),
        model: state.model.to_string(),
    })
}

pub async fn toggle_ai(State(state): State<AppState>) -> Json<ToggleResponse> {
    let ai_enabled = state.analysis.toggle();
    tracing::info!(ai_enabled, "Analysis toggled");
    Json(ToggleResponse { ai_enabled })
}
