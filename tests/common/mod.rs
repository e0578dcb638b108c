//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use lookout::analysis::AnalysisState;
use lookout::capture::frame::PixelFormat;
use lookout::capture::{Camera, CameraOpener, CaptureService, DeviceMetrics, StatusHandle};
use lookout::error::CaptureError;
use lookout::server::{self, AppState};
use lookout::{CaptureConfig, Config, Frame, FrameBus};

/// Camera that always delivers a small grey frame.
pub struct TestCamera {
    sequence: u64,
}

impl Camera for TestCamera {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        self.sequence += 1;
        Ok(Frame::rgb24(self.sequence, 32, 24, vec![128u8; 32 * 24 * 3]))
    }

    fn metrics(&self) -> DeviceMetrics {
        DeviceMetrics {
            width: 640,
            height: 480,
            fps: 30.0,
            format: PixelFormat::Mjpeg,
        }
    }
}

pub struct TestOpener;

impl CameraOpener for TestOpener {
    type Camera = TestCamera;

    fn open(&mut self, _config: &CaptureConfig) -> Result<TestCamera, CaptureError> {
        Ok(TestCamera { sequence: 0 })
    }
}

pub struct TestApp {
    pub frames: Arc<FrameBus>,
    pub analysis: Arc<AnalysisState>,
    pub capture: CaptureService<TestOpener>,
    pub status: StatusHandle,
}

impl TestApp {
    pub fn new() -> Self {
        let config = Config::default();
        let frames = Arc::new(FrameBus::new());
        let capture = CaptureService::new(TestOpener, config.capture, frames.clone());
        let status = capture.status_handle();
        Self {
            frames,
            analysis: Arc::new(AnalysisState::new(true)),
            capture,
            status,
        }
    }

    pub fn router(&self) -> Router {
        let config = Config::default();
        server::router(AppState::new(
            self.frames.clone(),
            self.status.clone(),
            self.analysis.clone(),
            &config.analysis.model,
            &config.server,
        ))
    }
}

pub async fn request(app: Router, method: Method, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    request(app, Method::GET, uri).await
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
