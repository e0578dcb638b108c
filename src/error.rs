//! Error types shared by the capture, analysis and streaming paths.

use std::time::Duration;

/// Failures of the capture device.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The device node could not be opened or configured.
    #[error("capture device {device} unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    /// The device opened but the test read produced no frame.
    #[error("capture device {device} opened but produced no frames: {reason}")]
    NoFrames { device: String, reason: String },

    /// A single read failed. Counted and retried by the capture loop.
    #[error("frame read failed: {0}")]
    ReadFailure(String),
}

/// Failures talking to the inference service, already classified for
/// display in the analysis state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    #[error("Inference request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cannot connect to inference service at {0}")]
    ConnectionUnavailable(String),

    #[error("{0}")]
    Other(String),
}

/// Failures local to one `/video_feed` connection.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("JPEG encode failed: {0}")]
    Encode(String),

    #[error("client disconnected")]
    ClientDisconnected,
}
