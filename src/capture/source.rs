use serde::Serialize;

use super::frame::{Frame, PixelFormat};
use crate::error::CaptureError;
use crate::CaptureConfig;

/// What the driver actually agreed to, which may differ from what was asked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeviceMetrics {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub format: PixelFormat,
}

/// An open capture device.
///
/// Dropping the camera releases the device.
pub trait Camera: Send {
    /// Block until the next frame is available (bounded by the read timeout).
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;

    fn metrics(&self) -> DeviceMetrics;
}

/// Opens cameras for the capture loop. Called once at startup and once per
/// reopen attempt.
pub trait CameraOpener: Send {
    type Camera: Camera;

    fn open(&mut self, config: &CaptureConfig) -> Result<Self::Camera, CaptureError>;
}
