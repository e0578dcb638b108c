pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod service;
pub mod source;
pub mod v4l2;

pub use frame::Frame;
pub use frame::PixelFormat;
pub use service::{CaptureService, CaptureState, StatusHandle};
pub use source::{Camera, CameraOpener, DeviceMetrics};
pub use v4l2::{V4l2Camera, V4l2Opener};
