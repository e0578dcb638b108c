//! V4L2 capture backed by memory-mapped driver buffers

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::fraction::Fraction;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::{
    capture::{
        decoder::decode_frame,
        frame::{Frame, FrameMetadata, PixelFormat},
        source::{Camera, CameraOpener, DeviceMetrics},
    },
    error::CaptureError,
    CaptureConfig,
};

/// Opens [`V4l2Camera`]s for the capture service
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2Opener;

impl CameraOpener for V4l2Opener {
    type Camera = V4l2Camera;

    fn open(&mut self, config: &CaptureConfig) -> Result<V4l2Camera, CaptureError> {
        V4l2Camera::open(config)
    }
}

/// An opened and streaming V4L2 device
pub struct V4l2Camera {
    stream: MmapStream<'static>,
    _device: Device,
    metrics: DeviceMetrics,
    sequence: u64,
}

impl V4l2Camera {
    /// Open the device, negotiate format/resolution/fps and start streaming.
    #[instrument(skip(config), fields(device = %config.device))]
    pub fn open(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let unavailable = |reason: String| CaptureError::DeviceUnavailable {
            device: config.device.clone(),
            reason,
        };

        let device = Device::with_path(&config.device).map_err(|e| unavailable(e.to_string()))?;

        let caps = device.query_caps().map_err(|e| unavailable(e.to_string()))?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(unavailable("device doesn't support video capture".into()));
        }

        let (format, width, height) = negotiate_format(&device, config).map_err(unavailable)?;

        if config.fps > 0 {
            if let Err(e) = device.set_params(&Parameters::with_fps(config.fps)) {
                warn!("Driver rejected {} fps: {}", config.fps, e);
            }
        }
        let fps = device
            .params()
            .map(|params| fps_from_interval(params.interval))
            .unwrap_or(f64::from(config.fps));

        let mut stream =
            MmapStream::with_buffers(&device, Type::VideoCapture, config.buffer_count.max(1))
                .map_err(|e| unavailable(e.to_string()))?;
        stream.set_timeout(config.read_timeout());

        info!(
            "Camera settings: {}x{} @ {:.1} FPS, format: {:?}, {} buffer(s)",
            width, height, fps, format, config.buffer_count
        );

        Ok(Self {
            stream,
            _device: device,
            metrics: DeviceMetrics {
                width,
                height,
                fps,
                format,
            },
            sequence: 0,
        })
    }
}

impl Camera for V4l2Camera {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let timestamp = Instant::now();

        let (buf, meta) = CaptureStream::next(&mut self.stream)
            .map_err(|e| CaptureError::ReadFailure(e.to_string()))?;

        let used = (meta.bytesused as usize).min(buf.len());
        if used == 0 {
            return Err(CaptureError::ReadFailure("driver returned an empty buffer".into()));
        }

        let decoded = decode_frame(
            &buf[..used],
            self.metrics.format,
            self.metrics.width,
            self.metrics.height,
        )?;

        self.sequence += 1;

        Ok(Frame {
            data: Bytes::from(decoded.pixels),
            meta: Arc::new(FrameMetadata {
                sequence: self.sequence,
                width: decoded.width,
                height: decoded.height,
                format: PixelFormat::Rgb24,
            }),
            timestamp,
        })
    }

    fn metrics(&self) -> DeviceMetrics {
        self.metrics
    }
}

/// Ask for the configured format first, then fall back to the other
/// compressed/packed formats we can decode.
fn negotiate_format(
    device: &Device,
    config: &CaptureConfig,
) -> Result<(PixelFormat, u32, u32), String> {
    let mut candidates = vec![config.format];
    for fallback in [PixelFormat::Mjpeg, PixelFormat::Yuyv] {
        if !candidates.contains(&fallback) {
            candidates.push(fallback);
        }
    }

    for wanted in candidates {
        let mut fmt = device.format().map_err(|e| e.to_string())?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = FourCC::new(&wanted.fourcc());

        let actual = device.set_format(&fmt).map_err(|e| e.to_string())?;
        match PixelFormat::from_fourcc(&actual.fourcc.repr) {
            Some(format) => {
                if format != config.format {
                    warn!("Requested {:?}, driver settled on {:?}", config.format, format);
                }
                if (actual.width, actual.height) != (config.width, config.height) {
                    warn!(
                        "Requested {}x{}, driver settled on {}x{}",
                        config.width, config.height, actual.width, actual.height
                    );
                }
                return Ok((format, actual.width, actual.height));
            }
            None => warn!("Driver does not accept {:?}", wanted),
        }
    }

    Err("no supported pixel format (MJPEG, YUYV, RGB3)".into())
}

fn fps_from_interval(interval: Fraction) -> f64 {
    if interval.numerator == 0 {
        return 0.0;
    }
    f64::from(interval.denominator) / f64::from(interval.numerator)
}
