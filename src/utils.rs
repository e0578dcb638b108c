use std::net::UdpSocket;
use std::path::Path;

use color_eyre::{eyre::eyre, Result};
use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device};

use crate::capture::frame::PixelFormat;
use crate::capture::{Camera, V4l2Camera};
use crate::CaptureConfig;

/// Highest `/dev/videoN` index probed during auto-detection
const MAX_VIDEO_NODES: u32 = 64;

// Detected capture device info
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundDevice {
    pub path: String,
    pub format: PixelFormat,
}

/// Auto-detect a working capture device.
///
/// Metadata-only nodes are skipped by checking the capture capability, and
/// every candidate must deliver a frame on a test read. A node offering MJPEG
/// wins over one that only offers YUYV.
pub fn auto_detect_device(config: &CaptureConfig) -> Result<FoundDevice> {
    info!("Auto-detecting capture devices...");

    let mut fallback = None;
    for i in 0..MAX_VIDEO_NODES {
        let path = format!("/dev/video{i}");
        if !Path::new(&path).exists() {
            continue;
        }

        let Some(format) = probe_formats(&path) else {
            continue;
        };
        if fallback.is_some() && format != PixelFormat::Mjpeg {
            continue;
        }

        if let Err(reason) = test_read(&path, format, config) {
            debug!(device = %path, %reason, "Test read failed");
            continue;
        }

        let found = FoundDevice { path, format };
        if format == PixelFormat::Mjpeg {
            info!("Found MJPEG device: {}", found.path);
            return Ok(found);
        }
        fallback = Some(found);
    }

    match fallback {
        Some(found) => {
            info!("Found YUYV device: {}", found.path);
            Ok(found)
        }
        None => Err(eyre!(
            "No working video capture device found. Check that the camera is connected, \
             the uvcvideo module is loaded and /dev/video* nodes exist"
        )),
    }
}

/// Best format a capture node offers, `None` if it can't capture at all.
fn probe_formats(path: &str) -> Option<PixelFormat> {
    let dev = Device::with_path(path).ok()?;
    let caps = dev.query_caps().ok()?;
    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
        debug!(device = %path, card = %caps.card, "Skipping node without capture capability");
        return None;
    }

    let mut best = None;
    for desc in dev.enum_formats().ok()? {
        match PixelFormat::from_fourcc(&desc.fourcc.repr) {
            Some(PixelFormat::Mjpeg) => return Some(PixelFormat::Mjpeg),
            Some(PixelFormat::Yuyv) => best = Some(PixelFormat::Yuyv),
            _ => {}
        }
    }
    best
}

fn test_read(path: &str, format: PixelFormat, config: &CaptureConfig) -> Result<(), String> {
    let probe = CaptureConfig {
        device: path.to_owned(),
        format,
        ..config.clone()
    };
    let mut camera = V4l2Camera::open(&probe).map_err(|e| e.to_string())?;
    camera.read_frame().map(drop).map_err(|e| e.to_string())
}

/// Address other hosts on the LAN reach us at. Connecting a UDP socket sends
/// nothing, it only selects the outbound interface.
pub fn local_ip() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "localhost".to_owned())
}
