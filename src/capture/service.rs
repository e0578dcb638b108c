//! Capture loop: owns the camera, publishes every frame to the bus and
//! reopens the device when reads keep failing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use arc_swap::ArcSwap;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::capture::source::{Camera, CameraOpener, DeviceMetrics};
use crate::error::CaptureError;
use crate::pipeline::FrameBus;
use crate::CaptureConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Closed,
    Opening,
    Capturing,
    Reopening,
    /// Terminal: the reopen attempt failed
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub state: CaptureState,
    pub metrics: Option<DeviceMetrics>,
}

/// Read-only view of the capture service for status reporting.
#[derive(Clone)]
pub struct StatusHandle(Arc<ArcSwap<DeviceStatus>>);

impl StatusHandle {
    fn new() -> Self {
        Self(Arc::new(ArcSwap::from_pointee(DeviceStatus {
            state: CaptureState::Closed,
            metrics: None,
        })))
    }

    pub fn state(&self) -> CaptureState {
        self.0.load().state
    }

    /// Negotiated metrics while capturing, `None` means "no camera".
    pub fn running(&self) -> Option<DeviceMetrics> {
        let status = self.0.load();
        match status.state {
            CaptureState::Capturing => status.metrics,
            _ => None,
        }
    }

    fn store(&self, state: CaptureState, metrics: Option<DeviceMetrics>) {
        self.0.store(Arc::new(DeviceStatus { state, metrics }));
    }
}

/// Whether the loop should keep going after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

pub struct CaptureService<O: CameraOpener> {
    opener: O,
    config: CaptureConfig,
    bus: Arc<FrameBus>,
    status: StatusHandle,
    camera: Option<O::Camera>,
    consecutive_failures: u32,
    reopen_attempts: u32,
}

impl<O: CameraOpener> CaptureService<O> {
    pub fn new(opener: O, config: CaptureConfig, bus: Arc<FrameBus>) -> Self {
        Self {
            opener,
            config,
            bus,
            status: StatusHandle::new(),
            camera: None,
            consecutive_failures: 0,
            reopen_attempts: 0,
        }
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn state(&self) -> CaptureState {
        self.status.state()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn reopen_attempts(&self) -> u32 {
        self.reopen_attempts
    }

    /// Open the device and perform the test read.
    pub fn open(&mut self) -> Result<(), CaptureError> {
        info!(device = %self.config.device, "Opening camera");
        self.status.store(CaptureState::Opening, None);
        self.connect().inspect_err(|_| self.status.store(CaptureState::Closed, None))
    }

    fn connect(&mut self) -> Result<(), CaptureError> {
        let mut camera = self.opener.open(&self.config)?;

        let frame = camera.read_frame().map_err(|e| CaptureError::NoFrames {
            device: self.config.device.clone(),
            reason: e.to_string(),
        })?;
        info!("Test frame captured: {}x{}", frame.width(), frame.height());

        let metrics = camera.metrics();
        self.bus.publish(frame);
        self.camera = Some(camera);
        self.consecutive_failures = 0;
        self.status.store(CaptureState::Capturing, Some(metrics));
        Ok(())
    }

    /// Read one frame and publish it, or count the failure and reopen once
    /// the threshold is crossed.
    pub fn step(&mut self) -> Step {
        let Some(camera) = self.camera.as_mut() else {
            return Step::Stop;
        };

        match camera.read_frame() {
            Ok(frame) => {
                if self.consecutive_failures > 0 {
                    debug!(failures = self.consecutive_failures, "Capture recovered");
                }
                self.consecutive_failures = 0;
                self.bus.publish(frame);
                metrics::counter!("capture_frames_total").increment(1);
                Step::Continue
            }
            Err(err) => {
                self.consecutive_failures += 1;
                metrics::counter!("capture_read_failures_total").increment(1);
                debug!(failures = self.consecutive_failures, error = %err, "Frame read failed");

                if self.consecutive_failures > self.config.max_consecutive_failures {
                    return self.reopen();
                }
                thread::sleep(self.config.retry_delay());
                Step::Continue
            }
        }
    }

    fn reopen(&mut self) -> Step {
        warn!(
            failures = self.consecutive_failures,
            "Too many consecutive frame failures, reopening camera"
        );
        metrics::counter!("capture_reopens_total").increment(1);
        self.reopen_attempts += 1;
        self.status.store(CaptureState::Reopening, None);

        // Release before reopening, the driver refuses a second open
        self.camera = None;
        thread::sleep(self.config.reopen_delay());

        match self.connect() {
            Ok(()) => {
                info!("Camera reopened");
                Step::Continue
            }
            Err(err) => {
                error!(error = %err, "Failed to reopen camera, capture stopped");
                self.status.store(CaptureState::Failed, None);
                Step::Stop
            }
        }
    }

    /// Open (if needed) and capture until `stop` is set or the device is lost.
    pub fn run(mut self, stop: &AtomicBool) {
        if self.camera.is_none() {
            if let Err(err) = self.open() {
                error!(error = %err, "Failed to open camera");
                for hint in troubleshooting_hints(&self.config.device) {
                    error!("  {hint}");
                }
                self.status.store(CaptureState::Failed, None);
                return;
            }
        }

        info!("Camera ready, starting capture loop");
        while !stop.load(Ordering::Relaxed) {
            if self.step() == Step::Stop {
                break;
            }
        }

        if self.camera.take().is_some() {
            info!("Releasing camera");
            self.status.store(CaptureState::Closed, None);
        }
    }

    /// Run the loop on a dedicated thread; device reads block.
    pub fn spawn(self, stop: Arc<AtomicBool>) -> std::io::Result<thread::JoinHandle<()>>
    where
        O: 'static,
    {
        thread::Builder::new()
            .name("lookout-capture".into())
            .spawn(move || self.run(&stop))
    }
}

/// Checks worth running when the camera can't be opened at all.
pub fn troubleshooting_hints(device: &str) -> Vec<String> {
    vec![
        "Check the camera is connected: lsusb".to_owned(),
        "Check video devices exist: ls -la /dev/video*".to_owned(),
        "Load the UVC driver: sudo modprobe uvcvideo".to_owned(),
        format!("Check permissions (user in the `video` group?): ls -la {device}"),
        "Try another node: lookout --device /dev/video2".to_owned(),
    ]
}
