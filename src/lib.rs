pub mod analysis;
pub mod capture;
pub mod cli;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod utils;

use std::path::Path;
use std::time::Duration;

use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

pub use capture::Frame;
pub use pipeline::FrameBus;

/// Environment variable prefix, e.g. `LOOKOUT__SERVER__PORT=8000`
pub const ENV_PREFIX: &str = "LOOKOUT";

/// System configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub analysis: AnalysisConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Device node, e.g. `/dev/video0`. Empty means auto-detect.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Preferred wire format, YUYV is tried if the device refuses it
    pub format: PixelFormat,
    /// Driver-side queue depth; kept minimal so reads return the newest frame
    pub buffer_count: u32,
    pub read_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub reopen_delay_ms: u64,
    /// Consecutive read failures tolerated before the device is reopened
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub enabled: bool,
    pub model: String,
    /// Full URL of the generate endpoint
    pub endpoint: String,
    pub prompt: String,
    pub interval_ms: u64,
    pub request_timeout_ms: u64,
    pub jpeg_quality: u8,
    /// Snapshots wider than this are downscaled before upload
    pub max_width: u32,
    pub backoff_cap_ms: u64,
    pub min_delay_ms: u64,
    /// Recheck period while disabled or before the first frame
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Quality of the parts sent on `/video_feed`
    pub jpeg_quality: u8,
    /// Fallback wake-up for stream workers waiting on a new frame
    pub frame_poll_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                device: String::new(),
                width: 1280,
                height: 720,
                fps: 30,
                format: PixelFormat::Mjpeg,
                buffer_count: 1,
                read_timeout_ms: 2_000,
                retry_delay_ms: 10,
                reopen_delay_ms: 1_000,
                max_consecutive_failures: 30,
            },
            analysis: AnalysisConfig {
                enabled: true,
                model: "llava".into(),
                endpoint: "http://localhost:11434/api/generate".into(),
                prompt: "Describe what you see in this image in two or three short sentences. \
                         List any people, animals or notable objects."
                    .into(),
                interval_ms: 5_000,
                request_timeout_ms: 60_000,
                jpeg_quality: 75,
                max_width: 640,
                backoff_cap_ms: 30_000,
                min_delay_ms: 500,
                poll_interval_ms: 1_000,
            },
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
                jpeg_quality: 80,
                frame_poll_ms: 10,
            },
        }
    }
}

impl Config {
    /// Layer defaults, an optional TOML file and `LOOKOUT__*` environment
    /// variables. Without an explicit path `./lookout.toml` is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ::config::ConfigError> {
        let defaults = ::config::Config::try_from(&Config::default())?;

        let file = match path {
            Some(path) => ::config::File::from(path).required(true),
            None => ::config::File::with_name("lookout").required(false),
        };

        ::config::Config::builder()
            .add_source(defaults)
            .add_source(file)
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()
            .and_then(|config| config.validate().map(|()| config))
    }

    /// Reject values that would make a loop spin or an encoder misbehave.
    pub fn validate(&self) -> Result<(), ::config::ConfigError> {
        let periods = [
            ("server.frame_poll_ms", self.server.frame_poll_ms),
            ("analysis.interval_ms", self.analysis.interval_ms),
            ("analysis.poll_interval_ms", self.analysis.poll_interval_ms),
        ];
        if let Some((key, _)) = periods.iter().find(|(_, ms)| *ms == 0) {
            return Err(::config::ConfigError::Message(format!(
                "{key} must be greater than zero"
            )));
        }

        let qualities = [
            ("server.jpeg_quality", self.server.jpeg_quality),
            ("analysis.jpeg_quality", self.analysis.jpeg_quality),
        ];
        if let Some((key, q)) = qualities.iter().find(|(_, q)| !(1..=100).contains(q)) {
            return Err(::config::ConfigError::Message(format!(
                "{key} must be between 1 and 100, got {q}"
            )));
        }
        Ok(())
    }
}

impl CaptureConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn reopen_delay(&self) -> Duration {
        Duration::from_millis(self.reopen_delay_ms)
    }
}

impl AnalysisConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ServerConfig {
    pub fn frame_poll(&self) -> Duration {
        Duration::from_millis(self.frame_poll_ms)
    }
}
