//! Command-line flags. They are the last configuration layer and override
//! both the TOML file and the environment.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::Config;

pub const USAGE: &str = "\
Usage: lookout [OPTIONS]

Options:
  --config <path>      TOML configuration file (default: ./lookout.toml if present)
  --device <path>      Video device, e.g. /dev/video0 (auto-detected if omitted)
  --camera <index>     Camera index, shorthand for --device /dev/video<index>
  --width <px>         Requested frame width
  --height <px>        Requested frame height
  --fps <n>            Requested frame rate
  --port <port>        HTTP port
  --quality <1-100>    JPEG quality of the video feed
  --model <name>       Vision model name
  --ollama-url <url>   Inference service generate endpoint
  --interval <secs>    Seconds between analysis cycles
  --no-ai              Start with analysis disabled
  -h, --help           Print this help";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("{0} requires a value")]
    MissingValue(&'static str),

    #[error("{flag} must be {expected}, got '{value}'")]
    InvalidValue {
        flag: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("Unknown argument '{0}'")]
    UnknownArgument(String),
}

/// Parsed flags; `None` leaves the configured value untouched.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CliArgs {
    pub help: bool,
    pub config: Option<PathBuf>,
    pub device: Option<String>,
    pub camera: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub port: Option<u16>,
    pub quality: Option<u8>,
    pub model: Option<String>,
    pub ollama_url: Option<String>,
    pub interval: Option<f64>,
    pub no_ai: bool,
}

impl CliArgs {
    /// Parse `args` as returned by `std::env::args()`, program name first.
    pub fn parse(args: &[String]) -> Result<Self, CliError> {
        let mut parsed = CliArgs::default();
        let mut rest = args.iter().skip(1);

        while let Some(arg) = rest.next() {
            match arg.as_str() {
                "-h" | "--help" => parsed.help = true,
                "--no-ai" => parsed.no_ai = true,
                "--config" => parsed.config = Some(value(&mut rest, "--config")?.into()),
                "--device" => parsed.device = Some(value(&mut rest, "--device")?.to_owned()),
                "--camera" => parsed.camera = Some(number(&mut rest, "--camera", "an integer")?),
                "--width" => parsed.width = Some(number(&mut rest, "--width", "an integer")?),
                "--height" => parsed.height = Some(number(&mut rest, "--height", "an integer")?),
                "--fps" => parsed.fps = Some(number(&mut rest, "--fps", "an integer")?),
                "--port" => parsed.port = Some(number(&mut rest, "--port", "a port number")?),
                "--quality" => {
                    let quality: u8 = number(&mut rest, "--quality", "between 1 and 100")?;
                    if !(1..=100).contains(&quality) {
                        return Err(CliError::InvalidValue {
                            flag: "--quality",
                            expected: "between 1 and 100",
                            value: quality.to_string(),
                        });
                    }
                    parsed.quality = Some(quality);
                }
                "--model" => parsed.model = Some(value(&mut rest, "--model")?.to_owned()),
                "--ollama-url" => {
                    parsed.ollama_url = Some(value(&mut rest, "--ollama-url")?.to_owned())
                }
                "--interval" => {
                    let secs: f64 = number(&mut rest, "--interval", "a positive number of seconds")?;
                    if !secs.is_finite() || secs <= 0.0 {
                        return Err(CliError::InvalidValue {
                            flag: "--interval",
                            expected: "a positive number of seconds",
                            value: secs.to_string(),
                        });
                    }
                    parsed.interval = Some(secs);
                }
                other => return Err(CliError::UnknownArgument(other.to_owned())),
            }
        }

        Ok(parsed)
    }

    /// Apply the given flags on top of an already layered configuration.
    /// `--device` wins over `--camera`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.capture.device = device.clone();
        } else if let Some(index) = self.camera {
            config.capture.device = format!("/dev/video{index}");
        }
        if let Some(width) = self.width {
            config.capture.width = width;
        }
        if let Some(height) = self.height {
            config.capture.height = height;
        }
        if let Some(fps) = self.fps {
            config.capture.fps = fps;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(quality) = self.quality {
            config.server.jpeg_quality = quality;
        }
        if let Some(model) = &self.model {
            config.analysis.model = model.clone();
        }
        if let Some(url) = &self.ollama_url {
            config.analysis.endpoint = url.clone();
        }
        if let Some(secs) = self.interval {
            config.analysis.interval_ms = (secs * 1000.0).round() as u64;
        }
        if self.no_ai {
            config.analysis.enabled = false;
        }
    }
}

fn value<'a>(
    rest: &mut impl Iterator<Item = &'a String>,
    flag: &'static str,
) -> Result<&'a str, CliError> {
    rest.next()
        .map(String::as_str)
        .ok_or(CliError::MissingValue(flag))
}

fn number<'a, T: FromStr>(
    rest: &mut impl Iterator<Item = &'a String>,
    flag: &'static str,
    expected: &'static str,
) -> Result<T, CliError> {
    let raw = value(rest, flag)?;
    raw.parse().map_err(|_| CliError::InvalidValue {
        flag,
        expected,
        value: raw.to_owned(),
    })
}
