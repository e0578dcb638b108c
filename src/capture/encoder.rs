//! JPEG encoding and downscaling of published frames.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageError, RgbImage};

use super::frame::Frame;

/// Encode packed RGB24 pixels as a baseline JPEG.
pub fn encode_rgb24(pixels: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::with_capacity(pixels.len() / 8);
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder.encode(pixels, width, height, ExtendedColorType::Rgb8)?;
    Ok(out)
}

/// Encode a frame at the given quality.
pub fn encode_frame(frame: &Frame, quality: u8) -> Result<Bytes, ImageError> {
    encode_rgb24(&frame.data, frame.width(), frame.height(), quality).map(Bytes::from)
}

/// Encode a frame, first shrinking it to `max_width` (aspect preserved) when
/// it is wider than that.
pub fn encode_frame_scaled(frame: &Frame, max_width: u32, quality: u8) -> Result<Bytes, ImageError> {
    let (width, height) = (frame.width(), frame.height());
    if width <= max_width || max_width == 0 {
        return encode_frame(frame, quality);
    }

    let Some(image) = RgbImage::from_raw(width, height, frame.data.to_vec()) else {
        return Err(ImageError::Parameter(image::error::ParameterError::from_kind(
            image::error::ParameterErrorKind::DimensionMismatch,
        )));
    };

    let (scaled_width, scaled_height) = scaled_dimensions(width, height, max_width);
    let scaled = imageops::resize(&image, scaled_width, scaled_height, FilterType::Triangle);
    encode_rgb24(scaled.as_raw(), scaled_width, scaled_height, quality).map(Bytes::from)
}

fn scaled_dimensions(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    let scale = f64::from(max_width) / f64::from(width);
    let scaled_height = (f64::from(height) * scale).round().max(1.0) as u32;
    (max_width, scaled_height)
}
