use jpeg_decoder::Decoder;

use super::frame::PixelFormat;
use crate::error::CaptureError;

/// RGB24 pixels produced from one device buffer.
#[derive(Debug)]
pub struct Decoded {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decode a raw device buffer into packed RGB24.
///
/// `width`/`height` are the negotiated dimensions; MJPEG payloads carry their
/// own and those win.
pub fn decode_frame(
    data: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<Decoded, CaptureError> {
    match format {
        PixelFormat::Mjpeg => decode_mjpeg(data),
        PixelFormat::Rgb24 => {
            let expected = (width * height * 3) as usize;
            if data.len() < expected {
                return Err(CaptureError::ReadFailure(format!(
                    "short RGB24 buffer: {} < {expected} bytes",
                    data.len()
                )));
            }
            Ok(Decoded {
                pixels: data[..expected].to_vec(),
                width,
                height,
            })
        }
        PixelFormat::Yuyv => {
            let pixels = yuyv_to_rgb24(data, width, height)?;
            Ok(Decoded {
                pixels,
                width,
                height,
            })
        }
    }
}

fn decode_mjpeg(data: &[u8]) -> Result<Decoded, CaptureError> {
    // Some UVC cameras hand out empty or truncated buffers while settling
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return Err(CaptureError::ReadFailure("buffer is not a JPEG image".into()));
    }

    let mut decoder = Decoder::new(data);
    let pixels = decoder
        .decode()
        .map_err(|e| CaptureError::ReadFailure(format!("MJPEG decode: {e}")))?;
    let info = decoder
        .info()
        .ok_or_else(|| CaptureError::ReadFailure("MJPEG decode: missing header".into()))?;

    let pixels = match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => pixels,
        jpeg_decoder::PixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l]).collect(),
        other => {
            return Err(CaptureError::ReadFailure(format!(
                "unsupported JPEG pixel format {other:?}"
            )))
        }
    };

    Ok(Decoded {
        pixels,
        width: u32::from(info.width),
        height: u32::from(info.height),
    })
}

/// Convert packed YUYV 4:2:2 into RGB24 using BT.601 coefficients.
pub fn yuyv_to_rgb24(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
    let expected = (width * height * 2) as usize;
    if data.len() < expected {
        return Err(CaptureError::ReadFailure(format!(
            "short YUYV buffer: {} < {expected} bytes",
            data.len()
        )));
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    [clamp(r), clamp(g), clamp(b)]
}

fn clamp(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::encoder::encode_rgb24;

    #[test]
    fn yuyv_black_and_white() {
        // Y=16 is black, Y=235 is white with neutral chroma
        let data = [16u8, 128, 235, 128];
        let rgb = yuyv_to_rgb24(&data, 2, 1).unwrap();
        assert_eq!(rgb, vec![0, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn yuyv_rejects_short_buffer() {
        let err = yuyv_to_rgb24(&[0u8; 6], 2, 2).unwrap_err();
        assert!(matches!(err, CaptureError::ReadFailure(_)));
    }

    #[test]
    fn mjpeg_decodes_to_rgb24_with_header_dimensions() {
        let pixels = vec![200u8; 16 * 8 * 3];
        let jpeg = encode_rgb24(&pixels, 16, 8, 90).unwrap();

        let decoded = decode_frame(&jpeg, PixelFormat::Mjpeg, 640, 480).unwrap();
        assert_eq!((decoded.width, decoded.height), (16, 8));
        assert_eq!(decoded.pixels.len(), 16 * 8 * 3);
    }

    #[test]
    fn garbage_mjpeg_is_a_read_failure() {
        let err = decode_frame(&[0u8; 32], PixelFormat::Mjpeg, 4, 4).unwrap_err();
        assert!(matches!(err, CaptureError::ReadFailure(_)));
    }
}
