//! JPEG encoding of raw frames and scaled-down preview decoding

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use jpeg_decoder::Decoder;
use serde::{Deserialize, Serialize};

use super::frame::{Frame, PixelFormat};
use crate::error::{Result, StreamError};

/// Sensor-style JPEG quality: 1 is best, 63 is smallest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8")]
pub struct JpegQuality(u8);

impl JpegQuality {
    pub const BEST: u8 = 1;
    pub const WORST: u8 = 63;

    pub fn new(value: u8) -> Self {
        Self(value.clamp(Self::BEST, Self::WORST))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Map onto the encoder's 1..=100 (higher is better) scale.
    pub fn to_encoder_quality(self) -> u8 {
        let steps = u32::from(self.0 - Self::BEST);
        let span = u32::from(Self::WORST - Self::BEST);
        (100 - steps * 99 / span) as u8
    }
}

impl Default for JpegQuality {
    fn default() -> Self {
        Self(12)
    }
}

impl From<u8> for JpegQuality {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

/// Turns a raw frame into JPEG bytes.
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &Frame, quality: JpegQuality) -> Result<Bytes>;
}

/// Software encoder for packed YUV 4:2:2 frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegFrameEncoder;

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&self, frame: &Frame, quality: JpegQuality) -> Result<Bytes> {
        match frame.format() {
            PixelFormat::Yuyv => encode_yuyv(&frame.data, frame.width(), frame.height(), quality),
            other => Err(StreamError::UnsupportedEncoding(other)),
        }
    }
}

/// Compress a YUYV buffer to JPEG. A fresh buffer is allocated per call.
pub fn encode_yuyv(data: &[u8], width: u32, height: u32, quality: JpegQuality) -> Result<Bytes> {
    if width == 0 || height == 0 || width % 2 != 0 {
        return Err(StreamError::EncodeFailed(format!(
            "invalid YUYV dimensions {width}x{height}"
        )));
    }
    let expected = width as usize * height as usize * 2;
    if data.len() < expected {
        return Err(StreamError::EncodeFailed(format!(
            "YUYV buffer holds {} bytes, {width}x{height} needs {expected}",
            data.len()
        )));
    }

    let rgb = yuyv_to_rgb(&data[..expected]);

    let mut out = Vec::with_capacity(expected / 4);
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.to_encoder_quality());
    encoder
        .encode(&rgb, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| StreamError::EncodeFailed(e.to_string()))?;

    Ok(Bytes::from(out))
}

/// BT.601 full-range conversion, two pixels per 4-byte macropixel.
fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for px in data.chunks_exact(4) {
        let u = i32::from(px[1]) - 128;
        let v = i32::from(px[3]) - 128;
        for y in [px[0], px[2]] {
            let y = i32::from(y);
            rgb.push(clamp_u8(y + ((359 * v) >> 8)));
            rgb.push(clamp_u8(y - ((88 * u + 183 * v) >> 8)));
            rgb.push(clamp_u8(y + ((454 * u) >> 8)));
        }
    }
    rgb
}

fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// A JPEG decoded at reduced resolution.
#[derive(Debug)]
pub struct Preview {
    pub width: usize,
    pub height: usize,
    /// 1 for grayscale, 3 for RGB
    pub channels: usize,
    pub pixels: Vec<u8>,
}

/// Decode `data` at roughly `1/divisor` of its size using DCT scaling.
///
/// Returns `None` if the JPEG is unreadable or in a colour space other than
/// grayscale or RGB.
pub fn decode_preview(data: &[u8], divisor: u16) -> Option<Preview> {
    let mut decoder = Decoder::new(data);
    decoder.read_info().ok()?;
    let info = decoder.info()?;

    let divisor = divisor.max(1);
    let (width, height) = decoder
        .scale(
            (info.width / divisor).max(1),
            (info.height / divisor).max(1),
        )
        .ok()?;

    let channels = match info.pixel_format {
        jpeg_decoder::PixelFormat::L8 => 1,
        jpeg_decoder::PixelFormat::RGB24 => 3,
        _ => return None,
    };

    let pixels = decoder.decode().ok()?;
    let (width, height) = (usize::from(width), usize::from(height));
    if pixels.len() < width * height * channels {
        return None;
    }

    Some(Preview {
        width,
        height,
        channels,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_yuyv(width: u32, height: u32, luma: u8) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 2) as usize);
        for _ in 0..(width * height / 2) {
            data.extend_from_slice(&[luma, 128, luma, 128]);
        }
        data
    }

    #[test]
    fn quality_maps_onto_encoder_scale() {
        assert_eq!(JpegQuality::new(1).to_encoder_quality(), 100);
        assert_eq!(JpegQuality::new(63).to_encoder_quality(), 1);
        assert_eq!(JpegQuality::new(0).get(), 1);
        assert_eq!(JpegQuality::new(200).get(), 63);
        assert!(JpegQuality::new(10).to_encoder_quality() > JpegQuality::new(40).to_encoder_quality());
    }

    #[test]
    fn encodes_yuyv_to_jpeg() {
        let data = flat_yuyv(64, 48, 120);
        let jpeg = encode_yuyv(&data, 64, 48, JpegQuality::default()).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn rejects_short_buffers_and_odd_widths() {
        let data = flat_yuyv(64, 48, 120);
        assert!(matches!(
            encode_yuyv(&data[..100], 64, 48, JpegQuality::default()),
            Err(StreamError::EncodeFailed(_))
        ));
        assert!(matches!(
            encode_yuyv(&data, 63, 48, JpegQuality::default()),
            Err(StreamError::EncodeFailed(_))
        ));
    }

    #[test]
    fn gray_yuyv_stays_gray_in_rgb() {
        let rgb = yuyv_to_rgb(&[200, 128, 50, 128]);
        assert_eq!(rgb, vec![200, 200, 200, 50, 50, 50]);
    }

    #[test]
    fn preview_is_downscaled() {
        let data = flat_yuyv(128, 96, 180);
        let jpeg = encode_yuyv(&data, 128, 96, JpegQuality::new(4)).unwrap();
        let preview = decode_preview(&jpeg, 4).unwrap();
        assert_eq!((preview.width, preview.height), (32, 24));
        assert_eq!(preview.channels, 3);
        let luma = preview.pixels[0] as i32;
        assert!((luma - 180).abs() < 8, "decoded {luma}");
    }

    #[test]
    fn preview_of_garbage_is_none() {
        assert!(decode_preview(&[0x00, 0x11, 0x22], 4).is_none());
    }
}
