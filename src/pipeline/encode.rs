//! Image encoding: rendered page → JPEG bytes, and JPEG bytes → data URI.
//!
//! Preview pages are photographs of text at 200 DPI; JPEG at quality 90 keeps
//! them legible at a fraction of PNG's size. The alpha channel is dropped
//! before encoding since JPEG has none and pages render on white.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::sync::Arc;
use tracing::debug;

/// One rendered page: encoded JPEG bytes plus its 0-based physical index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub index: usize,
    pub jpeg: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
}

impl PageImage {
    pub fn new(index: usize, jpeg: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            index,
            jpeg: jpeg.into(),
            width,
            height,
        }
    }

    /// `data:image/jpeg;base64,…` form for event payloads.
    pub fn data_uri(&self) -> String {
        jpeg_data_uri(&self.jpeg)
    }
}

/// Encode a rendered page as an opaque JPEG at the given quality.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)?;
    debug!(
        "Encoded {}x{} page → {} bytes JPEG (q={})",
        rgb.width(),
        rgb.height(),
        buf.len(),
        quality
    );
    Ok(buf)
}

pub fn jpeg_data_uri(jpeg: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encodes_rgba_as_jpeg() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 8, Rgba([255, 0, 0, 128])));
        let bytes = encode_jpeg(&img, 90).expect("encode should succeed");
        // SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).expect("valid jpeg");
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn data_uri_prefix() {
        let uri = jpeg_data_uri(&[0xFF, 0xD8, 0xFF]);
        assert!(uri.starts_with("data:image/jpeg;base64,"));
        let payload = uri.trim_start_matches("data:image/jpeg;base64,");
        assert_eq!(STANDARD.decode(payload).unwrap(), vec![0xFF, 0xD8, 0xFF]);
    }
}
