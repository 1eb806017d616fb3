//! Still-frame post-processing for captured camera content

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, RgbImage};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use super::CaptureError;

/// MIME type every captured still is encoded as
pub const JPEG_MIME_TYPE: &str = "image/jpeg";

/// How a sampled frame is turned into an encoded still
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOptions {
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Gaussian blur applied before encoding, 0 disables it
    pub blur_sigma: f32,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 92,
            blur_sigma: 10.0,
        }
    }
}

/// A JPEG-encoded still taken from the live stream.
///
/// The pixels are mirrored relative to the sensor so the still matches the
/// mirrored preview. The encoded bytes are shared, so cloning is cheap.
#[derive(Clone)]
pub struct CapturedImage {
    jpeg: Arc<[u8]>,
    width: u32,
    height: u32,
    captured_at: Instant,
}

impl CapturedImage {
    /// Wrap already-encoded JPEG bytes
    pub fn from_jpeg(jpeg: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            jpeg: jpeg.into(),
            width,
            height,
            captured_at: Instant::now(),
        }
    }

    /// Encoded JPEG bytes
    pub fn jpeg_bytes(&self) -> &[u8] {
        &self.jpeg
    }

    /// Base64 payload of the JPEG, the part of a data URI after the comma
    pub fn base64_payload(&self) -> String {
        STANDARD.encode(&self.jpeg)
    }

    /// Full `data:image/jpeg;base64,...` form
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", JPEG_MIME_TYPE, self.base64_payload())
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// When the still was taken
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

// Identity is the encoded content, not the capture time
impl PartialEq for CapturedImage {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.jpeg == other.jpeg
    }
}

impl Eq for CapturedImage {}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("bytes", &self.jpeg.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Mirror, optionally blur, and JPEG-encode a raw RGB frame
pub fn encode_still(frame: &RgbImage, options: &FrameOptions) -> Result<CapturedImage, CaptureError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(CaptureError::Encode("frame has no pixels".to_string()));
    }

    let mut pixels = imageops::flip_horizontal(frame);
    if options.blur_sigma > 0.0 {
        pixels = imageops::blur(&pixels, options.blur_sigma);
    }

    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, options.jpeg_quality.clamp(1, 100));
    encoder
        .encode_image(&pixels)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;

    Ok(CapturedImage::from_jpeg(jpeg, pixels.width(), pixels.height()))
}
