//! Crop box geometry and PNG encoding.
//!
//! # Design Decisions
//!
//! - **Clamp, don't reject**: A box that extends past the source is clamped to
//!   the source bounds. Only a box with no pixels inside the source is an
//!   error.
//!
//! - **Lossless output**: Crops are always encoded as PNG, so repeated
//!   requests for the same box produce the same pixels.
//!
//! - **Sources are read-only**: Cropping copies out of the shared decoded
//!   source and never mutates it.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};

use crate::error::CropError;

// =============================================================================
// Crop Box
// =============================================================================

/// A requested crop rectangle in source pixel coordinates.
///
/// Edges are half-open: the box covers `left..right` horizontally and
/// `top..bottom` vertically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CropBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl CropBox {
    /// Create a new crop box.
    pub fn new(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Check that the box is well ordered (`left < right` and `top < bottom`).
    pub fn validate(&self) -> Result<(), CropError> {
        if self.left >= self.right {
            return Err(CropError::invalid(format!(
                "left ({}) must be less than right ({})",
                self.left, self.right
            )));
        }
        if self.top >= self.bottom {
            return Err(CropError::invalid(format!(
                "top ({}) must be less than bottom ({})",
                self.top, self.bottom
            )));
        }
        Ok(())
    }

    /// Intersect the box with a `width x height` source.
    ///
    /// Returns `(x, y, w, h)` of the intersection, or `None` if it is empty.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.left.clamp(0, width as i64);
        let y0 = self.top.clamp(0, height as i64);
        let x1 = self.right.clamp(0, width as i64);
        let y1 = self.bottom.clamp(0, height as i64);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode fetched source bytes, guessing the format from the content.
pub fn decode_source(bytes: &[u8]) -> Result<DynamicImage, CropError> {
    if bytes.is_empty() {
        return Err(CropError::Decode {
            message: "empty response body".to_string(),
        });
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CropError::Decode {
            message: e.to_string(),
        })?;

    if reader.format().is_none() {
        return Err(CropError::Decode {
            message: "unrecognized image format".to_string(),
        });
    }

    reader.decode().map_err(|e| CropError::Decode {
        message: e.to_string(),
    })
}

// =============================================================================
// PNG Encoder
// =============================================================================

/// Crops decoded sources and encodes the result as PNG.
///
/// # Example
///
/// ```
/// use roi_streamer::roi::{CropBox, PngRoiEncoder};
/// use image::{DynamicImage, RgbImage};
///
/// let source = DynamicImage::ImageRgb8(RgbImage::new(120, 120));
/// let encoder = PngRoiEncoder::new();
///
/// let png = encoder.crop_and_encode(&source, &CropBox::new(10, 10, 100, 100)).unwrap();
/// assert_eq!(encoder.dimensions(&png).unwrap(), (90, 90));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PngRoiEncoder {}

impl PngRoiEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self {}
    }

    /// Crop `source` to `crop` (clamped to the source bounds) and encode as PNG.
    ///
    /// # Errors
    ///
    /// - [`CropError::InvalidRequest`] if the box does not overlap the source
    /// - [`CropError::Unexpected`] if PNG encoding fails
    pub fn crop_and_encode(&self, source: &DynamicImage, crop: &CropBox) -> Result<Bytes, CropError> {
        let (x, y, w, h) = crop.clamp_to(source.width(), source.height()).ok_or_else(|| {
            CropError::invalid(format!(
                "crop box ({}, {}, {}, {}) lies outside the {}x{} source",
                crop.left,
                crop.top,
                crop.right,
                crop.bottom,
                source.width(),
                source.height()
            ))
        })?;

        let cropped = source.crop_imm(x, y, w, h);
        self.encode(&cropped)
    }

    /// Encode an image as PNG.
    pub fn encode(&self, image: &DynamicImage) -> Result<Bytes, CropError> {
        let mut output = Vec::new();
        image
            .write_with_encoder(PngEncoder::new(&mut output))
            .map_err(|e| CropError::Unexpected(format!("PNG encoding failed: {}", e)))?;

        Ok(Bytes::from(output))
    }

    /// Get PNG dimensions without fully decoding.
    pub fn dimensions(&self, png: &[u8]) -> Result<(u32, u32), CropError> {
        ImageReader::with_format(Cursor::new(png), ImageFormat::Png)
            .into_dimensions()
            .map_err(|e| CropError::Decode {
                message: e.to_string(),
            })
    }
}

// =============================================================================
// Tests
// =============================================================================
