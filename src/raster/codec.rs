//! Tile codec.
//!
//! This module handles decoding tile and source bytes into RGBA pixel
//! buffers and encoding pixel buffers back into a tile format.
//!
//! # Design Decisions
//!
//! - **RGBA everywhere**: All decoded images are normalized to 8-bit RGBA so
//!   tiles from different formats composite onto the same canvas.
//!
//! - **JPEG drops alpha**: JPEG has no alpha channel, so buffers are flattened
//!   to RGB before encoding. PNG keeps the alpha channel and is lossless.
//!
//! - **Deterministic output**: The same buffer, format and quality always
//!   produce the same bytes.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader};
use serde::{Deserialize, Serialize};

use super::PixelBuffer;
use crate::error::RasterError;

/// Default encode quality (1-100).
pub const DEFAULT_QUALITY: u8 = 90;

/// Minimum allowed encode quality.
pub const MIN_QUALITY: u8 = 1;

/// Maximum allowed encode quality.
pub const MAX_QUALITY: u8 = 100;

// =============================================================================
// Tile Format
// =============================================================================

/// Encoded format of persisted tiles.
///
/// The format determines the file extension in the persisted layout, so the
/// builder and the compositor must agree on it just as they agree on the
/// tile size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    /// Lossy JPEG; quality applies
    #[default]
    Jpeg,
    /// Lossless PNG; quality is ignored
    Png,
}

impl TileFormat {
    /// File extension used in the persisted layout (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Jpeg => "jpg",
            TileFormat::Png => "png",
        }
    }

    /// Parse a format from a name or extension (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(TileFormat::Jpeg),
            "png" => Some(TileFormat::Png),
            _ => None,
        }
    }
}

impl std::fmt::Display for TileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

// =============================================================================
// Decode / Encode
// =============================================================================

/// Decode image bytes of any supported format into an RGBA buffer.
///
/// The `image` crate's default allocation limits apply, which is plenty for
/// tiles. Use [`decode_source`] for full-resolution source images.
///
/// # Errors
///
/// Returns [`RasterError::Decode`] if the format cannot be detected or the
/// data is corrupt. Corrupt data is never substituted with a blank buffer.
pub fn decode(data: &[u8]) -> Result<PixelBuffer, RasterError> {
    read_image(data, false)
}

/// Decode a source image without allocation limits.
///
/// Source images routinely exceed the default 512 MiB cap; the only bound is
/// the memory available to the process.
///
/// # Errors
///
/// Same as [`decode`].
pub fn decode_source(data: &[u8]) -> Result<PixelBuffer, RasterError> {
    read_image(data, true)
}

fn read_image(data: &[u8], unbounded: bool) -> Result<PixelBuffer, RasterError> {
    let mut reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| RasterError::Decode {
            message: e.to_string(),
        })?;
    if unbounded {
        reader.no_limits();
    }

    let img = reader.decode().map_err(|e| RasterError::Decode {
        message: e.to_string(),
    })?;

    Ok(img.into_rgba8())
}

/// Encode a buffer in the given format.
///
/// Quality is clamped to 1-100 and only affects JPEG.
pub fn encode(buffer: &PixelBuffer, format: TileFormat, quality: u8) -> Result<Bytes, RasterError> {
    let mut output = Vec::new();

    match format {
        TileFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(buffer.clone()).into_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut output, clamp_quality(quality));
            encoder
                .encode_image(&rgb)
                .map_err(|e| RasterError::Encode {
                    message: e.to_string(),
                })?;
        }
        TileFormat::Png => {
            PngEncoder::new(&mut output)
                .write_image(
                    buffer.as_raw(),
                    buffer.width(),
                    buffer.height(),
                    ExtendedColorType::Rgba8,
                )
                .map_err(|e| RasterError::Encode {
                    message: e.to_string(),
                })?;
        }
    }

    Ok(Bytes::from(output))
}

/// Get encoded image dimensions without fully decoding.
pub fn dimensions(data: &[u8]) -> Result<(u32, u32), RasterError> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| RasterError::Decode {
            message: e.to_string(),
        })?
        .into_dimensions()
        .map_err(|e| RasterError::Decode {
            message: e.to_string(),
        })
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_QUALITY..=MAX_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
