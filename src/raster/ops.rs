//! Pixel operations: region resampling and compositing.

use image::imageops::{self, FilterType};

use super::PixelBuffer;
use crate::error::RasterError;

/// Resampling filter used when downscaling source regions into tiles.
pub const DOWNSCALE_FILTER: FilterType = FilterType::Triangle;

/// A rectangle in pixel coordinates of some buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Create a fully transparent buffer.
pub fn blank(width: u32, height: u32) -> PixelBuffer {
    PixelBuffer::new(width, height)
}

/// Sample `region` of `source` into a new `width` x `height` buffer.
///
/// When the region already has the requested size the pixels are copied
/// verbatim, so full-resolution tiles are never resampled.
///
/// # Errors
///
/// Returns [`RasterError::InvalidRegion`] if the region is empty or reaches
/// outside the source buffer.
pub fn resize_region(
    source: &PixelBuffer,
    region: PixelRect,
    width: u32,
    height: u32,
) -> Result<PixelBuffer, RasterError> {
    let in_bounds = region.width > 0
        && region.height > 0
        && width > 0
        && height > 0
        && u64::from(region.x) + u64::from(region.width) <= u64::from(source.width())
        && u64::from(region.y) + u64::from(region.height) <= u64::from(source.height());

    if !in_bounds {
        return Err(RasterError::InvalidRegion {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
            source_width: source.width(),
            source_height: source.height(),
        });
    }

    let cropped =
        imageops::crop_imm(source, region.x, region.y, region.width, region.height).to_image();

    if region.width == width && region.height == height {
        return Ok(cropped);
    }

    Ok(imageops::resize(&cropped, width, height, DOWNSCALE_FILTER))
}

/// Draw `source` onto `canvas` with its top-left corner at (`x`, `y`).
///
/// Coordinates may be negative or reach past the canvas; the drawn area is
/// clipped to the canvas. Alpha is blended source-over.
pub fn composite(canvas: &mut PixelBuffer, source: &PixelBuffer, x: i64, y: i64) {
    imageops::overlay(canvas, source, x, y);
}
