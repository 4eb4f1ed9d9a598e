//! Raster collaborator.
//!
//! Thin wrapper over the `image` crate providing the four primitives the
//! pyramid builder and the viewport compositor need:
//!
//! - [`decode`]: bytes → [`PixelBuffer`]
//! - [`resize_region`]: sample a source rectangle into a buffer of a given size
//! - [`composite`]: draw one buffer onto another at an offset
//! - [`encode`]: [`PixelBuffer`] → bytes in a [`TileFormat`]

mod codec;
mod ops;

pub use codec::{
    clamp_quality, decode, decode_source, dimensions, encode, is_valid_quality, TileFormat,
    DEFAULT_QUALITY, MAX_QUALITY, MIN_QUALITY,
};
pub use ops::{blank, composite, resize_region, PixelRect, DOWNSCALE_FILTER};

/// Decoded 8-bit RGBA pixels.
pub type PixelBuffer = image::RgbaImage;
