//! Tile addressing and pyramid grid math.
//!
//! # Layout
//!
//! A pyramid for a `W` x `H` source with tile size `T` has levels
//! `0..=max_zoom_level`. Level `n` has dimensions `ceil(W / 2^n)` x
//! `ceil(H / 2^n)` and is cut into a grid of `ceil(level_w / T)` x
//! `ceil(level_h / T)` tiles. Level 0 is full resolution.
//!
//! Tiles are persisted as `z{zoom}/y{tile_y}_x{tile_x}.{ext}`. This naming is
//! the only contract between the builder and the compositor, so it must stay
//! bit-exact.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::raster::PixelRect;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

// =============================================================================
// Tile Address
// =============================================================================

/// Identifies one tile of a pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileAddress {
    /// Pyramid level (0 = highest resolution)
    pub zoom_level: u32,

    /// Tile X coordinate (0-indexed from left)
    pub tile_x: u32,

    /// Tile Y coordinate (0-indexed from top)
    pub tile_y: u32,
}

impl TileAddress {
    /// Create a new tile address.
    pub fn new(zoom_level: u32, tile_x: u32, tile_y: u32) -> Self {
        Self {
            zoom_level,
            tile_x,
            tile_y,
        }
    }

    /// Name of the container (directory) holding this tile's level.
    pub fn container_name(&self) -> String {
        container_name(self.zoom_level)
    }

    /// File name without extension, e.g. `y3_x7`.
    pub fn file_stem(&self) -> String {
        format!("y{}_x{}", self.tile_y, self.tile_x)
    }

    /// File name with the given extension, e.g. `y3_x7.jpg`.
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.file_stem(), extension)
    }

    /// Path relative to the pyramid root, e.g. `z2/y3_x7.jpg`.
    pub fn relative_path(&self, extension: &str) -> PathBuf {
        PathBuf::from(self.container_name()).join(self.file_name(extension))
    }

    /// Parse an address back from a container name and a file name.
    ///
    /// The file extension, if any, is ignored. Returns `None` for names
    /// that don't follow the `z{zoom}` / `y{y}_x{x}` convention.
    pub fn parse(container: &str, file_name: &str) -> Option<Self> {
        let zoom_level = container.strip_prefix('z')?.parse().ok()?;

        let stem = file_name
            .split_once('.')
            .map_or(file_name, |(stem, _)| stem);
        let (y, x) = stem.strip_prefix('y')?.split_once("_x")?;

        Some(Self {
            zoom_level,
            tile_x: x.parse().ok()?,
            tile_y: y.parse().ok()?,
        })
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container_name(), self.file_stem())
    }
}

/// Name of the container (directory) for a zoom level, e.g. `z2`.
pub fn container_name(zoom_level: u32) -> String {
    format!("z{}", zoom_level)
}

// =============================================================================
// Level Grid
// =============================================================================

/// Dimensions and tile grid of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelGrid {
    /// Zoom level (0 = full resolution)
    pub zoom_level: u32,

    /// Level width in pixels
    pub width: u32,

    /// Level height in pixels
    pub height: u32,

    /// Number of tile columns
    pub columns: u32,

    /// Number of tile rows
    pub rows: u32,

    /// Tile edge length in pixels
    pub tile_size: u32,
}

impl LevelGrid {
    /// Downscale factor of this level relative to the source (`2^zoom_level`).
    pub fn factor(&self) -> u64 {
        1u64 << self.zoom_level
    }

    /// Total number of tiles in this level.
    pub fn tile_count(&self) -> u64 {
        u64::from(self.columns) * u64::from(self.rows)
    }

    /// Whether the tile coordinates fall inside this level's grid.
    pub fn contains(&self, tile_x: u32, tile_y: u32) -> bool {
        tile_x < self.columns && tile_y < self.rows
    }

    /// Pixel dimensions of a tile at this level.
    ///
    /// Interior tiles are `tile_size` square; tiles in the last column or row
    /// are cut to the remaining level extent.
    pub fn tile_dimensions(&self, tile_x: u32, tile_y: u32) -> Option<(u32, u32)> {
        if !self.contains(tile_x, tile_y) {
            return None;
        }

        let width = remaining(self.width, tile_x, self.tile_size);
        let height = remaining(self.height, tile_y, self.tile_size);
        Some((width, height))
    }

    /// Rectangle of the full-resolution source covered by a tile.
    ///
    /// The origin is `tile * tile_size * factor`, the extent is
    /// `tile_size * factor` cut to what remains of the source.
    pub fn source_rect(
        &self,
        tile_x: u32,
        tile_y: u32,
        source_width: u32,
        source_height: u32,
    ) -> Option<PixelRect> {
        if !self.contains(tile_x, tile_y) {
            return None;
        }

        let span = u64::from(self.tile_size) * self.factor();
        let x = u64::from(tile_x) * span;
        let y = u64::from(tile_y) * span;

        let width = span.min(u64::from(source_width).checked_sub(x)?);
        let height = span.min(u64::from(source_height).checked_sub(y)?);

        Some(PixelRect::new(
            u32::try_from(x).ok()?,
            u32::try_from(y).ok()?,
            u32::try_from(width).ok()?,
            u32::try_from(height).ok()?,
        ))
    }

    /// All addresses in this level, ascending tile X then tile Y.
    pub fn addresses(&self) -> impl Iterator<Item = TileAddress> + '_ {
        (0..self.columns).flat_map(move |tile_x| {
            (0..self.rows).map(move |tile_y| TileAddress::new(self.zoom_level, tile_x, tile_y))
        })
    }
}

fn remaining(extent: u32, index: u32, tile_size: u32) -> u32 {
    let start = u64::from(index) * u64::from(tile_size);
    let left = u64::from(extent).saturating_sub(start);
    left.min(u64::from(tile_size)) as u32
}

// =============================================================================
// Pyramid Layout
// =============================================================================

/// Full level structure of a pyramid for a given source size and tile size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidLayout {
    /// Source width in pixels
    pub width: u32,

    /// Source height in pixels
    pub height: u32,

    /// Tile edge length in pixels
    pub tile_size: u32,

    /// Highest zoom level (inclusive)
    pub max_zoom_level: u32,
}

impl PyramidLayout {
    /// Compute the layout for a source image.
    ///
    /// # Errors
    ///
    /// Rejects a zero tile size or zero source dimensions.
    pub fn new(width: u32, height: u32, tile_size: u32) -> Result<Self, ConfigError> {
        if tile_size == 0 {
            return Err(ConfigError::InvalidTileSize(tile_size));
        }
        if width == 0 || height == 0 {
            return Err(ConfigError::InvalidDimensions { width, height });
        }

        Ok(Self {
            width,
            height,
            tile_size,
            max_zoom_level: max_zoom_level(width, height, tile_size),
        })
    }

    /// Number of levels (`max_zoom_level + 1`).
    pub fn level_count(&self) -> u32 {
        self.max_zoom_level + 1
    }

    /// Grid of one level, or `None` past the max zoom level.
    pub fn level(&self, zoom_level: u32) -> Option<LevelGrid> {
        if zoom_level > self.max_zoom_level {
            return None;
        }

        let width = scaled_extent(self.width, zoom_level);
        let height = scaled_extent(self.height, zoom_level);

        Some(LevelGrid {
            zoom_level,
            width,
            height,
            columns: width.div_ceil(self.tile_size),
            rows: height.div_ceil(self.tile_size),
            tile_size: self.tile_size,
        })
    }

    /// All level grids, level 0 first.
    pub fn levels(&self) -> Vec<LevelGrid> {
        (0..=self.max_zoom_level)
            .filter_map(|zoom| self.level(zoom))
            .collect()
    }

    /// Total number of tiles over all levels.
    pub fn total_tiles(&self) -> u64 {
        self.levels().iter().map(LevelGrid::tile_count).sum()
    }
}

/// Highest zoom level for a source: the smallest `n` such that
/// `max(width, height) / 2^n <= tile_size`.
///
/// Equals `ceil(log2(max(width, height) / tile_size))`, clamped at 0 for
/// sources that already fit in one tile.
pub fn max_zoom_level(width: u32, height: u32, tile_size: u32) -> u32 {
    let longest = u64::from(width.max(height));
    let tile_size = u64::from(tile_size.max(1));

    let mut level = 0;
    while longest > tile_size << level {
        level += 1;
    }
    level
}

/// Level extent: `ceil(extent / 2^zoom_level)`.
pub fn scaled_extent(extent: u32, zoom_level: u32) -> u32 {
    if zoom_level >= 32 {
        return u32::from(extent > 0);
    }
    let factor = 1u64 << zoom_level;
    u64::from(extent).div_ceil(factor) as u32
}

// =============================================================================
// Tests
// =============================================================================
