//! Viewport geometry: zoom level selection, visible tile range and canvas
//! placement of tiles.

use std::ops::Range;

use crate::error::ConfigError;
use crate::tile::TileAddress;

/// A rectangular view onto the full-resolution image at some zoom factor.
///
/// Offsets are in full-resolution pixels. A zoom factor of 1.0 shows level 0,
/// 0.5 shows level 1, 0.25 shows level 2, and so on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    offset_x: f64,
    offset_y: f64,
    zoom_factor: f64,
    width: u32,
    height: u32,
}

impl Viewport {
    /// Create a validated viewport.
    ///
    /// # Errors
    ///
    /// Rejects non-finite offsets, a zoom factor outside `(0, 1]` and an
    /// empty output size.
    pub fn new(
        offset_x: f64,
        offset_y: f64,
        zoom_factor: f64,
        width: u32,
        height: u32,
    ) -> Result<Self, ConfigError> {
        if !offset_x.is_finite() || !offset_y.is_finite() {
            return Err(ConfigError::InvalidOffset {
                x: offset_x,
                y: offset_y,
            });
        }
        if !zoom_factor.is_finite() || zoom_factor <= 0.0 || zoom_factor > 1.0 {
            return Err(ConfigError::InvalidZoomFactor(zoom_factor));
        }
        if width == 0 || height == 0 {
            return Err(ConfigError::InvalidOutputSize { width, height });
        }

        Ok(Self {
            offset_x,
            offset_y,
            zoom_factor,
            width,
            height,
        })
    }

    /// Horizontal offset in full-resolution pixels.
    pub fn offset_x(&self) -> f64 {
        self.offset_x
    }

    /// Vertical offset in full-resolution pixels.
    pub fn offset_y(&self) -> f64 {
        self.offset_y
    }

    /// Zoom factor in `(0, 1]`.
    pub fn zoom_factor(&self) -> f64 {
        self.zoom_factor
    }

    /// Output width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Output height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pyramid level to read: `round(log2(1 / zoom_factor))`.
    ///
    /// Zoom factors between powers of two snap to the nearest level, so 0.3
    /// reads level 2 and 0.4 reads level 1.
    pub fn zoom_level(&self) -> u32 {
        let level = (1.0 / self.zoom_factor).log2().round();
        // Float to int casts saturate
        level.max(0.0) as u32
    }

    /// On-canvas size of one source tile: `tile_size * zoom_factor`.
    pub fn tile_size_at_zoom(&self, tile_size: u32) -> f64 {
        f64::from(tile_size) * self.zoom_factor
    }

    /// Tile range covering this viewport, in level-local tile coordinates.
    ///
    /// Per axis, `start = floor(offset * zf / T)` clamped at 0 and
    /// `end = ceil((offset * zf + output / zf) / T)`, exclusive.
    pub fn visible_range(&self, tile_size: u32) -> TileRange {
        TileRange {
            x: self.axis_range(self.offset_x, self.width, tile_size),
            y: self.axis_range(self.offset_y, self.height, tile_size),
        }
    }

    fn axis_range(&self, offset: f64, output: u32, tile_size: u32) -> Range<u32> {
        let tile_size = f64::from(tile_size);
        let local_offset = offset * self.zoom_factor;
        let extent = f64::from(output) / self.zoom_factor;

        let start = tile_index((local_offset / tile_size).floor());
        let end = tile_index(((local_offset + extent) / tile_size).ceil());
        start..end.max(start)
    }

    /// Tiles to composite and where, ascending tile X then tile Y.
    ///
    /// Each level-local cell maps to a `tile_size` square on the canvas at
    /// `tile_x * tile_size - round(offset * zoom_factor)`. The shift is rounded
    /// once per axis so neighbouring tiles sit exactly `tile_size` apart.
    /// Cells of the visible range that don't intersect the canvas are left
    /// out, so they're never fetched.
    pub fn placements(&self, tile_size: u32) -> Vec<TilePlacement> {
        let zoom_level = self.zoom_level();
        let range = self.visible_range(tile_size);

        let origin_x = self.offset_x * self.zoom_factor;
        let origin_y = self.offset_y * self.zoom_factor;
        let cell = i64::from(tile_size);
        let shift_x = pixel_shift(origin_x);
        let shift_y = pixel_shift(origin_y);

        // No cell past the canvas edge can intersect it
        let last_x = tile_index(((origin_x + f64::from(self.width)) / f64::from(tile_size)).ceil());
        let last_y = tile_index(((origin_y + f64::from(self.height)) / f64::from(tile_size)).ceil());
        let columns = range.x.start..range.x.end.min(last_x.saturating_add(1));
        let rows = range.y.start..range.y.end.min(last_y.saturating_add(1));

        let mut placements = Vec::new();
        for tile_x in columns {
            let x = canvas_position(tile_x, tile_size, shift_x);
            if !overlaps(x, cell, self.width) {
                continue;
            }

            for tile_y in rows.clone() {
                let y = canvas_position(tile_y, tile_size, shift_y);
                if !overlaps(y, cell, self.height) {
                    continue;
                }

                placements.push(TilePlacement {
                    address: TileAddress::new(zoom_level, tile_x, tile_y),
                    x,
                    y,
                });
            }
        }

        placements
    }
}

/// Visible tile range of a viewport, end-exclusive on both axes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRange {
    pub x: Range<u32>,
    pub y: Range<u32>,
}

impl TileRange {
    /// Number of cells in the range.
    pub fn len(&self) -> u64 {
        self.x.len() as u64 * self.y.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty()
    }
}

/// A tile and the canvas position of its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePlacement {
    pub address: TileAddress,
    pub x: i64,
    pub y: i64,
}

fn tile_index(value: f64) -> u32 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, f64::from(u32::MAX)) as u32
}

fn pixel_shift(origin: f64) -> i64 {
    // Float to int casts saturate
    origin.round() as i64
}

fn canvas_position(tile: u32, tile_size: u32, shift: i64) -> i64 {
    i64::from(tile) * i64::from(tile_size) - shift
}

fn overlaps(position: i64, size: i64, extent: u32) -> bool {
    position < i64::from(extent) && position + size > 0
}
