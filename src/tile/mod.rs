//! Tile addressing and caching.
//!
//! # Components
//!
//! - [`TileAddress`]: `(zoom_level, tile_x, tile_y)` plus the `z{zoom}/y{y}_x{x}`
//!   naming convention shared by the builder and the compositor
//! - [`LevelGrid`]: dimensions and tile grid of one pyramid level
//! - [`PyramidLayout`]: all levels for a source size and tile size
//! - [`TileCache`]: single-flight memo of decoded tiles
//!
//! # Example
//!
//! ```
//! use deepzoom::tile::{PyramidLayout, TileAddress};
//!
//! let layout = PyramidLayout::new(4000, 1800, 256).unwrap();
//! assert_eq!(layout.max_zoom_level, 4);
//!
//! let level0 = layout.level(0).unwrap();
//! assert_eq!((level0.columns, level0.rows), (16, 8));
//!
//! let address = TileAddress::new(0, 3, 1);
//! assert_eq!(address.relative_path("jpg").to_str(), Some("z0/y1_x3.jpg"));
//! ```

mod address;
mod cache;

pub use address::{
    container_name, max_zoom_level, scaled_extent, LevelGrid, PyramidLayout, TileAddress,
    DEFAULT_TILE_SIZE,
};
pub use cache::{SharedTile, TileCache};
