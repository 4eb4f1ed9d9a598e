//! # deepzoom
//!
//! Build multi-resolution tile pyramids from large images and composite
//! arbitrary viewports back out of them.
//!
//! A pyramid stores the source at full resolution (level 0) and at every
//! halving of it, down to the level that fits in a single tile. Each level is
//! cut into fixed-size square tiles persisted as `z{zoom}/y{y}_x{x}.{ext}`.
//! A viewport (offset, zoom factor, output size) is rendered by reading only
//! the tiles of the matching level that land on the output canvas.
//!
//! ## Features
//!
//! - **Bounded parallel generation**: tiles are sliced and encoded on the
//!   blocking pool, admitted through a counting gate
//! - **Pluggable storage**: tiles go through [`io::TileSink`] and come back
//!   through [`io::TileSource`]; filesystem and in-memory stores are included
//! - **Single-flight tile cache**: concurrent renders share decoded tiles and
//!   never load the same tile twice
//! - **Cooperative cancellation** of builds and renders
//!
//! ## Architecture
//!
//! - [`raster`] - Decode, resample, composite and encode pixel buffers
//! - [`tile`] - Tile addressing, pyramid grid math and the tile cache
//! - [`io`] - Tile sink/source traits and stores
//! - [`pyramid`] - Pyramid builder and admission gate
//! - [`viewport`] - Viewport geometry and compositor
//! - [`config`] - Library and CLI configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use deepzoom::{FsTileStore, PyramidBuilder, TilingConfig, Viewport, ViewportCompositor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TilingConfig::default();
//!     let store = Arc::new(FsTileStore::new("tiles", config.format));
//!
//!     let source = tokio::fs::read("source.jpg").await?;
//!     let summary = PyramidBuilder::new(config)
//!         .build(source.into(), store.clone())
//!         .await?;
//!     println!("{} tiles in {} levels", summary.tiles_written, summary.levels.len());
//!
//!     let compositor = ViewportCompositor::new(store, config.tile_size);
//!     let canvas = compositor
//!         .render(&Viewport::new(1024.0, 512.0, 0.5, 800, 600)?)
//!         .await?;
//!     canvas.save("view.png")?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod pyramid;
pub mod raster;
pub mod tile;
pub mod viewport;

// Re-export commonly used types
pub use config::{Cli, Command, GenerateConfig, RenderConfig, TilingConfig};
pub use error::{ConfigError, IoError, PyramidError, RasterError, RenderError};
pub use io::{FsTileStore, MemoryTileStore, TileSink, TileSource};
pub use pyramid::{AdmissionGate, GatePermit, Parallelism, PyramidBuilder, PyramidSummary};
pub use raster::{PixelBuffer, TileFormat, DEFAULT_QUALITY};
pub use tile::{LevelGrid, PyramidLayout, SharedTile, TileAddress, TileCache, DEFAULT_TILE_SIZE};
pub use viewport::{TilePlacement, TileRange, Viewport, ViewportCompositor};
