//! Pyramid builder.
//!
//! Walks zoom levels from full resolution down to the level that fits in a
//! single tile, slices every level into tiles, encodes them and hands them to
//! a [`TileSink`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       PyramidBuilder                         │
//! │                                                              │
//! │  decode source ──► PyramidLayout ──► for each level:         │
//! │                                       create_container(z)    │
//! │                                       for each tile:         │
//! │                                         acquire gate permit  │
//! │                                         crop + downscale     │
//! │                                         encode               │
//! │                                         sink.write           │
//! │                                         release permit       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Slicing and encoding are CPU-bound and run on the blocking pool. The sink
//! write is part of the throttled unit of work, so the permit is held until
//! the sink has accepted the bytes.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::gate::{AdmissionGate, Parallelism};
use crate::config::TilingConfig;
use crate::error::{PyramidError, RasterError};
use crate::io::TileSink;
use crate::raster::{self, PixelBuffer, TileFormat};
use crate::tile::{LevelGrid, PyramidLayout, TileAddress};

// =============================================================================
// Build Summary
// =============================================================================

/// Outcome of a successful pyramid build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyramidSummary {
    /// Source width in pixels
    pub width: u32,

    /// Source height in pixels
    pub height: u32,

    /// Tile edge length in pixels
    pub tile_size: u32,

    /// Encoded tile format
    pub format: TileFormat,

    /// Encode quality used
    pub quality: u8,

    /// Highest zoom level (inclusive)
    pub max_zoom_level: u32,

    /// Grid of every level, level 0 first
    pub levels: Vec<LevelGrid>,

    /// Number of tiles handed to the sink
    pub tiles_written: u64,
}

// =============================================================================
// Pyramid Builder
// =============================================================================

/// Builds a tile pyramid from one source image.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use deepzoom::config::TilingConfig;
/// use deepzoom::io::MemoryTileStore;
/// use deepzoom::pyramid::{Parallelism, PyramidBuilder};
/// use deepzoom::raster::{PixelBuffer, TileFormat};
///
/// #[tokio::main]
/// async fn main() {
///     let config = TilingConfig::default().with_format(TileFormat::Png);
///     let builder = PyramidBuilder::new(config).with_parallelism(Parallelism::Bounded(4));
///
///     let sink = Arc::new(MemoryTileStore::new());
///     let summary = builder
///         .build_image(PixelBuffer::new(600, 300), sink.clone())
///         .await
///         .unwrap();
///
///     assert_eq!(summary.max_zoom_level, 2);
///     assert_eq!(summary.tiles_written, 9);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct PyramidBuilder {
    config: TilingConfig,
    parallelism: Parallelism,
    cancel: CancellationToken,
}

impl PyramidBuilder {
    /// Create a builder bounded by the number of available CPUs.
    pub fn new(config: TilingConfig) -> Self {
        Self {
            config,
            parallelism: Parallelism::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Set how many tiles may be produced at once.
    pub fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Stop the build when `token` is cancelled.
    ///
    /// Tiles waiting for a permit are abandoned; tiles already being produced
    /// finish their write.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Tiling configuration of this builder.
    pub fn config(&self) -> &TilingConfig {
        &self.config
    }

    /// Parallelism of this builder.
    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    /// Decode `source` and build its pyramid into `sink`.
    ///
    /// # Errors
    ///
    /// Fails with [`PyramidError::Decode`] before anything reaches the sink if
    /// the source can't be decoded. See [`build_image`](Self::build_image) for
    /// failures during tile production.
    pub async fn build<S>(&self, source: Bytes, sink: Arc<S>) -> Result<PyramidSummary, PyramidError>
    where
        S: TileSink + 'static,
    {
        self.config.validate()?;

        let image = tokio::task::spawn_blocking(move || raster::decode_source(&source))
            .await
            .map_err(|e| PyramidError::Task(e.to_string()))?
            .map_err(PyramidError::Decode)?;

        self.build_image(image, sink).await
    }

    /// Build the pyramid of an already decoded image into `sink`.
    ///
    /// The image is shared read-only between tile tasks and dropped when the
    /// build finishes.
    ///
    /// # Errors
    ///
    /// Configuration errors are returned before any work. The first tile
    /// failure (slicing, encoding or sink write) is returned after in-flight
    /// tiles finish; tiles written before the failure stay in the sink.
    pub async fn build_image<S>(
        &self,
        image: PixelBuffer,
        sink: Arc<S>,
    ) -> Result<PyramidSummary, PyramidError>
    where
        S: TileSink + 'static,
    {
        self.config.validate()?;
        let layout = PyramidLayout::new(image.width(), image.height(), self.config.tile_size)?;

        info!(
            "Building pyramid: {}x{} source, tile size {}, {} levels, {} tiles, parallelism {}",
            layout.width,
            layout.height,
            layout.tile_size,
            layout.level_count(),
            layout.total_tiles(),
            self.parallelism
        );

        let image = Arc::new(image);
        let result = match self.parallelism {
            Parallelism::Sequential => self.build_sequential(&layout, image, sink).await,
            _ => self.build_parallel(&layout, image, sink).await,
        };

        match result {
            Ok(tiles_written) => {
                info!("Pyramid complete: {} tiles written", tiles_written);
                Ok(PyramidSummary {
                    width: layout.width,
                    height: layout.height,
                    tile_size: layout.tile_size,
                    format: self.config.format,
                    quality: self.config.quality,
                    max_zoom_level: layout.max_zoom_level,
                    levels: layout.levels(),
                    tiles_written,
                })
            }
            Err(e) => {
                warn!("Pyramid build failed: {}", e);
                Err(e)
            }
        }
    }

    /// One tile at a time: ascending zoom level, then tile X, then tile Y.
    async fn build_sequential<S>(
        &self,
        layout: &PyramidLayout,
        image: Arc<PixelBuffer>,
        sink: Arc<S>,
    ) -> Result<u64, PyramidError>
    where
        S: TileSink + 'static,
    {
        let mut written = 0;

        for level in layout.levels() {
            create_container(sink.as_ref(), &level).await?;

            for address in level.addresses() {
                if self.cancel.is_cancelled() {
                    return Err(PyramidError::Cancelled);
                }
                produce_tile(&image, &level, address, &self.config, sink.as_ref()).await?;
                written += 1;
            }
        }

        Ok(written)
    }

    /// Every tile as its own task, admitted through the gate.
    async fn build_parallel<S>(
        &self,
        layout: &PyramidLayout,
        image: Arc<PixelBuffer>,
        sink: Arc<S>,
    ) -> Result<u64, PyramidError>
    where
        S: TileSink + 'static,
    {
        let gate = AdmissionGate::for_parallelism(self.parallelism);
        // Child token so a tile failure stops queued work without cancelling
        // the caller's token.
        let cancel = self.cancel.child_token();

        let mut tasks = JoinSet::new();
        let mut first_error = None;

        for level in layout.levels() {
            if cancel.is_cancelled() {
                first_error = Some(PyramidError::Cancelled);
                break;
            }

            if let Err(e) = create_container(sink.as_ref(), &level).await {
                first_error = Some(e);
                cancel.cancel();
                break;
            }

            for address in level.addresses() {
                let image = image.clone();
                let sink = sink.clone();
                let gate = gate.clone();
                let cancel = cancel.clone();
                let config = self.config;

                tasks.spawn(async move {
                    let _permit = gate
                        .acquire(&cancel)
                        .await
                        .map_err(|_| PyramidError::Cancelled)?;
                    produce_tile(&image, &level, address, &config, sink.as_ref()).await
                });
            }
        }

        let mut written = 0;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| PyramidError::Task(e.to_string()));
            match outcome.and_then(|result| result) {
                Ok(()) => written += 1,
                Err(e) => {
                    if first_error.is_none() {
                        cancel.cancel();
                        first_error = Some(e);
                    }
                }
            }
        }

        debug!(
            "Peak tiles in flight: {} (limit {:?})",
            gate.peak_in_flight(),
            gate.limit()
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }
}

async fn create_container<S>(sink: &S, level: &LevelGrid) -> Result<(), PyramidError>
where
    S: TileSink + ?Sized,
{
    debug!(
        "Level {}: {}x{} px, {}x{} tiles",
        level.zoom_level, level.width, level.height, level.columns, level.rows
    );

    sink.create_container(level.zoom_level)
        .await
        .map_err(|source| PyramidError::SinkContainer {
            zoom_level: level.zoom_level,
            source,
        })
}

/// Slice, encode and write one tile.
async fn produce_tile<S>(
    image: &Arc<PixelBuffer>,
    level: &LevelGrid,
    address: TileAddress,
    config: &TilingConfig,
    sink: &S,
) -> Result<(), PyramidError>
where
    S: TileSink + ?Sized,
{
    let data = {
        let image = image.clone();
        let level = *level;
        let config = *config;
        tokio::task::spawn_blocking(move || encode_tile(&image, &level, address, &config))
            .await
            .map_err(|e| PyramidError::Task(e.to_string()))?
            .map_err(|source| PyramidError::Produce { address, source })?
    };

    sink.write(address, data)
        .await
        .map_err(|source| PyramidError::SinkWrite { address, source })
}

/// Crop the tile's source rectangle, downscale it to the tile's level size
/// and encode it.
pub(crate) fn encode_tile(
    image: &PixelBuffer,
    level: &LevelGrid,
    address: TileAddress,
    config: &TilingConfig,
) -> Result<Bytes, RasterError> {
    let rect = level.source_rect(address.tile_x, address.tile_y, image.width(), image.height());
    let size = level.tile_dimensions(address.tile_x, address.tile_y);

    let (Some(rect), Some((width, height))) = (rect, size) else {
        return Err(RasterError::InvalidRegion {
            x: address.tile_x.saturating_mul(level.tile_size),
            y: address.tile_y.saturating_mul(level.tile_size),
            width: level.tile_size,
            height: level.tile_size,
            source_width: image.width(),
            source_height: image.height(),
        });
    };

    let tile = raster::resize_region(image, rect, width, height)?;
    raster::encode(&tile, config.format, config.quality)
}

// =============================================================================
// Tests
// =============================================================================
