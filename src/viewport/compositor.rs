//! Viewport compositor.
//!
//! Reconstructs a viewport from a tile set by reading only the tiles that land
//! on the output canvas.
//!
//! # Flow
//!
//! ```text
//! Viewport ──► zoom level + visible range ──► placements (on-canvas cells)
//!                                                  │
//!                     ┌────────────────────────────┘
//!                     ▼
//!           TileCache (optional) ──miss──► TileSource::read ──► decode
//!                     │
//!                     ▼
//!           composite onto the canvas owned by the render task
//! ```
//!
//! Missing tiles leave a transparent gap. Tiles that exist but don't decode
//! fail the render.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::view::{TilePlacement, Viewport};
use crate::error::{ConfigError, RenderError};
use crate::io::TileSource;
use crate::raster::{self, PixelBuffer};
use crate::tile::{SharedTile, TileAddress, TileCache, DEFAULT_TILE_SIZE};

/// Renders viewports out of a tile set.
///
/// The tile size must match the one the tile set was generated with; it is
/// not recorded in the tiles themselves.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use deepzoom::io::MemoryTileStore;
/// use deepzoom::viewport::{Viewport, ViewportCompositor};
///
/// #[tokio::main]
/// async fn main() {
///     let source = Arc::new(MemoryTileStore::new());
///     let compositor = ViewportCompositor::new(source, 256);
///
///     let viewport = Viewport::new(0.0, 0.0, 0.5, 800, 600).unwrap();
///     let canvas = compositor.render(&viewport).await.unwrap();
///
///     // Nothing was generated, so the canvas is fully transparent
///     assert_eq!(canvas.dimensions(), (800, 600));
///     assert!(canvas.pixels().all(|p| p.0[3] == 0));
/// }
/// ```
pub struct ViewportCompositor<S: ?Sized> {
    source: Arc<S>,
    tile_size: u32,
    cache: Option<Arc<TileCache>>,
    cancel: CancellationToken,
}

impl<S> ViewportCompositor<S>
where
    S: TileSource + ?Sized + 'static,
{
    /// Create a compositor reading tiles of `tile_size` from `source`.
    pub fn new(source: Arc<S>, tile_size: u32) -> Self {
        Self {
            source,
            tile_size,
            cache: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a compositor using the default tile size.
    pub fn with_default_tile_size(source: Arc<S>) -> Self {
        Self::new(source, DEFAULT_TILE_SIZE)
    }

    /// Route tile loads through a shared cache.
    pub fn with_cache(mut self, cache: Arc<TileCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Abandon renders when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn cache(&self) -> Option<&Arc<TileCache>> {
        self.cache.as_ref()
    }

    /// Render a viewport, fetching all of its tiles concurrently.
    ///
    /// Each tile is composited as soon as its fetch completes. Tiles never
    /// overlap, so the result doesn't depend on completion order.
    ///
    /// # Errors
    ///
    /// Returns the first read or decode failure. Outstanding fetches are
    /// aborted.
    pub async fn render(&self, viewport: &Viewport) -> Result<PixelBuffer, RenderError> {
        let placements = self.plan(viewport)?;
        let mut canvas = raster::blank(viewport.width(), viewport.height());

        let mut tasks = JoinSet::new();
        for placement in placements {
            let source = self.source.clone();
            let cache = self.cache.clone();
            tasks.spawn(async move {
                let tile = fetch_tile(source.as_ref(), cache.as_deref(), placement.address).await;
                (placement, tile)
            });
        }

        loop {
            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(RenderError::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };

            let Some(joined) = joined else {
                break;
            };
            let (placement, tile) = joined.map_err(|e| RenderError::Task(e.to_string()))?;
            draw(&mut canvas, placement, tile?);
        }

        Ok(canvas)
    }

    /// Render a viewport one tile at a time, ascending tile X then tile Y.
    ///
    /// # Errors
    ///
    /// Same as [`render`](Self::render).
    pub async fn render_sequential(&self, viewport: &Viewport) -> Result<PixelBuffer, RenderError> {
        let placements = self.plan(viewport)?;
        let mut canvas = raster::blank(viewport.width(), viewport.height());

        for placement in placements {
            if self.cancel.is_cancelled() {
                return Err(RenderError::Cancelled);
            }
            let tile =
                fetch_tile(self.source.as_ref(), self.cache.as_deref(), placement.address).await?;
            draw(&mut canvas, placement, tile);
        }

        Ok(canvas)
    }

    fn plan(&self, viewport: &Viewport) -> Result<Vec<TilePlacement>, RenderError> {
        if self.tile_size == 0 {
            return Err(ConfigError::InvalidTileSize(self.tile_size).into());
        }
        if self.cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }

        let range = viewport.visible_range(self.tile_size);
        let placements = viewport.placements(self.tile_size);

        debug!(
            "Rendering {}x{} viewport from {}: zoom level {}, tiles x {:?} y {:?}, {} on canvas",
            viewport.width(),
            viewport.height(),
            self.source.identifier(),
            viewport.zoom_level(),
            range.x,
            range.y,
            placements.len()
        );

        Ok(placements)
    }
}

impl<S: TileSource + ?Sized + 'static> std::fmt::Debug for ViewportCompositor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportCompositor")
            .field("source", &self.source.identifier())
            .field("tile_size", &self.tile_size)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

fn draw(canvas: &mut PixelBuffer, placement: TilePlacement, tile: Option<SharedTile>) {
    if let Some(tile) = tile {
        raster::composite(canvas, &tile, placement.x, placement.y);
    }
}

/// Get a decoded tile, through the cache when there is one.
async fn fetch_tile<S>(
    source: &S,
    cache: Option<&TileCache>,
    address: TileAddress,
) -> Result<Option<SharedTile>, RenderError>
where
    S: TileSource + ?Sized,
{
    match cache {
        Some(cache) => {
            cache
                .get_or_create(address, |address| load_tile(source, address))
                .await
        }
        None => Ok(load_tile(source, address).await?.map(Arc::new)),
    }
}

/// Read and decode one tile. `None` when the source has no such tile.
async fn load_tile<S>(source: &S, address: TileAddress) -> Result<Option<PixelBuffer>, RenderError>
where
    S: TileSource + ?Sized,
{
    let data = source
        .read(address)
        .await
        .map_err(|source| RenderError::Read { address, source })?;

    let Some(data) = data else {
        trace!("Tile {} missing, leaving a gap", address);
        return Ok(None);
    };

    let tile = tokio::task::spawn_blocking(move || raster::decode(&data))
        .await
        .map_err(|e| RenderError::Task(e.to_string()))?
        .map_err(|source| RenderError::Decode { address, source })?;

    Ok(Some(tile))
}

// =============================================================================
// Tests
// =============================================================================
