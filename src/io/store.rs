use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;
use crate::tile::TileAddress;

/// Write side of tile storage.
///
/// The pyramid builder hands every encoded tile to a sink under its address.
/// Implementations decide where the bytes go (disk, memory, network) and
/// must be thread-safe, since tiles are written from concurrent tasks.
#[async_trait]
pub trait TileSink: Send + Sync {
    /// Create whatever container holds one zoom level's tiles.
    ///
    /// The builder calls this exactly once per level, and always before the
    /// first write to that level.
    async fn create_container(&self, zoom_level: u32) -> Result<(), IoError>;

    /// Persist one tile's encoded bytes.
    ///
    /// The write is complete once the returned future resolves.
    async fn write(&self, address: TileAddress, data: Bytes) -> Result<(), IoError>;
}

/// Read side of tile storage.
///
/// The compositor asks a source for each visible tile. A tile that was never
/// written is `Ok(None)`, not an error.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Read one tile's encoded bytes, or `None` if the tile doesn't exist.
    async fn read(&self, address: TileAddress) -> Result<Option<Bytes>, IoError>;

    /// Get a unique identifier for this tile set (for logging).
    fn identifier(&self) -> &str;
}
