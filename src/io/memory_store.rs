use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{TileSink, TileSource};
use crate::error::IoError;
use crate::tile::TileAddress;

/// In-memory tile store.
///
/// Useful for short-lived pipelines and for tests. Like a filesystem, it
/// refuses writes to a zoom level whose container was never created.
#[derive(Debug, Default)]
pub struct MemoryTileStore {
    tiles: RwLock<BTreeMap<TileAddress, Bytes>>,
    containers: RwLock<BTreeSet<u32>>,
    container_requests: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryTileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tile directly, creating its container if needed.
    pub async fn insert(&self, address: TileAddress, data: Bytes) {
        self.containers.write().await.insert(address.zoom_level);
        self.tiles.write().await.insert(address, data);
    }

    /// Get a tile's bytes without counting a read.
    pub async fn get(&self, address: &TileAddress) -> Option<Bytes> {
        self.tiles.read().await.get(address).cloned()
    }

    /// Copy of every stored tile, ordered by address.
    pub async fn snapshot(&self) -> BTreeMap<TileAddress, Bytes> {
        self.tiles.read().await.clone()
    }

    /// All stored addresses, ordered.
    pub async fn addresses(&self) -> Vec<TileAddress> {
        self.tiles.read().await.keys().copied().collect()
    }

    /// Number of stored tiles.
    pub async fn len(&self) -> usize {
        self.tiles.read().await.len()
    }

    /// Check if the store holds no tiles.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether a container exists for the zoom level.
    pub async fn has_container(&self, zoom_level: u32) -> bool {
        self.containers.read().await.contains(&zoom_level)
    }

    /// Number of `create_container` calls received.
    pub fn container_requests(&self) -> usize {
        self.container_requests.load(Ordering::SeqCst)
    }

    /// Number of `read` calls received.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of successful `write` calls received.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileSink for MemoryTileStore {
    async fn create_container(&self, zoom_level: u32) -> Result<(), IoError> {
        self.container_requests.fetch_add(1, Ordering::SeqCst);
        self.containers.write().await.insert(zoom_level);
        Ok(())
    }

    async fn write(&self, address: TileAddress, data: Bytes) -> Result<(), IoError> {
        if !self.has_container(address.zoom_level).await {
            return Err(IoError::MissingContainer(address.zoom_level));
        }

        self.tiles.write().await.insert(address, data);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TileSource for MemoryTileStore {
    async fn read(&self, address: TileAddress) -> Result<Option<Bytes>, IoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(&address).await)
    }

    fn identifier(&self) -> &str {
        "memory://"
    }
}
