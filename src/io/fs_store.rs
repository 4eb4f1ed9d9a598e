use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use super::{TileSink, TileSource};
use crate::error::IoError;
use crate::raster::TileFormat;
use crate::tile::{container_name, TileAddress};

/// Filesystem-backed tile store.
///
/// Tiles live under a root directory as `z{zoom}/y{tile_y}_x{tile_x}.{ext}`,
/// where the extension comes from the configured [`TileFormat`]. The same
/// store type serves as the builder's sink and the compositor's source.
#[derive(Debug, Clone)]
pub struct FsTileStore {
    root: PathBuf,
    format: TileFormat,
    identifier: String,
}

impl FsTileStore {
    /// Create a store rooted at `root` for tiles of the given format.
    ///
    /// The root directory is created lazily by the first
    /// [`create_container`](TileSink::create_container) call.
    pub fn new(root: impl Into<PathBuf>, format: TileFormat) -> Self {
        let root = root.into();
        let identifier = format!("file://{}", root.display());
        Self {
            root,
            format,
            identifier,
        }
    }

    /// Root directory of the pyramid.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tile format (and therefore file extension) of this store.
    pub fn format(&self) -> TileFormat {
        self.format
    }

    /// Full path of a tile file.
    pub fn tile_path(&self, address: &TileAddress) -> PathBuf {
        self.root.join(address.relative_path(self.format.extension()))
    }

    /// List every tile present on disk, sorted by address.
    ///
    /// Entries that don't follow the naming convention or have another
    /// extension are skipped. A missing root yields an empty list.
    pub async fn list(&self) -> Result<Vec<TileAddress>, IoError> {
        let mut addresses = Vec::new();

        let mut levels = match tokio::fs::read_dir(&self.root).await {
            Ok(levels) => levels,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(addresses),
            Err(e) => return Err(e.into()),
        };

        while let Some(level) = levels.next_entry().await? {
            if !level.file_type().await?.is_dir() {
                continue;
            }
            let container = level.file_name().to_string_lossy().into_owned();

            let mut files = tokio::fs::read_dir(level.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let path = file.path();
                let matches_format = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == self.format.extension());
                if !matches_format {
                    continue;
                }

                let file_name = file.file_name().to_string_lossy().into_owned();
                if let Some(address) = TileAddress::parse(&container, &file_name) {
                    addresses.push(address);
                }
            }
        }

        addresses.sort();
        Ok(addresses)
    }
}

#[async_trait]
impl TileSink for FsTileStore {
    async fn create_container(&self, zoom_level: u32) -> Result<(), IoError> {
        let dir = self.root.join(container_name(zoom_level));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| IoError::Io(format!("{}: {}", dir.display(), e)))
    }

    async fn write(&self, address: TileAddress, data: Bytes) -> Result<(), IoError> {
        let path = self.tile_path(&address);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| IoError::Io(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl TileSource for FsTileStore {
    async fn read(&self, address: TileAddress) -> Result<Option<Bytes>, IoError> {
        let path = self.tile_path(&address);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(IoError::Io(format!("{}: {}", path.display(), e))),
        }
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
