use thiserror::Error;

use crate::tile::TileAddress;

/// I/O errors raised by tile sinks and tile sources
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Underlying filesystem or transport failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// A tile was written before its zoom level container was created
    #[error("Container for zoom level {0} has not been created")]
    MissingContainer(u32),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        IoError::Io(err.to_string())
    }
}

/// Errors from the raster collaborator (decode, resize, encode)
#[derive(Debug, Clone, Error)]
pub enum RasterError {
    /// Bytes could not be decoded into a pixel buffer
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// Pixel buffer could not be encoded
    #[error("Failed to encode image: {message}")]
    Encode { message: String },

    /// Requested region falls outside the source buffer
    #[error("Region {x},{y} {width}x{height} is outside a {source_width}x{source_height} image")]
    InvalidRegion {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        source_width: u32,
        source_height: u32,
    },
}

/// Invalid configuration, rejected before any work begins
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Tile size must be positive
    #[error("Invalid tile size: {0} (must be greater than 0)")]
    InvalidTileSize(u32),

    /// Zoom factor must be finite and in (0, 1]
    #[error("Invalid zoom factor: {0} (must be in (0, 1])")]
    InvalidZoomFactor(f64),

    /// Output dimensions must be positive
    #[error("Invalid output size: {width}x{height}")]
    InvalidOutputSize { width: u32, height: u32 },

    /// Viewport offsets must be finite
    #[error("Invalid viewport offset: ({x}, {y})")]
    InvalidOffset { x: f64, y: f64 },

    /// Encode quality must be in 1..=100
    #[error("Invalid quality: {0} (must be between 1 and 100)")]
    InvalidQuality(u8),

    /// Source image must have positive dimensions
    #[error("Invalid source dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Errors that can occur while building a tile pyramid
#[derive(Debug, Clone, Error)]
pub enum PyramidError {
    /// Configuration rejected up front
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Source image could not be decoded; no tile was produced
    #[error("Source image decode failed: {0}")]
    Decode(RasterError),

    /// A tile could not be sliced or encoded
    #[error("Failed to produce tile {address}: {source}")]
    Produce {
        address: TileAddress,
        source: RasterError,
    },

    /// The sink refused to create a zoom level container
    #[error("Failed to create container for zoom level {zoom_level}: {source}")]
    SinkContainer { zoom_level: u32, source: IoError },

    /// The sink failed to persist a tile
    #[error("Failed to write tile {address}: {source}")]
    SinkWrite {
        address: TileAddress,
        source: IoError,
    },

    /// A tile task panicked or was aborted
    #[error("Tile task failed: {0}")]
    Task(String),

    /// The build was cancelled before completion
    #[error("Pyramid build cancelled")]
    Cancelled,
}

/// Errors that can occur while rendering a viewport.
///
/// Missing tiles are not errors; they render as transparent gaps.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// Viewport or compositor configuration rejected up front
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The tile source failed while reading a tile
    #[error("Failed to read tile {address}: {source}")]
    Read {
        address: TileAddress,
        source: IoError,
    },

    /// A tile exists but its bytes are not a decodable image
    #[error("Failed to decode tile {address}: {source}")]
    Decode {
        address: TileAddress,
        source: RasterError,
    },

    /// A fetch task panicked or was aborted
    #[error("Tile fetch task failed: {0}")]
    Task(String),

    /// The render was cancelled before completion
    #[error("Render cancelled")]
    Cancelled,
}
