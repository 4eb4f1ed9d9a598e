//! Configuration for the deepzoom library and CLI.
//!
//! [`TilingConfig`] is the library-level configuration shared by the builder
//! and the compositor. The CLI types wrap it with clap arguments:
//! - Command-line arguments via clap
//! - Environment variables with `DEEPZOOM_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `DEEPZOOM_TILE_SIZE` - Tile edge length in pixels (default: 256)
//! - `DEEPZOOM_FORMAT` - Tile format, `jpeg` or `png` (default: jpeg)
//! - `DEEPZOOM_QUALITY` - Encode quality 1-100 (default: 90)
//! - `DEEPZOOM_PARALLELISM` - Tiles produced at once; 0 = unbounded, 1 = sequential
//!   (default: number of CPUs)
//! - `DEEPZOOM_CACHE_TILES` - Decoded tiles kept by the render cache; 0 = unbounded

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::error::ConfigError;
use crate::pyramid::Parallelism;
use crate::raster::{is_valid_quality, TileFormat, DEFAULT_QUALITY};
use crate::tile::DEFAULT_TILE_SIZE;

// =============================================================================
// Library Configuration
// =============================================================================

/// Tiling parameters. Generation and rendering of one pyramid must agree on
/// the tile size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingConfig {
    /// Tile edge length in pixels
    pub tile_size: u32,

    /// Encoded tile format
    pub format: TileFormat,

    /// Encode quality (1-100, ignored by PNG)
    pub quality: u8,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            format: TileFormat::default(),
            quality: DEFAULT_QUALITY,
        }
    }
}

impl TilingConfig {
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Check that the configuration can be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size == 0 {
            return Err(ConfigError::InvalidTileSize(self.tile_size));
        }
        if !is_valid_quality(self.quality) {
            return Err(ConfigError::InvalidQuality(self.quality));
        }
        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// deepzoom - Build deep-zoom tile pyramids and render viewports from them.
#[derive(Parser, Debug, Clone)]
#[command(name = "deepzoom")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Slice an image into a tile pyramid on disk.
    Generate(GenerateConfig),

    /// Composite a viewport out of a tile pyramid on disk.
    Render(RenderConfig),
}

/// Tile format as accepted on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatArg {
    #[default]
    Jpeg,
    Png,
}

impl From<FormatArg> for TileFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Jpeg => TileFormat::Jpeg,
            FormatArg::Png => TileFormat::Png,
        }
    }
}

/// Options shared by both subcommands.
#[derive(Args, Debug, Clone)]
pub struct TilingArgs {
    /// Tile edge length in pixels. Must match between generate and render.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "DEEPZOOM_TILE_SIZE")]
    pub tile_size: u32,

    /// Tile format (and file extension) of the pyramid.
    #[arg(long, value_enum, default_value_t = FormatArg::Jpeg, env = "DEEPZOOM_FORMAT")]
    pub format: FormatArg,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl TilingArgs {
    fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Arguments of the `generate` subcommand.
#[derive(Args, Debug, Clone)]
pub struct GenerateConfig {
    /// Source image (JPEG or PNG).
    pub input: PathBuf,

    /// Directory receiving the `z{zoom}/y{y}_x{x}` tile hierarchy.
    pub output: PathBuf,

    #[command(flatten)]
    pub tiling: TilingArgs,

    /// Encode quality for JPEG tiles (1-100).
    #[arg(long, default_value_t = DEFAULT_QUALITY, env = "DEEPZOOM_QUALITY")]
    pub quality: u8,

    /// Tiles produced at once. 0 or less = unbounded, 1 = sequential.
    ///
    /// Defaults to the number of available CPUs.
    #[arg(long, allow_negative_numbers = true, env = "DEEPZOOM_PARALLELISM")]
    pub parallelism: Option<i64>,
}

impl GenerateConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.tiling.validate()?;

        if !is_valid_quality(self.quality) {
            return Err("quality must be between 1 and 100".to_string());
        }

        if self.input == self.output {
            return Err("input and output must be different paths".to_string());
        }

        Ok(())
    }

    pub fn tiling_config(&self) -> TilingConfig {
        TilingConfig {
            tile_size: self.tiling.tile_size,
            format: self.tiling.format.into(),
            quality: self.quality,
        }
    }

    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
            .map_or_else(Parallelism::available, Parallelism::from_limit)
    }
}

/// Arguments of the `render` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    /// Root directory of a generated pyramid.
    pub pyramid: PathBuf,

    /// Output image file. Its extension picks the format (`.png` or `.jpg`).
    pub output: PathBuf,

    #[command(flatten)]
    pub tiling: TilingArgs,

    /// Viewport left edge in full-resolution pixels.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub offset_x: f64,

    /// Viewport top edge in full-resolution pixels.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub offset_y: f64,

    /// Zoom factor in (0, 1]; 1.0 = full resolution, 0.5 = half.
    #[arg(long, default_value_t = 1.0)]
    pub zoom: f64,

    /// Output width in pixels.
    #[arg(long)]
    pub width: u32,

    /// Output height in pixels.
    #[arg(long)]
    pub height: u32,

    /// Fetch tiles one at a time instead of concurrently.
    #[arg(long, default_value_t = false)]
    pub sequential: bool,

    /// Decoded tiles kept in memory while rendering. 0 = unbounded.
    #[arg(long, default_value_t = 0, env = "DEEPZOOM_CACHE_TILES")]
    pub cache_tiles: usize,
}

impl RenderConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.tiling.validate()?;

        if !self.zoom.is_finite() || self.zoom <= 0.0 || self.zoom > 1.0 {
            return Err("zoom must be greater than 0 and at most 1".to_string());
        }

        if !self.offset_x.is_finite() || !self.offset_y.is_finite() {
            return Err("offsets must be finite numbers".to_string());
        }

        if self.width == 0 || self.height == 0 {
            return Err("width and height must be greater than 0".to_string());
        }

        if self.output_format().is_none() {
            return Err(format!(
                "Unsupported output extension: {}. Use .png or .jpg",
                self.output.display()
            ));
        }

        Ok(())
    }

    /// Format of the output file, from its extension.
    pub fn output_format(&self) -> Option<TileFormat> {
        self.output
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(TileFormat::from_name)
    }
}

// =============================================================================
// Tests
// =============================================================================
