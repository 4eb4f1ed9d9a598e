//! deepzoom - Build tile pyramids and render viewports from the command line.

use clap::Parser;
use std::num::NonZeroUsize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deepzoom::{
    config::{Cli, Command, GenerateConfig, RenderConfig},
    raster, FsTileStore, PyramidBuilder, TileCache, Viewport, ViewportCompositor, DEFAULT_QUALITY,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Generate(config) => run_generate(config).await,
        Command::Render(config) => run_render(config).await,
    }
}

// =============================================================================
// Generate Command
// =============================================================================

async fn run_generate(config: GenerateConfig) -> ExitCode {
    init_logging(config.tiling.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = match tokio::fs::read(&config.input).await {
        Ok(data) => data,
        Err(e) => {
            error!("Failed to read {}: {}", config.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let tiling = config.tiling_config();
    let parallelism = config.parallelism();

    info!("Configuration:");
    info!("  Input: {}", config.input.display());
    info!("  Output: {}", config.output.display());
    info!(
        "  Tiles: {}px {} (quality {})",
        tiling.tile_size, tiling.format, tiling.quality
    );
    info!("  Parallelism: {}", parallelism);

    let sink = Arc::new(FsTileStore::new(&config.output, tiling.format));
    let builder = PyramidBuilder::new(tiling)
        .with_parallelism(parallelism)
        .with_cancellation(cancel_on_ctrl_c());

    let started = Instant::now();
    let summary = match builder.build(source.into(), sink).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Pyramid generation failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Finished in {:.2?}", started.elapsed());

    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            error!("Failed to serialize build summary: {}", e);
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Render Command
// =============================================================================

async fn run_render(config: RenderConfig) -> ExitCode {
    init_logging(config.tiling.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let viewport = match Viewport::new(
        config.offset_x,
        config.offset_y,
        config.zoom,
        config.width,
        config.height,
    ) {
        Ok(viewport) => viewport,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(output_format) = config.output_format() else {
        error!("Unsupported output file: {}", config.output.display());
        return ExitCode::FAILURE;
    };

    if !config.pyramid.is_dir() {
        warn!(
            "Pyramid directory {} does not exist, output will be blank",
            config.pyramid.display()
        );
    }

    let cache = match NonZeroUsize::new(config.cache_tiles) {
        Some(capacity) => TileCache::with_capacity(capacity),
        None => TileCache::unbounded(),
    };

    let source = Arc::new(FsTileStore::new(&config.pyramid, config.tiling.format.into()));
    let compositor = ViewportCompositor::new(source, config.tiling.tile_size)
        .with_cache(Arc::new(cache))
        .with_cancellation(cancel_on_ctrl_c());

    info!(
        "Rendering {}x{} at offset ({}, {}), zoom {} (level {})",
        viewport.width(),
        viewport.height(),
        viewport.offset_x(),
        viewport.offset_y(),
        viewport.zoom_factor(),
        viewport.zoom_level()
    );

    let started = Instant::now();
    let result = if config.sequential {
        compositor.render_sequential(&viewport).await
    } else {
        compositor.render(&viewport).await
    };

    let canvas = match result {
        Ok(canvas) => canvas,
        Err(e) => {
            error!("Render failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let encoded = match raster::encode(&canvas, output_format, DEFAULT_QUALITY) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!("Failed to encode output: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::fs::write(&config.output, &encoded).await {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        "Wrote {} in {:.2?}",
        config.output.display(),
        started.elapsed()
    );
    ExitCode::SUCCESS
}

// =============================================================================
// Helpers
// =============================================================================

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "deepzoom=debug"
    } else {
        "deepzoom=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping");
            cancel.cancel();
        }
    });
    token
}
