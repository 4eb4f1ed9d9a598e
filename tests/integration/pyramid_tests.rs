//! Pyramid generation integration tests.
//!
//! Tests verify:
//! - Level structure for representative source sizes
//! - Tile files land in the `z{zoom}/y{y}_x{x}.{ext}` layout
//! - Edge tiles carry their reduced extent
//! - Generation is deterministic across runs and parallelism settings
//! - The admission gate bounds concurrent tile work
//! - Sink failures and cancellation surface as build errors

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use deepzoom::error::PyramidError;
use deepzoom::io::{FsTileStore, MemoryTileStore};
use deepzoom::pyramid::{Parallelism, PyramidBuilder};
use deepzoom::raster::{self, TileFormat};
use deepzoom::tile::{PyramidLayout, TileAddress};
use deepzoom::TilingConfig;

use super::test_utils::{
    build_png_pyramid, encode_png, gradient_image, png_config, InstrumentedSink,
};

// =============================================================================
// Layout
// =============================================================================

#[test]
fn test_layout_for_wide_source() {
    let layout = PyramidLayout::new(4000, 1800, 256).unwrap();

    assert_eq!(layout.max_zoom_level, 4);
    assert_eq!(layout.level_count(), 5);

    let level0 = layout.level(0).unwrap();
    assert_eq!((level0.columns, level0.rows), (16, 8));

    let level4 = layout.level(4).unwrap();
    assert_eq!((level4.width, level4.height), (250, 113));
    assert_eq!((level4.columns, level4.rows), (1, 1));
}

#[test]
fn test_max_zoom_matches_log_formula() {
    for (width, height, tile_size) in [
        (1, 1, 256),
        (256, 256, 256),
        (257, 10, 256),
        (512, 511, 256),
        (513, 1, 256),
        (4000, 1800, 256),
        (100_000, 3, 512),
    ] {
        let layout = PyramidLayout::new(width, height, tile_size).unwrap();
        let ratio = f64::from(width.max(height)) / f64::from(tile_size);
        let expected = ratio.log2().ceil().max(0.0) as u32;
        assert_eq!(layout.max_zoom_level, expected, "{}x{} / {}", width, height, tile_size);

        let level0 = layout.level(0).unwrap();
        assert_eq!(level0.columns, width.div_ceil(tile_size));
        assert_eq!(level0.rows, height.div_ceil(tile_size));
    }
}

#[tokio::test]
async fn test_generated_level_structure() {
    // Same shape as 4000x1800 / 256, a quarter of the size
    let image = gradient_image(1000, 450);
    let store = build_png_pyramid(&image, 64, Parallelism::Bounded(4)).await;

    let layout = PyramidLayout::new(1000, 450, 64).unwrap();
    assert_eq!(layout.max_zoom_level, 4);
    assert_eq!(store.len().await as u64, layout.total_tiles());

    let level0: Vec<_> = store
        .addresses()
        .await
        .into_iter()
        .filter(|a| a.zoom_level == 0)
        .collect();
    assert_eq!(level0.len(), 16 * 8);

    let top = store.get(&TileAddress::new(4, 0, 0)).await.unwrap();
    assert_eq!(raster::dimensions(&top).unwrap(), (63, 29));
    assert!(store.get(&TileAddress::new(4, 1, 0)).await.is_none());
}

// =============================================================================
// Filesystem Layout
// =============================================================================

#[tokio::test]
async fn test_generate_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsTileStore::new(dir.path().join("pyramid"), TileFormat::Png));

    let summary = PyramidBuilder::new(png_config(256))
        .build(encode_png(&gradient_image(600, 300)), store.clone())
        .await
        .unwrap();

    assert_eq!(summary.max_zoom_level, 2);
    assert_eq!(summary.tiles_written, 9);

    let root = dir.path().join("pyramid");
    for relative in [
        "z0/y0_x0.png",
        "z0/y1_x0.png",
        "z0/y0_x2.png",
        "z0/y1_x2.png",
        "z1/y0_x0.png",
        "z1/y0_x1.png",
        "z2/y0_x0.png",
    ] {
        assert!(root.join(relative).is_file(), "missing {}", relative);
    }
    assert!(!root.join("z0/y2_x0.png").exists());
    assert_eq!(store.list().await.unwrap().len(), 9);
}

#[tokio::test]
async fn test_edge_tiles_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsTileStore::new(dir.path(), TileFormat::Png));

    PyramidBuilder::new(png_config(256))
        .build_image(gradient_image(600, 300), store.clone())
        .await
        .unwrap();

    let read = |relative: &str| std::fs::read(dir.path().join(relative)).unwrap();

    // Level 0 is 600x300: last column is 88 wide, last row 44 high
    assert_eq!(raster::dimensions(&read("z0/y0_x0.png")).unwrap(), (256, 256));
    assert_eq!(raster::dimensions(&read("z0/y0_x2.png")).unwrap(), (88, 256));
    assert_eq!(raster::dimensions(&read("z0/y1_x0.png")).unwrap(), (256, 44));
    assert_eq!(raster::dimensions(&read("z0/y1_x2.png")).unwrap(), (88, 44));

    // Level 1 is 300x150
    assert_eq!(raster::dimensions(&read("z1/y0_x1.png")).unwrap(), (44, 150));
}

#[tokio::test]
async fn test_jpeg_tiles_use_jpg_extension() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsTileStore::new(dir.path(), TileFormat::Jpeg));

    let summary = PyramidBuilder::new(TilingConfig::default().with_quality(75))
        .build_image(gradient_image(300, 100), store.clone())
        .await
        .unwrap();

    assert_eq!(summary.format, TileFormat::Jpeg);
    assert_eq!(summary.quality, 75);
    assert!(dir.path().join("z0/y0_x1.jpg").is_file());

    let data = std::fs::read(dir.path().join("z1/y0_x0.jpg")).unwrap();
    assert_eq!(&data[..2], &[0xFF, 0xD8]);
}

// =============================================================================
// Determinism
// =============================================================================

#[tokio::test]
async fn test_generation_is_idempotent() {
    let source = encode_png(&gradient_image(500, 333));
    let config = TilingConfig::default().with_tile_size(128);

    let first = Arc::new(MemoryTileStore::new());
    let second = Arc::new(MemoryTileStore::new());

    PyramidBuilder::new(config)
        .with_parallelism(Parallelism::Unbounded)
        .build(source.clone(), first.clone())
        .await
        .unwrap();
    PyramidBuilder::new(config)
        .with_parallelism(Parallelism::Sequential)
        .build(source, second.clone())
        .await
        .unwrap();

    assert_eq!(first.snapshot().await, second.snapshot().await);
}

#[tokio::test]
async fn test_sequential_order_is_deterministic() {
    let sink = Arc::new(InstrumentedSink::new());

    PyramidBuilder::new(png_config(64))
        .with_parallelism(Parallelism::Sequential)
        .build_image(gradient_image(130, 70), sink.clone())
        .await
        .unwrap();

    // Level 0: 3x2 tiles, level 1: 65x35 -> 2x1, level 2: 33x18 -> 1x1
    assert_eq!(
        sink.events().await,
        vec![
            "z0", "z0/y0_x0", "z0/y1_x0", "z0/y0_x1", "z0/y1_x1", "z0/y0_x2", "z0/y1_x2",
            "z1", "z1/y0_x0", "z1/y0_x1", "z2", "z2/y0_x0",
        ]
    );
    assert_eq!(sink.peak_concurrent_writes(), 1);
}

// =============================================================================
// Bounded Parallelism
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallelism_bound_is_respected() {
    let sink = Arc::new(InstrumentedSink::new().with_write_delay(Duration::from_millis(10)));

    let summary = PyramidBuilder::new(png_config(32))
        .with_parallelism(Parallelism::Bounded(3))
        .build_image(gradient_image(256, 128), sink.clone())
        .await
        .unwrap();

    assert_eq!(summary.tiles_written, sink.store().len().await as u64);
    assert!(sink.peak_concurrent_writes() <= 3);
    assert!(sink.peak_concurrent_writes() >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_containers_precede_writes_in_parallel_mode() {
    let sink = Arc::new(InstrumentedSink::new().with_write_delay(Duration::from_millis(1)));

    PyramidBuilder::new(png_config(32))
        .with_parallelism(Parallelism::Unbounded)
        .build_image(gradient_image(200, 150), sink.clone())
        .await
        .unwrap();

    let events = sink.events().await;
    for (index, event) in events.iter().enumerate() {
        if let Some((container, _)) = event.split_once('/') {
            let created = events.iter().position(|e| e == container).unwrap();
            assert!(created < index, "{} written before {}", event, container);
        }
    }
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_write_failure_names_the_tile() {
    let failing = TileAddress::new(0, 1, 1);
    let sink = Arc::new(InstrumentedSink::new().failing_write(failing));

    let result = PyramidBuilder::new(png_config(64))
        .with_parallelism(Parallelism::Bounded(2))
        .build_image(gradient_image(200, 200), sink.clone())
        .await;

    match result {
        Err(PyramidError::SinkWrite { address, source }) => {
            assert_eq!(address, failing);
            assert!(source.to_string().contains("disk full"));
        }
        other => panic!("Expected SinkWrite, got {:?}", other),
    }
    assert!(sink.store().get(&failing).await.is_none());
}

#[tokio::test]
async fn test_container_failure_stops_the_build() {
    let sink = Arc::new(InstrumentedSink::new().failing_container(1));

    let result = PyramidBuilder::new(png_config(64))
        .with_parallelism(Parallelism::Sequential)
        .build_image(gradient_image(200, 100), sink.clone())
        .await;

    assert!(matches!(
        result,
        Err(PyramidError::SinkContainer { zoom_level: 1, .. })
    ));
    // Level 0 completed, nothing past level 1 was attempted
    assert!(sink.store().addresses().await.iter().all(|a| a.zoom_level == 0));
    assert!(!sink.events().await.contains(&"z2".to_string()));
}

#[tokio::test]
async fn test_corrupt_source_creates_nothing() {
    let sink = Arc::new(InstrumentedSink::new());

    let result = PyramidBuilder::new(TilingConfig::default())
        .build(Bytes::from_static(&[0x89, b'P', b'N', b'G', 0, 0]), sink.clone())
        .await;

    assert!(matches!(result, Err(PyramidError::Decode(_))));
    assert!(sink.events().await.is_empty());
}

#[tokio::test]
async fn test_cancellation_mid_build() {
    let token = CancellationToken::new();
    let sink = Arc::new(
        InstrumentedSink::new()
            .with_write_delay(Duration::from_millis(2))
            .cancelling_after(3, token.clone()),
    );

    let result = PyramidBuilder::new(png_config(16))
        .with_parallelism(Parallelism::Bounded(2))
        .with_cancellation(token)
        .build_image(gradient_image(256, 256), sink.clone())
        .await;

    assert!(matches!(result, Err(PyramidError::Cancelled)));

    let total = PyramidLayout::new(256, 256, 16).unwrap().total_tiles();
    let written = sink.store().len().await as u64;
    assert!(written >= 3);
    assert!(written < total);
}
