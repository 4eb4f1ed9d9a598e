//! Viewport rendering integration tests.
//!
//! Tests verify:
//! - Full-resolution round trip over a freshly generated pyramid
//! - Half-pixel and odd offsets leave no seams between tiles
//! - Zoomed-out renders read the rounded zoom level
//! - Missing levels render blank without error
//! - Off-canvas cells are never fetched
//! - Parallel and sequential renders agree

use std::sync::Arc;

use bytes::Bytes;
use image::Rgba;

use deepzoom::error::RenderError;
use deepzoom::io::{FsTileStore, MemoryTileStore};
use deepzoom::pyramid::{Parallelism, PyramidBuilder};
use deepzoom::raster::{self, TileFormat};
use deepzoom::tile::TileAddress;
use deepzoom::viewport::{Viewport, ViewportCompositor};

use super::test_utils::{build_png_pyramid, gradient_image, max_channel_diff, png_config};

const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

// =============================================================================
// Round Trip
// =============================================================================

#[tokio::test]
async fn test_full_resolution_round_trip() {
    let image = gradient_image(300, 200);
    let store = build_png_pyramid(&image, 64, Parallelism::Bounded(4)).await;

    let compositor = ViewportCompositor::new(store, 64);
    let viewport = Viewport::new(0.0, 0.0, 1.0, 300, 200).unwrap();
    let canvas = compositor.render(&viewport).await.unwrap();

    assert_eq!(canvas.dimensions(), (300, 200));
    assert!(max_channel_diff(&canvas, &image) <= 1);
}

#[tokio::test]
async fn test_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let image = gradient_image(520, 260);
    let store = Arc::new(FsTileStore::new(dir.path(), TileFormat::Png));

    PyramidBuilder::new(png_config(128))
        .build_image(image.clone(), store.clone())
        .await
        .unwrap();

    let compositor = ViewportCompositor::new(store, 128);
    let viewport = Viewport::new(0.0, 0.0, 1.0, 520, 260).unwrap();
    let canvas = compositor.render_sequential(&viewport).await.unwrap();

    assert!(max_channel_diff(&canvas, &image) <= 1);
}

#[tokio::test]
async fn test_offset_viewport_matches_source_crop() {
    let image = gradient_image(400, 400);
    let store = build_png_pyramid(&image, 64, Parallelism::Unbounded).await;

    let compositor = ViewportCompositor::new(store, 64);
    let viewport = Viewport::new(100.0, 37.0, 1.0, 150, 90).unwrap();
    let canvas = compositor.render(&viewport).await.unwrap();

    let expected = image::imageops::crop_imm(&image, 100, 37, 150, 90).to_image();
    assert!(max_channel_diff(&canvas, &expected) <= 1);
}

#[tokio::test]
async fn test_half_pixel_offset_leaves_no_seams() {
    let image = gradient_image(512, 512);
    let store = build_png_pyramid(&image, 64, Parallelism::Bounded(4)).await;
    let compositor = ViewportCompositor::new(store, 64);

    // 0.5 rounds to a one pixel shift on both axes
    let viewport = Viewport::new(0.5, 0.5, 1.0, 200, 200).unwrap();
    let canvas = compositor.render(&viewport).await.unwrap();

    assert!(canvas.pixels().all(|p| p[3] == 255));
    let expected = image::imageops::crop_imm(&image, 1, 1, 200, 200).to_image();
    assert!(max_channel_diff(&canvas, &expected) <= 1);
}

#[tokio::test]
async fn test_odd_offset_at_half_zoom_leaves_no_seams() {
    let image = gradient_image(512, 512);
    let store = build_png_pyramid(&image, 64, Parallelism::Bounded(4)).await;
    let compositor = ViewportCompositor::new(store.clone(), 64);

    // Level 1 is 256x256; 33 * 0.5 = 16.5 shifts the canvas by 17 pixels
    let viewport = Viewport::new(33.0, 65.0, 0.5, 200, 150).unwrap();
    assert_eq!(viewport.zoom_level(), 1);
    let canvas = compositor.render(&viewport).await.unwrap();

    assert!(canvas.pixels().all(|p| p[3] == 255));

    let mut level1 = image::RgbaImage::new(256, 256);
    for tile_x in 0..4 {
        for tile_y in 0..4 {
            let data = store.get(&TileAddress::new(1, tile_x, tile_y)).await.unwrap();
            let tile = raster::decode(&data).unwrap();
            image::imageops::replace(&mut level1, &tile, i64::from(tile_x * 64), i64::from(tile_y * 64));
        }
    }
    let expected = image::imageops::crop_imm(&level1, 17, 33, 200, 150).to_image();
    assert!(max_channel_diff(&canvas, &expected) <= 1);
}

// =============================================================================
// Zoom Levels
// =============================================================================

#[tokio::test]
async fn test_visible_range_at_full_resolution() {
    let viewport = Viewport::new(0.0, 0.0, 1.0, 800, 600).unwrap();
    let range = viewport.visible_range(256);

    assert_eq!(viewport.zoom_level(), 0);
    assert_eq!(range.x, 0..4);
    assert_eq!(range.y, 0..3);
}

#[tokio::test]
async fn test_missing_level_renders_blank() {
    let store = Arc::new(MemoryTileStore::new());
    // Only level 0 exists
    for tile_x in 0..4 {
        for tile_y in 0..3 {
            let tile = image::RgbaImage::from_pixel(256, 256, Rgba([255, 0, 0, 255]));
            let data = raster::encode(&tile, TileFormat::Png, 90).unwrap();
            store.insert(TileAddress::new(0, tile_x, tile_y), data).await;
        }
    }

    let compositor = ViewportCompositor::new(store.clone(), 256);
    let viewport = Viewport::new(0.0, 0.0, 0.5, 800, 600).unwrap();
    assert_eq!(viewport.zoom_level(), 1);

    let canvas = compositor.render(&viewport).await.unwrap();

    assert_eq!(canvas.dimensions(), (800, 600));
    assert!(canvas.pixels().all(|p| *p == CLEAR));
    assert!(store.read_count() > 0);
}

#[tokio::test]
async fn test_missing_directory_renders_blank() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsTileStore::new(dir.path().join("absent"), TileFormat::Jpeg));

    let compositor = ViewportCompositor::new(store, 256);
    let viewport = Viewport::new(0.0, 0.0, 0.5, 800, 600).unwrap();
    let canvas = compositor.render(&viewport).await.unwrap();

    assert_eq!(canvas.dimensions(), (800, 600));
    assert!(canvas.pixels().all(|p| *p == CLEAR));
}

#[tokio::test]
async fn test_zoomed_out_render_reads_rounded_level() {
    let image = gradient_image(512, 512);
    let store = build_png_pyramid(&image, 128, Parallelism::Bounded(4)).await;

    // log2(1 / 0.3) = 1.74 rounds to level 2
    let compositor = ViewportCompositor::new(store.clone(), 128);
    let viewport = Viewport::new(0.0, 0.0, 0.3, 128, 128).unwrap();
    assert_eq!(viewport.zoom_level(), 2);

    let canvas = compositor.render(&viewport).await.unwrap();

    // Level 2 is a single 128x128 tile covering the whole canvas
    let level2 = raster::decode(&store.get(&TileAddress::new(2, 0, 0)).await.unwrap()).unwrap();
    assert!(max_channel_diff(&canvas, &level2) <= 1);
}

#[tokio::test]
async fn test_edge_tile_leaves_transparent_margin() {
    let image = gradient_image(300, 100);
    let store = build_png_pyramid(&image, 256, Parallelism::Sequential).await;

    let compositor = ViewportCompositor::new(store, 256);
    let viewport = Viewport::new(0.0, 0.0, 1.0, 512, 256).unwrap();
    let canvas = compositor.render(&viewport).await.unwrap();

    // The source ends at 300x100, everything past it stays transparent
    assert_eq!(canvas.get_pixel(299, 99)[3], 255);
    assert_eq!(canvas.get_pixel(300, 50), &CLEAR);
    assert_eq!(canvas.get_pixel(100, 100), &CLEAR);
    assert_eq!(canvas.get_pixel(511, 255), &CLEAR);
}

// =============================================================================
// Fetch Behavior
// =============================================================================

#[tokio::test]
async fn test_off_canvas_cells_are_not_fetched() {
    let store = Arc::new(MemoryTileStore::new());
    let compositor = ViewportCompositor::new(store.clone(), 256);

    // The visible range spans 3x3 cells, only 2x2 land on a 300x300 canvas
    let viewport = Viewport::new(0.0, 0.0, 0.5, 300, 300).unwrap();
    assert_eq!(viewport.visible_range(256).len(), 9);

    compositor.render(&viewport).await.unwrap();
    assert_eq!(store.read_count(), 4);
}

#[tokio::test]
async fn test_parallel_and_sequential_agree() {
    let image = gradient_image(700, 500);
    let store = build_png_pyramid(&image, 100, Parallelism::Bounded(4)).await;

    let compositor = ViewportCompositor::new(store, 100);
    for (offset_x, offset_y, zoom, width, height) in [
        (0.0, 0.0, 1.0, 700, 500),
        (150.0, 75.0, 1.0, 333, 222),
        (0.0, 0.0, 0.5, 350, 250),
        (-40.0, -40.0, 0.25, 200, 200),
    ] {
        let viewport = Viewport::new(offset_x, offset_y, zoom, width, height).unwrap();
        let parallel = compositor.render(&viewport).await.unwrap();
        let sequential = compositor.render_sequential(&viewport).await.unwrap();
        assert_eq!(parallel, sequential);
    }
}

#[tokio::test]
async fn test_corrupt_tile_fails_render() {
    let image = gradient_image(256, 256);
    let store = build_png_pyramid(&image, 128, Parallelism::Sequential).await;

    let corrupt = TileAddress::new(0, 1, 0);
    store.insert(corrupt, Bytes::from_static(b"not a png")).await;

    let compositor = ViewportCompositor::new(store, 128);
    let viewport = Viewport::new(0.0, 0.0, 1.0, 256, 256).unwrap();

    match compositor.render(&viewport).await {
        Err(RenderError::Decode { address, .. }) => assert_eq!(address, corrupt),
        Err(other) => panic!("Expected decode error, got {}", other),
        Ok(_) => panic!("Expected decode error, got a canvas"),
    }
}
