mod fs_store;
mod memory_store;
mod store;

pub use fs_store::FsTileStore;
pub use memory_store::MemoryTileStore;
pub use store::{TileSink, TileSource};
