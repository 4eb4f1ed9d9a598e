//! Viewport rendering.
//!
//! A [`Viewport`] picks a pyramid level and the tiles that land on its output
//! canvas; [`ViewportCompositor`] reads those tiles from a
//! [`TileSource`](crate::io::TileSource) and draws them.

mod compositor;
mod view;

pub use compositor::ViewportCompositor;
pub use view::{TilePlacement, TileRange, Viewport};
