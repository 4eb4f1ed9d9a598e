//! Tile pyramid generation.
//!
//! [`PyramidBuilder`] turns one source image into a full tile set, written
//! through a [`TileSink`](crate::io::TileSink). How many tiles are produced at
//! once is controlled by [`Parallelism`] and enforced by an
//! [`AdmissionGate`].

mod builder;
mod gate;

pub use builder::{PyramidBuilder, PyramidSummary};
pub use gate::{AdmissionGate, Cancelled, GatePermit, Parallelism};
