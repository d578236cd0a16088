//! Spatial indexing utilities.
//!
//! A region quadtree ([`Gridmap`]) stores sparse per-cell data and the
//! [`Blockmap`] maps world space onto it.

mod blockmap;
mod bounds;
mod gridmap;

pub use blockmap::Blockmap;
pub use bounds::Bounds;
pub use gridmap::{GridBlock, GridCell, Gridmap, NodeView};
