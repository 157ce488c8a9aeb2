//! Quadtree tile addressing

pub mod morton;
pub mod bounds;

pub use bounds::{tile_bounds, TileBounds, TileCoord};
pub use morton::{interleave, deinterleave};
