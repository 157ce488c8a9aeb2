//! tdtiles - implicit-tiling subtree service for 3D Tiles
//!
//! Computes which quadtree tiles exist, which carry content and which deeper
//! subtrees exist, and encodes the result in the binary subtree format read
//! by 3D Tiles viewers.

pub mod core;
pub mod math;
pub mod subtree;
pub mod store;
pub mod tileset;
