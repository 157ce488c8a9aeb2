//! Subtree availability model and binary format

pub mod bitset;
pub mod availability;
pub mod tree;
pub mod codec;

pub use bitset::Bitset;
pub use availability::{Availability, Shape, Topology};
pub use tree::Subtree;
pub use codec::{decode, encode, SUBTREE_MAGIC, SUBTREE_VERSION};
