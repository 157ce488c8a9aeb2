//! Hierarchical availability bitsets.
//!
//! An [`Availability`] records which nodes of a quadtree block exist. It comes
//! in two topologies:
//!
//! - [`Topology::Pyramid`]: one bitset per level, level `i` holding `4^i`
//!   bits. Used for tile and content availability.
//! - [`Topology::Children`]: a single flat bitset of `4^L` bits. Used for the
//!   child-subtree availability at the bottom of a subtree.
//!
//! Within a level, bits are in Morton order: the children of bit `j` at level
//! `i` are bits `4j..4j+3` at level `i + 1`.

use crate::core::{Error, Result};
use super::bitset::Bitset;

/// Layout of an [`Availability`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    /// `L` levels of `4^i` bits each, `(4^L - 1) / 3` bits in total.
    Pyramid,
    /// One level of `4^L` bits.
    Children,
}

/// How an availability is written to a subtree file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Shape {
    /// No bit set: written as `constant: 0`.
    Empty,
    /// Every bit set: written as `constant: 1`.
    Full,
    /// Mixed: written as a packed bitstream.
    Bitstream(Bitset),
}

/// Number of bits in a pyramid of `levels` levels: `(4^levels - 1) / 3`.
pub fn pyramid_length(levels: usize) -> usize {
    ((1usize << (2 * levels)) - 1) / 3
}

/// Offset of pyramid level `level` inside the flattened bitstream.
fn level_offset(level: usize) -> usize {
    pyramid_length(level)
}

/// `Some(k)` if `n == 4^k`.
fn log4_exact(n: usize) -> Option<usize> {
    if n == 0 || !n.is_power_of_two() || n.trailing_zeros() % 2 != 0 {
        return None;
    }
    Some(n.trailing_zeros() as usize / 2)
}

/// `Some(L)` if `n == (4^L - 1) / 3` for some `L >= 1`.
fn pyramid_levels_for(n: usize) -> Option<usize> {
    log4_exact(n.checked_mul(3)?.checked_add(1)?).filter(|&levels| levels >= 1)
}

/// Immutable availability over one or more quadtree levels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Availability {
    levels: Vec<Bitset>,
    length: usize,
    topology: Topology,
}

impl Availability {
    /// Build from per-level bitsets.
    ///
    /// Pyramid input must have `4^i` bits at level `i`; children input must be
    /// exactly one level whose length is a power of 4.
    pub fn from_levels(levels: Vec<Bitset>, topology: Topology) -> Result<Self> {
        match topology {
            Topology::Pyramid => {
                if levels.is_empty() {
                    return Err(Error::precondition("pyramid availability needs at least one level"));
                }
                for (i, level) in levels.iter().enumerate() {
                    if level.len() != 1 << (2 * i) {
                        return Err(Error::precondition(format!(
                            "pyramid level {} has {} bits, expected {}",
                            i,
                            level.len(),
                            1usize << (2 * i)
                        )));
                    }
                }
                let length = pyramid_length(levels.len());
                Ok(Self { levels, length, topology })
            }
            Topology::Children => {
                if levels.len() != 1 {
                    return Err(Error::precondition(format!(
                        "children availability must have exactly one level, got {}",
                        levels.len()
                    )));
                }
                let length = levels[0].len();
                if log4_exact(length).is_none() {
                    return Err(Error::precondition(format!(
                        "children availability length {} is not a power of 4",
                        length
                    )));
                }
                Ok(Self { levels, length, topology })
            }
        }
    }

    /// Build from a flat bitset of `length` bits.
    ///
    /// For a pyramid, `length` must be `(4^L - 1) / 3` and the input is split
    /// into levels at the `(4^i - 1) / 3` boundaries.
    pub fn from_bitset(bits: &Bitset, length: usize, topology: Topology) -> Result<Self> {
        if bits.len() != length {
            return Err(Error::precondition(format!(
                "bitset has {} bits but availability length is {}",
                bits.len(),
                length
            )));
        }
        match topology {
            Topology::Pyramid => {
                let level_count = pyramid_levels_for(length).ok_or_else(|| {
                    Error::precondition(format!("unbalanced pyramid availability length {}", length))
                })?;
                let levels = (0..level_count)
                    .map(|i| bits.slice(level_offset(i), level_offset(i + 1)))
                    .collect();
                Self::from_levels(levels, topology)
            }
            Topology::Children => Self::from_levels(vec![bits.clone()], topology),
        }
    }

    /// All-zero availability: `levels` pyramid levels, or `4^levels` child bits.
    pub fn empty(levels: usize, topology: Topology) -> Self {
        match topology {
            Topology::Pyramid => Self {
                levels: (0..levels).map(|i| Bitset::new(1 << (2 * i))).collect(),
                length: pyramid_length(levels),
                topology,
            },
            Topology::Children => {
                let length = 1 << (2 * levels);
                Self {
                    levels: vec![Bitset::new(length)],
                    length,
                    topology,
                }
            }
        }
    }

    /// Pyramid tile availability from the deepest level's presence bits.
    ///
    /// Each coarser bit is the OR of its four children, so the pyramid has
    /// `log4(leaf_count) + 1` levels.
    pub fn generate_tile_availability(leaf_bits: &Bitset, leaf_count: usize) -> Result<Self> {
        Self::reduce_pyramid(leaf_bits, leaf_count, |_| true)
    }

    /// Pyramid content availability from the deepest level's presence bits.
    ///
    /// Same reduction as tile availability, except coarser level `i` stays
    /// empty unless `i + 1 >= min_content_level`.
    pub fn generate_content_availability(
        leaf_bits: &Bitset,
        leaf_count: usize,
        min_content_level: i64,
    ) -> Result<Self> {
        Self::reduce_pyramid(leaf_bits, leaf_count, |level| level as i64 + 1 >= min_content_level)
    }

    fn reduce_pyramid(
        leaf_bits: &Bitset,
        leaf_count: usize,
        keep_level: impl Fn(usize) -> bool,
    ) -> Result<Self> {
        let depth = log4_exact(leaf_count).ok_or_else(|| {
            Error::precondition(format!("leaf count {} is not a power of 4", leaf_count))
        })?;
        if leaf_bits.len() != leaf_count {
            return Err(Error::precondition(format!(
                "leaf bitset has {} bits, expected {}",
                leaf_bits.len(),
                leaf_count
            )));
        }

        let level_count = depth + 1;
        let mut levels = vec![Bitset::default(); level_count];
        levels[depth] = leaf_bits.clone();
        for i in (0..depth).rev() {
            let mut level = Bitset::new(1 << (2 * i));
            if keep_level(i) {
                let below = &levels[i + 1];
                for parent in below.iter_ones().map(|child| child / 4) {
                    level.set(parent, true);
                }
            }
            levels[i] = level;
        }
        Self::from_levels(levels, Topology::Pyramid)
    }

    /// Merge four quadrant availabilities (Morton order) into their parent.
    ///
    /// Pyramid: level `i + 1` of the result is the four quadrants' level `i`
    /// laid end to end, and the new root is the OR of the quadrant roots
    /// unless `is_content` is set, in which case it stays unset.
    /// Children: the four flat bitsets laid end to end.
    pub fn concatenate(parts: &[Availability], topology: Topology, is_content: bool) -> Result<Self> {
        if parts.len() != 4 {
            return Err(Error::precondition(format!(
                "concatenation needs exactly 4 availabilities, got {}",
                parts.len()
            )));
        }
        let level_count = parts[0].level_count();
        let length = parts[0].length;
        for part in parts {
            if part.topology != topology {
                return Err(Error::precondition(format!(
                    "cannot merge {:?} availability as {:?}",
                    part.topology, topology
                )));
            }
            if part.level_count() != level_count || part.length != length {
                return Err(Error::precondition(
                    "availabilities must have the same number of levels",
                ));
            }
        }

        match topology {
            Topology::Pyramid => {
                let mut levels = Vec::with_capacity(level_count + 1);
                let mut root = Bitset::new(1);
                if !is_content {
                    root.set(0, parts.iter().any(|p| p.is_available()));
                }
                levels.push(root);
                for i in 0..level_count {
                    let block = 1 << (2 * i);
                    let mut level = Bitset::new(block * 4);
                    for (quadrant, part) in parts.iter().enumerate() {
                        level.copy_from(&part.levels[i], quadrant * block);
                    }
                    levels.push(level);
                }
                Self::from_levels(levels, topology)
            }
            Topology::Children => {
                let mut bits = Bitset::new(length * 4);
                for (quadrant, part) in parts.iter().enumerate() {
                    bits.copy_from(&part.levels[0], quadrant * length);
                }
                Self::from_levels(vec![bits], topology)
            }
        }
    }

    /// Number of stored levels (always 1 for children topology).
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Total number of bits.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Bits of one level.
    pub fn level(&self, index: usize) -> &Bitset {
        &self.levels[index]
    }

    pub fn levels(&self) -> &[Bitset] {
        &self.levels
    }

    /// True if the first bit (the root for a pyramid) is set.
    pub fn is_available(&self) -> bool {
        self.levels.first().is_some_and(|root| root.len() > 0 && root.get(0))
    }

    /// Number of set bits across all levels.
    pub fn cardinality(&self) -> usize {
        self.levels.iter().map(Bitset::count_ones).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(Bitset::is_clear)
    }

    /// True if every one of the `length` bits is set.
    pub fn is_full(&self) -> bool {
        self.cardinality() == self.length
    }

    /// Flattened bits: pyramid levels concatenated root first.
    pub fn to_bitset(&self) -> Bitset {
        if self.topology == Topology::Children {
            return self.levels[0].clone();
        }
        let mut bits = Bitset::new(self.length);
        for (i, level) in self.levels.iter().enumerate() {
            bits.copy_from(level, level_offset(i));
        }
        bits
    }

    /// Encoding shape for the subtree format.
    pub fn shape(&self) -> Shape {
        if self.is_empty() {
            Shape::Empty
        } else if self.is_full() {
            Shape::Full
        } else {
            Shape::Bitstream(self.to_bitset())
        }
    }
}
