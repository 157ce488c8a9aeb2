//! Subtree: tile, content and child-subtree availability for one rank.

use crate::core::{Error, Result};
use super::availability::{Availability, Topology};
use super::bitset::Bitset;

/// Availability of one block of `levels` quadtree levels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subtree {
    tile_availability: Availability,
    content_availability: Availability,
    child_subtree_availability: Availability,
    levels: usize,
}

impl Subtree {
    /// Bundle three availabilities, checking that they describe `levels` levels.
    pub fn new(
        tile_availability: Availability,
        content_availability: Availability,
        child_subtree_availability: Availability,
        levels: usize,
    ) -> Result<Self> {
        if tile_availability.topology() != Topology::Pyramid
            || content_availability.topology() != Topology::Pyramid
            || child_subtree_availability.topology() != Topology::Children
        {
            return Err(Error::precondition(
                "tile and content availability must be pyramids, child subtree availability flat",
            ));
        }
        if levels != tile_availability.level_count() || levels != content_availability.level_count() {
            return Err(Error::precondition(format!(
                "the number of levels ({}) must match the availabilities (tile: {}, content: {})",
                levels,
                tile_availability.level_count(),
                content_availability.level_count()
            )));
        }
        if child_subtree_availability.length() != 1 << (2 * levels) {
            return Err(Error::precondition(format!(
                "child subtree availability has {} bits, expected {}",
                child_subtree_availability.length(),
                1usize << (2 * levels)
            )));
        }
        Ok(Self {
            tile_availability,
            content_availability,
            child_subtree_availability,
            levels,
        })
    }

    /// Subtree where nothing exists.
    pub fn empty(levels: usize) -> Self {
        Self {
            tile_availability: Availability::empty(levels, Topology::Pyramid),
            content_availability: Availability::empty(levels, Topology::Pyramid),
            child_subtree_availability: Availability::empty(levels, Topology::Children),
            levels,
        }
    }

    pub fn tile_availability(&self) -> &Availability {
        &self.tile_availability
    }

    pub fn content_availability(&self) -> &Availability {
        &self.content_availability
    }

    pub fn child_subtree_availability(&self) -> &Availability {
        &self.child_subtree_availability
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    /// True if nothing in the subtree or below it exists.
    pub fn is_empty(&self) -> bool {
        self.tile_availability.is_empty()
            && self.content_availability.is_empty()
            && self.child_subtree_availability.is_empty()
    }

    /// Merge four sibling subtrees (Morton order) into their parent, one level deeper.
    ///
    /// Tile and child-subtree availability gain a root bit set when any
    /// quadrant exists; content availability leaves the new root unset.
    pub fn concatenate_rank(parts: &[Subtree]) -> Result<Subtree> {
        if parts.len() != 4 {
            return Err(Error::precondition(format!(
                "the subtrees array must have exactly 4 elements, got {}",
                parts.len()
            )));
        }
        let levels = parts[0].levels;
        if levels < 1 {
            return Err(Error::precondition("the subtrees must have at least one level"));
        }
        if parts.iter().any(|p| p.levels != levels) {
            return Err(Error::precondition("the subtrees must have the same number of levels"));
        }

        let tiles: Vec<Availability> = parts.iter().map(|p| p.tile_availability.clone()).collect();
        let contents: Vec<Availability> = parts.iter().map(|p| p.content_availability.clone()).collect();
        let children: Vec<Availability> =
            parts.iter().map(|p| p.child_subtree_availability.clone()).collect();

        Subtree::new(
            Availability::concatenate(&tiles, Topology::Pyramid, false)?,
            Availability::concatenate(&contents, Topology::Pyramid, true)?,
            Availability::concatenate(&children, Topology::Children, false)?,
            levels + 1,
        )
    }

    /// Collapse into a one-level summary usable as a single child unit of a parent rank.
    ///
    /// The tile and content bits are this subtree's roots. The four child bits
    /// are the tile availability of the level below the root, or for a
    /// one-level subtree its own child-subtree availability.
    pub fn simplify(&self) -> Result<Subtree> {
        let mut tile = Bitset::new(1);
        tile.set(0, self.tile_availability.is_available());
        let mut content = Bitset::new(1);
        content.set(0, self.content_availability.is_available());

        let children = if self.levels >= 2 {
            self.tile_availability.level(1).clone()
        } else {
            self.child_subtree_availability.level(0).clone()
        };

        Subtree::new(
            Availability::from_levels(vec![tile], Topology::Pyramid)?,
            Availability::from_levels(vec![content], Topology::Pyramid)?,
            Availability::from_levels(vec![children], Topology::Children)?,
            1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_rank_like(leaves: &[usize], leaf_count: usize) -> Subtree {
        let bits = Bitset::from_indices(leaf_count, leaves.iter().copied());
        let levels = (leaf_count.trailing_zeros() / 2) as usize + 1;
        Subtree::new(
            Availability::generate_tile_availability(&bits, leaf_count).unwrap(),
            Availability::generate_content_availability(&bits, leaf_count, 0).unwrap(),
            Availability::empty(levels, Topology::Children),
            levels,
        )
        .unwrap()
    }

    #[test]
    fn test_new_checks_levels() {
        let err = Subtree::new(
            Availability::empty(2, Topology::Pyramid),
            Availability::empty(3, Topology::Pyramid),
            Availability::empty(2, Topology::Children),
            2,
        )
        .unwrap_err();
        assert!(err.is_precondition());

        let err = Subtree::new(
            Availability::empty(2, Topology::Pyramid),
            Availability::empty(2, Topology::Pyramid),
            Availability::empty(1, Topology::Children),
            2,
        )
        .unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_empty() {
        let subtree = Subtree::empty(3);
        assert!(subtree.is_empty());
        assert_eq!(subtree.tile_availability().length(), 21);
        assert_eq!(subtree.child_subtree_availability().length(), 64);
    }

    #[test]
    fn test_concatenate_rank() {
        let parts = [
            max_rank_like(&[0], 4),
            max_rank_like(&[], 4),
            max_rank_like(&[2, 3], 4),
            max_rank_like(&[], 4),
        ];
        let merged = Subtree::concatenate_rank(&parts).unwrap();
        assert_eq!(merged.levels(), 3);
        assert!(merged.tile_availability().is_available());
        assert!(!merged.content_availability().is_available());
        assert_eq!(merged.tile_availability().level(1).iter_ones().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(merged.child_subtree_availability().length(), 64);
    }

    #[test]
    fn test_concatenate_conserves_content() {
        let parts = [
            max_rank_like(&[0, 1], 16),
            max_rank_like(&[7], 16),
            max_rank_like(&[], 16),
            max_rank_like(&[15, 3, 9], 16),
        ];
        let expected: usize = parts.iter().map(|p| p.content_availability().cardinality()).sum();
        let merged = Subtree::concatenate_rank(&parts).unwrap();
        assert_eq!(merged.content_availability().cardinality(), expected);
    }

    #[test]
    fn test_concatenate_rank_rejects_bad_input() {
        let two = Subtree::empty(2);
        let err = Subtree::concatenate_rank(&[two.clone(), two.clone()]).unwrap_err();
        assert!(err.is_precondition());

        let err = Subtree::concatenate_rank(&[two.clone(), two.clone(), two, Subtree::empty(3)]).unwrap_err();
        assert!(err.is_precondition());

        let zero = Subtree::empty(0);
        let err = Subtree::concatenate_rank(&[zero.clone(), zero.clone(), zero.clone(), zero]).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_simplify() {
        let subtree = max_rank_like(&[1, 13], 16);
        let simple = subtree.simplify().unwrap();
        assert_eq!(simple.levels(), 1);
        assert!(simple.tile_availability().is_available());
        assert!(simple.content_availability().is_available());
        assert_eq!(
            simple.child_subtree_availability().level(0).iter_ones().collect::<Vec<_>>(),
            vec![0, 3]
        );
    }

    #[test]
    fn test_simplify_empty() {
        let simple = Subtree::empty(4).simplify().unwrap();
        assert!(simple.is_empty());
        assert_eq!(simple.child_subtree_availability().length(), 4);
    }

    #[test]
    fn test_simplify_single_level_keeps_children() {
        let children = Availability::from_levels(
            vec![Bitset::from_indices(4, [2])],
            Topology::Children,
        )
        .unwrap();
        let subtree = Subtree::new(
            Availability::from_bitset(&Bitset::full(1), 1, Topology::Pyramid).unwrap(),
            Availability::empty(1, Topology::Pyramid),
            children.clone(),
            1,
        )
        .unwrap();
        let simple = subtree.simplify().unwrap();
        assert_eq!(simple, subtree);
    }
}
