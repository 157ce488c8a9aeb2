//! Morton encoding (Z-order curve) for quadtree tile indexing

/// Spread the bits of a 32-bit integer into the even bits of a 64-bit integer
fn spread_bits(x: u32) -> u64 {
    let mut x = x as u64;
    x = (x | (x << 16)) & 0x0000ffff0000ffff;
    x = (x | (x << 8)) & 0x00ff00ff00ff00ff;
    x = (x | (x << 4)) & 0x0f0f0f0f0f0f0f0f;
    x = (x | (x << 2)) & 0x3333333333333333;
    x = (x | (x << 1)) & 0x5555555555555555;
    x
}

/// Compact the even bits of a 64-bit integer into a 32-bit integer
fn compact_bits(x: u64) -> u32 {
    let mut x = x & 0x5555555555555555;
    x = (x | (x >> 1)) & 0x3333333333333333;
    x = (x | (x >> 2)) & 0x0f0f0f0f0f0f0f0f;
    x = (x | (x >> 4)) & 0x00ff00ff00ff00ff;
    x = (x | (x >> 8)) & 0x0000ffff0000ffff;
    x = (x | (x >> 16)) & 0x00000000ffffffff;
    x as u32
}

/// Mask keeping the low `bits` bits (saturating at 64).
fn low_mask(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Encode tile coordinates at `level` into a Morton index.
///
/// x occupies the even bits, y the odd bits. Coordinates must be below `2^level`.
pub fn interleave(x: u32, y: u32, level: u32) -> u64 {
    debug_assert!(level <= 32, "level {} exceeds 32", level);
    debug_assert!((x as u64) >> level == 0, "x {} out of range at level {}", x, level);
    debug_assert!((y as u64) >> level == 0, "y {} out of range at level {}", y, level);
    (spread_bits(x) | (spread_bits(y) << 1)) & low_mask(2 * level)
}

/// Decode a Morton index at `level` back to tile coordinates
pub fn deinterleave(index: u64, level: u32) -> (u32, u32) {
    debug_assert!(level <= 32, "level {} exceeds 32", level);
    let index = index & low_mask(2 * level);
    (compact_bits(index), compact_bits(index >> 1))
}

/// Morton index of quadrant `quadrant` (0..4) one level below `index`
pub fn child_index(index: u64, quadrant: u64) -> u64 {
    debug_assert!(quadrant < 4);
    (index << 2) | quadrant
}

/// Morton index of the first descendant `depth` levels below `index`
pub fn first_descendant(index: u64, depth: u32) -> u64 {
    index << (2 * depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        for level in 0..=20u32 {
            let side = 1u64 << level;
            let samples = [0, 1, side / 3, side / 2, side.saturating_sub(2), side - 1];
            for &x in &samples {
                for &y in &samples {
                    if x >= side || y >= side {
                        continue;
                    }
                    let code = interleave(x as u32, y as u32, level);
                    assert_eq!(
                        deinterleave(code, level),
                        (x as u32, y as u32),
                        "Failed for ({}, {}) at level {}",
                        x, y, level
                    );
                }
            }
        }
    }

    #[test]
    fn test_roundtrip_exhaustive_small_levels() {
        for level in 0..=5u32 {
            let side = 1u32 << level;
            for x in 0..side {
                for y in 0..side {
                    assert_eq!(deinterleave(interleave(x, y, level), level), (x, y));
                }
            }
        }
    }

    #[test]
    fn test_ordering() {
        // x in even bits, y in odd bits
        assert_eq!(interleave(0, 0, 1), 0);
        assert_eq!(interleave(1, 0, 1), 1);
        assert_eq!(interleave(0, 1, 1), 2);
        assert_eq!(interleave(1, 1, 1), 3);
        assert_eq!(interleave(2, 0, 2), 4);
        assert_eq!(interleave(3, 3, 2), 15);
    }

    #[test]
    fn test_full_width() {
        let code = interleave(u32::MAX, 0, 32);
        assert_eq!(code, 0x5555555555555555);
        assert_eq!(deinterleave(code, 32), (u32::MAX, 0));
    }

    #[test]
    fn test_child_index_matches_coordinates() {
        let parent = interleave(5, 2, 3);
        for quadrant in 0..4u64 {
            let child = child_index(parent, quadrant);
            let (x, y) = deinterleave(child, 4);
            assert_eq!(x, 10 + (quadrant & 1) as u32);
            assert_eq!(y, 4 + (quadrant >> 1) as u32);
        }
        assert_eq!(first_descendant(parent, 1), child_index(parent, 0));
    }
}
