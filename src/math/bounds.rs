//! Equal-angle tile bounds

use std::f64::consts::{FRAC_PI_2, PI};

use crate::math::morton;

/// Geographic extent of a tile.
///
/// Produced in radians by [`TileBounds::from_tile`]; [`TileBounds::to_degrees`]
/// converts for the existence oracle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileBounds {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl TileBounds {
    pub fn new(lon_min: f64, lon_max: f64, lat_min: f64, lat_max: f64) -> Self {
        Self { lon_min, lon_max, lat_min, lat_max }
    }

    /// Radian bounds of tile (x, y) at `level`.
    ///
    /// The grid splits longitude [-π, π] (by x) and latitude [-π/2, π/2]
    /// (by y) into `2^level` equal cells each. This is not a map projection.
    pub fn from_tile(x: u32, y: u32, level: u32) -> Self {
        let subdivision = (1u64 << level) as f64;
        let lat_step = PI / subdivision;
        let lon_step = 2.0 * PI / subdivision;

        let lat_min = -FRAC_PI_2 + y as f64 * lat_step;
        let lon_min = -PI + x as f64 * lon_step;

        Self {
            lon_min: lon_min.clamp(-PI, PI),
            lon_max: (lon_min + lon_step).clamp(-PI, PI),
            lat_min: lat_min.clamp(-FRAC_PI_2, FRAC_PI_2),
            lat_max: (lat_min + lat_step).clamp(-FRAC_PI_2, FRAC_PI_2),
        }
    }

    /// Radian bounds of the tile with Morton index `index` at `level`.
    pub fn from_morton(index: u64, level: u32) -> Self {
        let (x, y) = morton::deinterleave(index, level);
        Self::from_tile(x, y, level)
    }

    /// Same bounds with every component converted from radians to degrees.
    pub fn to_degrees(&self) -> Self {
        Self {
            lon_min: self.lon_min.to_degrees(),
            lon_max: self.lon_max.to_degrees(),
            lat_min: self.lat_min.to_degrees(),
            lat_max: self.lat_max.to_degrees(),
        }
    }

    /// Closed-interval overlap test (shared edges count as overlapping).
    pub fn intersects(&self, other: &TileBounds) -> bool {
        self.lon_min <= other.lon_max && self.lon_max >= other.lon_min &&
        self.lat_min <= other.lat_max && self.lat_max >= other.lat_min
    }
}

/// Radian bounds of tile (x, y) at `level`. Shorthand for [`TileBounds::from_tile`].
pub fn tile_bounds(x: u32, y: u32, level: u32) -> TileBounds {
    TileBounds::from_tile(x, y, level)
}

/// Quadtree tile address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub level: u32,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(level: u32, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }

    pub fn from_morton(index: u64, level: u32) -> Self {
        let (x, y) = morton::deinterleave(index, level);
        Self { level, x, y }
    }

    pub fn morton(&self) -> u64 {
        morton::interleave(self.x, self.y, self.level)
    }

    /// Radian bounds of this tile.
    pub fn bounds(&self) -> TileBounds {
        TileBounds::from_tile(self.x, self.y, self.level)
    }

    /// Quadrant `quadrant` (0..4, Morton order) one level down.
    pub fn child(&self, quadrant: u32) -> Self {
        debug_assert!(quadrant < 4);
        Self {
            level: self.level + 1,
            x: self.x * 2 + (quadrant & 1),
            y: self.y * 2 + (quadrant >> 1),
        }
    }

    pub fn children(&self) -> [TileCoord; 4] {
        [self.child(0), self.child(1), self.child(2), self.child(3)]
    }
}
