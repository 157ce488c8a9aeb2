//! Spatial existence queries
//!
//! The store asks an [`ExistenceOracle`] whether any feature touches a tile.
//! Bounds are passed in degrees.

use std::path::Path;

use crate::core::{Error, Result};
use crate::math::TileBounds;

/// Answers "does anything exist inside these bounds?".
///
/// Implementations may block (database round trips); the store calls them
/// from synchronous code only.
pub trait ExistenceOracle: Send + Sync {
    fn exists(&self, bounds: &TileBounds) -> Result<bool>;
}

impl<F> ExistenceOracle for F
where
    F: Fn(&TileBounds) -> Result<bool> + Send + Sync,
{
    fn exists(&self, bounds: &TileBounds) -> Result<bool> {
        self(bounds)
    }
}

/// In-memory oracle over feature bounding boxes in degrees.
#[derive(Clone, Debug, Default)]
pub struct FootprintIndex {
    footprints: Vec<TileBounds>,
}

impl FootprintIndex {
    pub fn new(footprints: Vec<TileBounds>) -> Self {
        Self { footprints }
    }

    /// Parse `[[lon_min, lat_min, lon_max, lat_max], ...]`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let boxes: Vec<[f64; 4]> = serde_json::from_str(json)
            .map_err(|e| Error::storage(format!("invalid footprint JSON: {}", e)))?;
        let mut index = Self::default();
        for [lon_min, lat_min, lon_max, lat_max] in boxes {
            if lon_min > lon_max || lat_min > lat_max {
                return Err(Error::storage(format!(
                    "inverted footprint [{}, {}, {}, {}]",
                    lon_min, lat_min, lon_max, lat_max
                )));
            }
            index.push(TileBounds::new(lon_min, lon_max, lat_min, lat_max));
        }
        Ok(index)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn push(&mut self, footprint: TileBounds) {
        self.footprints.push(footprint);
    }

    pub fn len(&self) -> usize {
        self.footprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.footprints.is_empty()
    }

    /// Union of all footprints, or `None` when the index is empty.
    pub fn extent(&self) -> Option<TileBounds> {
        self.footprints.iter().copied().reduce(|a, b| {
            TileBounds::new(
                a.lon_min.min(b.lon_min),
                a.lon_max.max(b.lon_max),
                a.lat_min.min(b.lat_min),
                a.lat_max.max(b.lat_max),
            )
        })
    }
}

impl ExistenceOracle for FootprintIndex {
    fn exists(&self, bounds: &TileBounds) -> Result<bool> {
        Ok(self.footprints.iter().any(|f| f.intersects(bounds)))
    }
}
