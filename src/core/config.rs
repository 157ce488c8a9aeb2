//! Rank schedule configuration for subtree generation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Widest rank the store builds and the codec reads: 4^12 child bits (2 MiB).
pub const MAX_SUBTREE_LEVELS: u32 = 12;

/// Quadtree levels covered by the service and how they are grouped into ranks.
///
/// Passed explicitly to every store; nothing here is process-global.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtreeConfig {
    /// Shallowest quadtree level served (root of the first rank).
    pub min_level: u32,
    /// Deepest quadtree level served (last level of the max rank).
    pub max_level: u32,
    /// Number of quadtree levels in one subtree (one rank).
    pub subtree_levels: u32,
    /// Bypass the blob cache on reads and rebuild every requested subtree.
    pub reload_subtrees: bool,
}

impl Default for SubtreeConfig {
    fn default() -> Self {
        Self {
            min_level: 0,
            max_level: 3,
            subtree_levels: 4,
            reload_subtrees: false,
        }
    }
}

impl SubtreeConfig {
    /// Create a validated config.
    pub fn new(min_level: u32, max_level: u32, subtree_levels: u32) -> Result<Self> {
        let config = Self {
            min_level,
            max_level,
            subtree_levels,
            reload_subtrees: false,
        };
        config.validate()?;
        Ok(config)
    }

    /// Same config with the cache-bypass flag set.
    pub fn with_reload(mut self, reload_subtrees: bool) -> Self {
        self.reload_subtrees = reload_subtrees;
        self
    }

    /// Parse and validate a JSON config.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SubtreeConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check that the levels form a whole number of ranks.
    pub fn validate(&self) -> Result<()> {
        if self.subtree_levels == 0 {
            return Err(Error::Config("subtree_levels must be at least 1".into()));
        }
        if self.subtree_levels > MAX_SUBTREE_LEVELS {
            return Err(Error::Config(format!(
                "subtree_levels ({}) must not exceed {}",
                self.subtree_levels, MAX_SUBTREE_LEVELS
            )));
        }
        if self.max_level < self.min_level {
            return Err(Error::Config(format!(
                "max_level ({}) must not be below min_level ({})",
                self.max_level, self.min_level
            )));
        }
        if self.max_level >= 32 {
            return Err(Error::Config(format!(
                "max_level ({}) must be below 32",
                self.max_level
            )));
        }
        if self.min_level % self.subtree_levels != 0 {
            return Err(Error::Config(format!(
                "min_level ({}) must be a multiple of subtree_levels ({})",
                self.min_level, self.subtree_levels
            )));
        }
        if (self.max_level - self.min_level + 1) % self.subtree_levels != 0 {
            return Err(Error::Config(format!(
                "levels {}..={} do not split into ranks of {} levels",
                self.min_level, self.max_level, self.subtree_levels
            )));
        }
        Ok(())
    }

    /// Number of ranks between `min_level` and `max_level`.
    pub fn rank_amount(&self) -> u32 {
        (self.max_level - self.min_level + 1) / self.subtree_levels
    }

    /// Level of the root of the deepest rank.
    pub fn max_rank_root(&self) -> u32 {
        self.max_level + 1 - self.subtree_levels
    }

    /// True if `level` starts one of the configured ranks.
    pub fn is_rank_root(&self, level: u32) -> bool {
        level >= self.min_level
            && level <= self.max_rank_root()
            && level % self.subtree_levels == 0
    }

    /// True if the rank rooted at `level` is the deepest one.
    pub fn is_max_rank(&self, level: u32) -> bool {
        level == self.max_rank_root()
    }

    /// Shallowest pyramid level (relative to the max rank) that carries content bits.
    ///
    /// Only meaningful when the max rank spans most of the served levels;
    /// with several ranks it goes negative and every level carries content.
    pub fn min_content_level(&self) -> i64 {
        self.subtree_levels as i64 - (self.max_level as i64 - self.min_level as i64)
    }
}
