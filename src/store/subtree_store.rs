//! Lazy construction and caching of rank subtrees
//!
//! A rank is a block of `subtree_levels` quadtree levels whose root sits on a
//! multiple of `subtree_levels`. [`SubtreeStore::get_subtree`] returns the
//! encoded subtree of one rank root, building it on a cache miss:
//!
//! - The deepest rank queries the oracle for each leaf tile and reduces the
//!   leaf bits into tile and content pyramids.
//! - Shallower ranks recurse down the quadtree inside the rank. At the rank's
//!   last level each tile collapses the four child ranks below it (each
//!   resolved through the cache) into a one-level summary.
//!
//! A tile the oracle reports as absent yields an empty subtree for its whole
//! remaining depth without further queries.

use std::sync::Arc;

use crate::core::{Error, Result, SubtreeConfig};
use crate::math::{morton, TileBounds};
use crate::store::build_lock::BuildLocks;
use crate::store::cache::BlobCache;
use crate::store::oracle::ExistenceOracle;
use crate::subtree::{codec, Availability, Bitset, Subtree, Topology};

/// Builds, encodes and memoizes subtrees for every rank root of a config.
pub struct SubtreeStore {
    config: SubtreeConfig,
    oracle: Arc<dyn ExistenceOracle>,
    cache: Arc<dyn BlobCache>,
    locks: BuildLocks,
}

impl SubtreeStore {
    /// Create a store over an oracle and a cache. Fails if the config is invalid.
    pub fn new(
        config: SubtreeConfig,
        oracle: Arc<dyn ExistenceOracle>,
        cache: Arc<dyn BlobCache>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            oracle,
            cache,
            locks: BuildLocks::new(),
        })
    }

    pub fn config(&self) -> &SubtreeConfig {
        &self.config
    }

    /// Encoded subtree rooted at tile (x, y) of `level`.
    ///
    /// `level` must be a rank root. Unless `reload_subtrees` is set, a cached
    /// blob is returned as stored.
    pub fn get_subtree(&self, level: u32, x: u32, y: u32) -> Result<Vec<u8>> {
        let morton = self.rank_root_index(level, x, y)?;

        self.locks.with_lock((morton, level), || {
            if !self.config.reload_subtrees {
                if let Some(bytes) = self.cache.get(morton, level)? {
                    log::debug!("Subtree {}/{}/{} served from cache", level, x, y);
                    return Ok(bytes);
                }
            }
            let (_, bytes) = self.build_and_store(morton, level)?;
            Ok(bytes)
        })
    }

    /// Decoded subtree rooted at tile (x, y) of `level`.
    pub fn decode_subtree(&self, level: u32, x: u32, y: u32) -> Result<Subtree> {
        let bytes = self.get_subtree(level, x, y)?;
        codec::decode(&bytes, self.config.subtree_levels as usize)
    }

    fn rank_root_index(&self, level: u32, x: u32, y: u32) -> Result<u64> {
        if !self.config.is_rank_root(level) {
            return Err(Error::NotRankRoot { level });
        }
        let side = 1u64 << level;
        if x as u64 >= side || y as u64 >= side {
            return Err(Error::precondition(format!(
                "tile ({}, {}) is outside level {}",
                x, y, level
            )));
        }
        Ok(morton::interleave(x, y, level))
    }

    /// Subtree of a child rank, from the cache when possible.
    ///
    /// A cached blob that no longer decodes is rebuilt and overwritten.
    fn resolve_rank(&self, morton: u64, level: u32) -> Result<Subtree> {
        self.locks.with_lock((morton, level), || {
            if !self.config.reload_subtrees {
                if let Some(bytes) = self.cache.get(morton, level)? {
                    match codec::decode(&bytes, self.config.subtree_levels as usize) {
                        Ok(subtree) => return Ok(subtree),
                        Err(e) => log::warn!(
                            "Rebuilding cached subtree {} at level {}: {}",
                            morton, level, e
                        ),
                    }
                }
            }
            let (subtree, _) = self.build_and_store(morton, level)?;
            Ok(subtree)
        })
    }

    /// Build a rank, encode it and upsert it into the cache.
    fn build_and_store(&self, morton: u64, level: u32) -> Result<(Subtree, Vec<u8>)> {
        let subtree = if self.config.is_max_rank(level) {
            self.build_max_rank(morton, level)?
        } else {
            self.build_level(morton, level, level)?
        };
        let bytes = codec::encode(&subtree)?;
        self.cache.put(morton, level, &bytes)?;

        let (x, y) = morton::deinterleave(morton, level);
        log::info!(
            "Built subtree {}/{}/{} ({} tiles, {} with content, {} child subtrees)",
            level,
            x,
            y,
            subtree.tile_availability().cardinality(),
            subtree.content_availability().cardinality(),
            subtree.child_subtree_availability().cardinality()
        );
        Ok((subtree, bytes))
    }

    /// Deepest rank: one oracle query per leaf tile.
    fn build_max_rank(&self, morton: u64, level: u32) -> Result<Subtree> {
        let levels = self.config.subtree_levels as usize;
        if !self.exists(morton, level)? {
            log::debug!("Nothing under max rank {} at level {}", morton, level);
            return Ok(Subtree::empty(levels));
        }

        let depth = self.config.subtree_levels - 1;
        let leaf_level = level + depth;
        let leaf_count = 1usize << (2 * depth);
        let first_leaf = morton::first_descendant(morton, depth);

        let mut leaves = Bitset::new(leaf_count);
        for i in 0..leaf_count {
            if self.exists(first_leaf + i as u64, leaf_level)? {
                leaves.set(i, true);
            }
        }

        Subtree::new(
            Availability::generate_tile_availability(&leaves, leaf_count)?,
            Availability::generate_content_availability(
                &leaves,
                leaf_count,
                self.config.min_content_level(),
            )?,
            Availability::empty(levels, Topology::Children),
            levels,
        )
    }

    /// Subtree of tile `morton` at `level`, spanning the levels left in the
    /// rank rooted at `origin`.
    fn build_level(&self, morton: u64, level: u32, origin: u32) -> Result<Subtree> {
        let remaining = self.config.subtree_levels - (level - origin);
        if !self.exists(morton, level)? {
            log::debug!("Nothing under tile {} at level {}", morton, level);
            return Ok(Subtree::empty(remaining as usize));
        }

        if remaining > 1 {
            let parts = (0..4)
                .map(|q| self.build_level(morton::child_index(morton, q), level + 1, origin))
                .collect::<Result<Vec<_>>>()?;
            return Subtree::concatenate_rank(&parts);
        }

        // Last level of the rank: the children are roots of the next rank
        let parts = (0..4)
            .map(|q| self.resolve_rank(morton::child_index(morton, q), level + 1)?.simplify())
            .collect::<Result<Vec<_>>>()?;
        Subtree::concatenate_rank(&parts)?.simplify()
    }

    fn exists(&self, morton: u64, level: u32) -> Result<bool> {
        let bounds = TileBounds::from_morton(morton, level).to_degrees();
        self.oracle.exists(&bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MAX_SUBTREE_LEVELS;
    use crate::store::cache::MemoryBlobCache;
    use crate::store::oracle::FootprintIndex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Oracle that counts queries and answers with a fixed value.
    struct CountingOracle {
        answer: bool,
        calls: AtomicUsize,
    }

    impl CountingOracle {
        fn new(answer: bool) -> Arc<Self> {
            Arc::new(Self { answer, calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ExistenceOracle for CountingOracle {
        fn exists(&self, _bounds: &TileBounds) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer)
        }
    }

    /// Oracle that counts queries and delegates to a footprint index.
    struct CountingFootprints {
        index: FootprintIndex,
        calls: AtomicUsize,
    }

    impl ExistenceOracle for CountingFootprints {
        fn exists(&self, bounds: &TileBounds) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.index.exists(bounds)
        }
    }

    fn store(
        config: SubtreeConfig,
        oracle: Arc<dyn ExistenceOracle>,
    ) -> (SubtreeStore, Arc<MemoryBlobCache>) {
        let cache = Arc::new(MemoryBlobCache::unbounded());
        let store = SubtreeStore::new(config, oracle, cache.clone()).unwrap();
        (store, cache)
    }

    fn json_of(bytes: &[u8]) -> serde_json::Value {
        let json_length = u64::from_le_bytes(bytes[8..16].try_into().unwrap()) as usize;
        serde_json::from_slice(&bytes[24..24 + json_length]).unwrap()
    }

    #[test]
    fn test_rejects_non_rank_root() {
        let (store, cache) = store(SubtreeConfig::new(0, 7, 4).unwrap(), CountingOracle::new(true));

        let err = store.get_subtree(2, 0, 0).unwrap_err();
        assert!(matches!(err, Error::NotRankRoot { level: 2 }));
        assert!(matches!(store.get_subtree(8, 0, 0), Err(Error::NotRankRoot { level: 8 })));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_rejects_tile_outside_level() {
        let (store, _) = store(SubtreeConfig::new(0, 3, 2).unwrap(), CountingOracle::new(true));
        assert!(store.get_subtree(2, 4, 0).unwrap_err().is_precondition());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = SubtreeConfig { min_level: 0, max_level: 4, subtree_levels: 2, reload_subtrees: false };
        let cache: Arc<dyn BlobCache> = Arc::new(MemoryBlobCache::unbounded());
        let result = SubtreeStore::new(config, CountingOracle::new(true), cache);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_oversized_rank() {
        let config = SubtreeConfig { min_level: 0, max_level: 31, subtree_levels: 32, reload_subtrees: false };
        let oracle = CountingOracle::new(false);
        let cache: Arc<dyn BlobCache> = Arc::new(MemoryBlobCache::unbounded());
        let result = SubtreeStore::new(config, oracle.clone(), cache);
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn test_widest_rank_decodes() {
        let config = SubtreeConfig::new(0, MAX_SUBTREE_LEVELS - 1, MAX_SUBTREE_LEVELS).unwrap();
        let (store, _) = store(config, CountingOracle::new(false));
        let subtree = store.decode_subtree(0, 0, 0).unwrap();
        assert_eq!(subtree, Subtree::empty(MAX_SUBTREE_LEVELS as usize));
    }

    #[test]
    fn test_empty_region_short_circuits() {
        let oracle = CountingOracle::new(false);
        let (store, _) = store(SubtreeConfig::new(0, 3, 4).unwrap(), oracle.clone());

        let bytes = store.get_subtree(0, 0, 0).unwrap();
        assert_eq!(oracle.calls(), 1);

        let json = json_of(&bytes);
        assert_eq!(json["tileAvailability"], serde_json::json!({ "constant": 0 }));
        assert_eq!(json["contentAvailability"][0], serde_json::json!({ "constant": 0 }));
        assert_eq!(json["childSubtreeAvailability"], serde_json::json!({ "constant": 0 }));
        assert_eq!(json["bufferViews"].as_array().unwrap().len(), 0);
        assert_eq!(json["buffers"][0]["byteLength"], 0);
    }

    #[test]
    fn test_max_rank_queries_every_leaf() {
        let oracle = CountingOracle::new(true);
        let (store, _) = store(SubtreeConfig::new(0, 3, 4).unwrap(), oracle.clone());

        let subtree = store.decode_subtree(0, 0, 0).unwrap();
        // Root footprint plus 4^3 leaves
        assert_eq!(oracle.calls(), 1 + 64);
        assert!(subtree.tile_availability().is_full());
        assert!(subtree.content_availability().is_full());
        assert!(subtree.child_subtree_availability().is_empty());
    }

    #[test]
    fn test_cached_subtree_is_reused() {
        let oracle = CountingOracle::new(true);
        let (store, cache) = store(SubtreeConfig::new(0, 3, 2).unwrap(), oracle.clone());

        let first = store.get_subtree(0, 0, 0).unwrap();
        let calls = oracle.calls();
        let second = store.get_subtree(0, 0, 0).unwrap();

        assert_eq!(first, second);
        assert_eq!(oracle.calls(), calls);
        assert_eq!(cache.get(0, 0).unwrap(), Some(first));
    }

    #[test]
    fn test_reload_bypasses_cache() {
        let oracle = CountingOracle::new(true);
        let config = SubtreeConfig::new(0, 3, 4).unwrap().with_reload(true);
        let (store, _) = store(config, oracle.clone());

        let first = store.get_subtree(0, 0, 0).unwrap();
        let second = store.get_subtree(0, 0, 0).unwrap();
        assert_eq!(first, second);
        assert_eq!(oracle.calls(), 2 * 65);
    }

    #[test]
    fn test_two_ranks_everything_present() {
        let oracle = CountingOracle::new(true);
        let (store, cache) = store(SubtreeConfig::new(0, 3, 2).unwrap(), oracle.clone());

        let root = store.decode_subtree(0, 0, 0).unwrap();
        // Level 0, four level-1 tiles, then 16 max ranks of 1 + 4 queries each
        assert_eq!(oracle.calls(), 1 + 4 + 16 * 5);
        assert!(root.tile_availability().is_full());
        assert!(root.content_availability().is_empty());
        assert!(root.child_subtree_availability().is_full());

        // Every child rank was persisted along the way
        assert_eq!(cache.len(), 17);
        for child in 0..16u64 {
            assert!(cache.contains(child, 2));
        }
    }

    #[test]
    fn test_two_ranks_single_footprint() {
        let oracle = Arc::new(CountingFootprints {
            index: FootprintIndex::new(vec![TileBounds::new(10.0, 11.0, 10.0, 11.0)]),
            calls: AtomicUsize::new(0),
        });
        let (store, cache) = store(SubtreeConfig::new(0, 3, 2).unwrap(), oracle.clone());

        let root = store.decode_subtree(0, 0, 0).unwrap();
        // Root, four level-1 tiles, four child ranks, four leaves of the only live one
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1 + 4 + 4 + 4);

        // The footprint lies in level-1 tile (1, 1) and level-2 tile (2, 2)
        assert_eq!(root.tile_availability().to_bitset().iter_ones().collect::<Vec<_>>(), vec![0, 4]);
        assert_eq!(
            root.child_subtree_availability().to_bitset().iter_ones().collect::<Vec<_>>(),
            vec![12]
        );
        assert!(root.content_availability().is_empty());

        assert_eq!(cache.len(), 5);
        let child = store.decode_subtree(2, 2, 2).unwrap();
        assert_eq!(child.tile_availability().to_bitset().iter_ones().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(child.content_availability().cardinality(), 2);
        // Served from the cache, no new queries
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 13);
    }

    #[test]
    fn test_corrupt_child_blob_is_rebuilt() {
        let oracle = CountingOracle::new(true);
        let (store, cache) = store(SubtreeConfig::new(0, 3, 2).unwrap(), oracle.clone());
        cache.put(0, 2, b"not a subtree").unwrap();

        let root = store.decode_subtree(0, 0, 0).unwrap();
        assert!(root.child_subtree_availability().is_full());

        let rebuilt = cache.get(0, 2).unwrap().unwrap();
        assert!(codec::decode(&rebuilt, 2).unwrap().tile_availability().is_full());
    }

    #[test]
    fn test_single_level_ranks() {
        let oracle = CountingOracle::new(true);
        let (store, _) = store(SubtreeConfig::new(0, 2, 1).unwrap(), oracle.clone());

        let root = store.decode_subtree(0, 0, 0).unwrap();
        assert_eq!(root.levels(), 1);
        assert!(root.tile_availability().is_available());
        assert!(root.child_subtree_availability().is_full());

        let leaf_rank = store.decode_subtree(2, 3, 3).unwrap();
        assert!(leaf_rank.tile_availability().is_full());
        assert!(leaf_rank.child_subtree_availability().is_empty());
    }

    #[test]
    fn test_oracle_failure_propagates() {
        let failing = |_: &TileBounds| -> Result<bool> { Err(Error::storage("database unavailable")) };
        let (store, cache) = store(SubtreeConfig::new(0, 3, 2).unwrap(), Arc::new(failing));

        assert!(matches!(store.get_subtree(0, 0, 0), Err(Error::Storage(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_requests_build_once() {
        let oracle = CountingOracle::new(true);
        let (store, _) = store(SubtreeConfig::new(0, 3, 4).unwrap(), oracle.clone());
        let store = Arc::new(store);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.get_subtree(0, 0, 0).unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(oracle.calls(), 65);
    }
}
