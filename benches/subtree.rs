use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, black_box};

use tdtiles::core::SubtreeConfig;
use tdtiles::math::TileBounds;
use tdtiles::store::{MemoryBlobCache, SubtreeStore};
use tdtiles::subtree::{codec, Availability, Bitset, Subtree, Topology};

/// Max-rank subtree with roughly a third of its leaves present
fn sample_subtree(levels: usize) -> Subtree {
    let leaf_count = 1usize << (2 * (levels - 1));
    let leaves = Bitset::from_indices(leaf_count, (0..leaf_count).filter(|i| i % 3 == 0));
    Subtree::new(
        Availability::generate_tile_availability(&leaves, leaf_count).unwrap(),
        Availability::generate_content_availability(&leaves, leaf_count, 0).unwrap(),
        Availability::empty(levels, Topology::Children),
        levels,
    )
    .unwrap()
}

fn bench_encode(c: &mut Criterion) {
    let subtree = sample_subtree(6);

    c.bench_function("encode_6_levels", |b| {
        b.iter(|| codec::encode(black_box(&subtree)).unwrap());
    });
}

fn bench_decode(c: &mut Criterion) {
    let bytes = codec::encode(&sample_subtree(6)).unwrap();

    c.bench_function("decode_6_levels", |b| {
        b.iter(|| codec::decode(black_box(&bytes), 6).unwrap());
    });
}

fn bench_concatenate_rank(c: &mut Criterion) {
    let parts = [sample_subtree(4), sample_subtree(4), sample_subtree(4), sample_subtree(4)];

    c.bench_function("concatenate_rank_4_levels", |b| {
        b.iter(|| Subtree::concatenate_rank(black_box(&parts)).unwrap());
    });
}

fn bench_build_two_ranks(c: &mut Criterion) {
    // Northern hemisphere only
    let oracle = |b: &TileBounds| -> tdtiles::core::Result<bool> { Ok(b.lat_max > 0.0) };
    let config = SubtreeConfig::new(0, 5, 3).unwrap().with_reload(true);
    let store = SubtreeStore::new(config, Arc::new(oracle), Arc::new(MemoryBlobCache::unbounded())).unwrap();

    c.bench_function("build_two_ranks_3_levels", |b| {
        b.iter(|| store.get_subtree(black_box(0), 0, 0).unwrap());
    });
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_concatenate_rank,
    bench_build_two_ranks,
);
criterion_main!(benches);
