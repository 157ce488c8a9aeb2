//! Subtree generator binary: pre-generates every rank subtree to disk.
//!
//! Usage: cargo run --release --bin generate_subtrees -- --footprints <FILE> [OPTIONS]
//!
//! Options:
//!   --footprints <FILE>     JSON array of [lon_min, lat_min, lon_max, lat_max] in degrees
//!   --config <FILE>         Rank config JSON (default: built-in defaults)
//!   --max-level <N>         Override max_level
//!   --subtree-levels <N>    Override subtree_levels
//!   --output <DIR>          Output directory (default: "assets/tdtiles")
//!   --jobs <N>              Max parallel subtree builds (default: 4)
//!
//! Output structure:
//!   <output>/
//!     tileset.json            # Implicit-tiling tileset
//!     manifest.json           # Generation summary
//!     subtrees/               # Raw binary subtrees, one per rank root
//!       0.0.0.subtree
//!       ...
//!     cache/                  # LZ4 blob cache, reused by later runs
//!       level_0/subtree_0.rks
//!       ...

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde_json::json;

use tdtiles::core::{Error, Result, SubtreeConfig};
use tdtiles::math::{morton, TileCoord};
use tdtiles::store::{DiskBlobCache, FootprintIndex, SubtreeStore};
use tdtiles::subtree::codec;
use tdtiles::tileset::{expand_uri, implicit_tileset, TilesetOptions};

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let footprints_path = parse_str_arg(&args, "--footprints")
        .ok_or_else(|| Error::Config("--footprints <FILE> is required".into()))?;
    let output_dir = PathBuf::from(
        parse_str_arg(&args, "--output").unwrap_or_else(|| "assets/tdtiles".to_string()),
    );
    let jobs = parse_usize_arg(&args, "--jobs").unwrap_or(4);

    let mut config = match parse_str_arg(&args, "--config") {
        Some(path) => SubtreeConfig::from_json_file(Path::new(&path))?,
        None => SubtreeConfig::default(),
    };
    if let Some(max_level) = parse_u32_arg(&args, "--max-level") {
        config.max_level = max_level;
    }
    if let Some(subtree_levels) = parse_u32_arg(&args, "--subtree-levels") {
        config.subtree_levels = subtree_levels;
    }
    config.validate()?;

    // Limit rayon's thread pool to bound concurrent oracle queries
    rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build_global()
        .map_err(|e| Error::Config(format!("failed to configure thread pool: {}", e)))?;

    let options = TilesetOptions::default();
    let tileset = implicit_tileset(&config, &options)?;

    let index = FootprintIndex::from_json_file(Path::new(&footprints_path))?;

    println!("=== Subtree Generator ===");
    println!("Footprints:     {} ({} boxes)", footprints_path, index.len());
    println!("Levels:         {}..={}", config.min_level, config.max_level);
    println!("Subtree levels: {} ({} ranks)", config.subtree_levels, config.rank_amount());
    println!("Jobs:           {} parallel", jobs);
    println!("Output:         {}", output_dir.display());
    println!();

    let cache = DiskBlobCache::new(output_dir.join("cache"));
    let store = SubtreeStore::new(config.clone(), Arc::new(index), Arc::new(cache))?;

    let start = Instant::now();
    let written = AtomicUsize::new(0);
    let total_bytes = AtomicUsize::new(0);

    // Walk the rank pyramid one wave of rank roots at a time
    let mut frontier = vec![TileCoord::new(config.min_level, 0, 0)];
    let mut wave = 0;
    while !frontier.is_empty() {
        println!("  Wave {}: {} subtrees at level {}", wave, frontier.len(), frontier[0].level);

        let children: Vec<Vec<TileCoord>> = frontier
            .par_iter()
            .map(|&coord| -> Result<Vec<TileCoord>> {
                let bytes = store.get_subtree(coord.level, coord.x, coord.y)?;
                let subtree = codec::decode(&bytes, config.subtree_levels as usize)?;

                let path = output_dir.join(expand_uri(&options.subtree_uri, coord));
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, &bytes)?;
                written.fetch_add(1, Ordering::Relaxed);
                total_bytes.fetch_add(bytes.len(), Ordering::Relaxed);

                let child_level = coord.level + config.subtree_levels;
                if !config.is_rank_root(child_level) {
                    return Ok(Vec::new());
                }
                let first = morton::first_descendant(coord.morton(), config.subtree_levels);
                Ok(subtree
                    .child_subtree_availability()
                    .level(0)
                    .iter_ones()
                    .map(|i| TileCoord::from_morton(first + i as u64, child_level))
                    .collect())
            })
            .collect::<Result<_>>()?;

        frontier = children.into_iter().flatten().collect();
        wave += 1;
    }

    let elapsed = start.elapsed();
    let count = written.load(Ordering::Relaxed);
    let bytes = total_bytes.load(Ordering::Relaxed);

    std::fs::create_dir_all(&output_dir)?;
    std::fs::write(output_dir.join("tileset.json"), tileset.to_json_pretty()?)?;

    let manifest = json!({
        "min_level": config.min_level,
        "max_level": config.max_level,
        "subtree_levels": config.subtree_levels,
        "subtree_count": count,
        "total_bytes": bytes,
        "waves": wave,
        "seconds": elapsed.as_secs_f64(),
    });
    let manifest = serde_json::to_string_pretty(&manifest)
        .map_err(|e| Error::Config(format!("failed to serialize manifest: {}", e)))?;
    std::fs::write(output_dir.join("manifest.json"), manifest)?;

    println!();
    println!("=== Generation Complete ===");
    println!("Subtrees: {} in {:.1}s ({:.1} KB)", count, elapsed.as_secs_f64(), bytes as f64 / 1024.0);
    println!("Output:   {}", output_dir.display());
    Ok(())
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
