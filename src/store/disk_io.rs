//! Subtree blob compression and disk I/O

use std::io;
use std::path::{Path, PathBuf};

use crate::core::{Error, Result};
use crate::store::cache::BlobCache;

/// Get the file path for a subtree blob
pub fn blob_path(base_dir: &Path, morton: u64, level: u32) -> PathBuf {
    // One directory per level keeps deep levels from flooding a single directory
    // Format: base_dir/level_{level}/subtree_{morton}.rks
    base_dir
        .join(format!("level_{}", level))
        .join(format!("subtree_{}.rks", morton))
}

/// Compress an encoded subtree using LZ4
pub fn compress_blob(bytes: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(bytes)
}

/// Decompress an encoded subtree
pub fn decompress_blob(data: &[u8]) -> io::Result<Vec<u8>> {
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("LZ4 decompression failed: {}", e)))
}

/// Save a blob to disk (compressed)
///
/// The blob is written to a sibling temp file and renamed into place, so a
/// reader never observes a partially written file.
pub fn save_blob(base_dir: &Path, morton: u64, level: u32, bytes: &[u8]) -> io::Result<()> {
    let path = blob_path(base_dir, morton, level);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension(format!("rks.{}.tmp", std::process::id()));
    std::fs::write(&tmp, compress_blob(bytes))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Load a blob from disk (if it exists)
pub fn load_blob(base_dir: &Path, morton: u64, level: u32) -> io::Result<Option<Vec<u8>>> {
    let path = blob_path(base_dir, morton, level);

    let compressed = match std::fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    decompress_blob(&compressed).map(Some)
}

/// Delete a blob from disk
pub fn delete_blob(base_dir: &Path, morton: u64, level: u32) -> io::Result<()> {
    match std::fs::remove_file(blob_path(base_dir, morton, level)) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Check if a blob exists on disk
pub fn blob_exists(base_dir: &Path, morton: u64, level: u32) -> bool {
    blob_path(base_dir, morton, level).exists()
}

/// Blob cache backed by LZ4-compressed files under a base directory
#[derive(Debug, Clone)]
pub struct DiskBlobCache {
    base_dir: PathBuf,
}

impl DiskBlobCache {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl BlobCache for DiskBlobCache {
    fn get(&self, morton: u64, level: u32) -> Result<Option<Vec<u8>>> {
        load_blob(&self.base_dir, morton, level).map_err(|e| {
            Error::storage(format!(
                "failed to read {}: {}",
                blob_path(&self.base_dir, morton, level).display(),
                e
            ))
        })
    }

    fn put(&self, morton: u64, level: u32, bytes: &[u8]) -> Result<()> {
        save_blob(&self.base_dir, morton, level, bytes).map_err(|e| {
            Error::storage(format!(
                "failed to write {}: {}",
                blob_path(&self.base_dir, morton, level).display(),
                e
            ))
        })
    }
}
