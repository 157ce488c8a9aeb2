//! Subtree construction, caching and async loading

pub mod oracle;
pub mod cache;
pub mod disk_io;
pub mod build_lock;
pub mod subtree_store;
pub mod loader;

pub use oracle::{ExistenceOracle, FootprintIndex};
pub use cache::{BlobCache, BlobKey, MemoryBlobCache};
pub use disk_io::{
    DiskBlobCache,
    compress_blob, decompress_blob,
    save_blob, load_blob, delete_blob, blob_exists,
    blob_path,
};
pub use build_lock::BuildLocks;
pub use subtree_store::SubtreeStore;
pub use loader::{LoaderConfig, LoadRequest, LoadResult, SubtreeLoader};
