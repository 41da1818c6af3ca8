//! Persisted artifacts and on-disk layout for modweave.
//!
//! This crate provides the storage layer: atomic replacement of the registry
//! and run artifacts (`write_atomic`), the import-feed reset, the exclusive
//! `RegistryLock` held by write runs, and the `ContentLayout` / `RunLayout`
//! path conventions for workshop content and run outputs.

pub mod layout;
pub mod lock;
pub mod persist;

pub use layout::{walk_files, ContentLayout, RunLayout, DESCRIPTOR_FILE};
pub use lock::RegistryLock;
pub use persist::{
    clear_import_feed, read_import_feed, save_registry, write_atomic, write_json, write_summary,
};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// POSIX does not guarantee a rename survives a crash until its parent
/// directory has been synced.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to persist {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("schema error: {0}")]
    Schema(#[from] modweave_schema::SchemaError),
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
}
