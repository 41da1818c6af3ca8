//! Registry model, import feed, package descriptors, and run configuration for modweave.
//!
//! This crate defines the schema layer: the persisted mod registry (`Registry`,
//! `RegistryEntry`, `PackageRecord`), the plain-text import feed grammar
//! (`parse_import_feed`), the `mod.info` descriptor grammar
//! (`parse_descriptor_str`), the TOML run configuration (`RunConfig`), and the
//! last-run summary model (`RunSummary`).

pub mod config;
pub mod descriptor;
pub mod import;
pub mod registry;
pub mod summary;
pub mod types;

pub use config::{load_config, parse_config_str, OutputSettings, ProbeSettings, RunConfig};
pub use descriptor::{parse_descriptor_file, parse_descriptor_str, ModDescriptor, TileDef};
pub use import::{parse_import_feed, ImportBlock, IMPORT_FEED_TEMPLATE};
pub use registry::{Overrides, PackageRecord, Registry, RegistryEntry};
pub use summary::{
    DuplicateProvider, MapCellConflict, ResolverHints, RunStatus, RunSummary, TiledefConflict,
};
pub use types::{ModId, WorkshopId};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse registry: {0}")]
    ParseRegistry(#[from] serde_json::Error),
    #[error("failed to parse config: {0}")]
    ParseConfig(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub(crate) fn read_lossy(path: &std::path::Path) -> Result<String, SchemaError> {
    let bytes = std::fs::read(path).map_err(|source| SchemaError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
