//! Resolution pipeline for modweave.
//!
//! This crate merges the import feed into the registry, scans workshop
//! content for descriptors and capability signals, orders enabled mods with
//! a heuristic topological sort, and optionally cross-checks that order with
//! the runtime probe. The [`Engine`] runs those stages in sequence and
//! persists the result.

pub mod conflicts;
pub mod engine;
pub mod merge;
pub mod presence;
pub mod report;
pub mod resolve;
pub mod roles;
pub mod scan;

pub use conflicts::{map_cell_conflicts, tiledef_conflicts};
pub use engine::{order_digest, Engine, ProbeOptions, RunOptions, RunOutcome};
pub use merge::{apply_explicit_selection, merge_import, ImportOutcome, Selection};
pub use presence::{
    autofix, classify_presence, PresenceCounts, PresenceEntry, PresenceReport, PresenceStatus,
    AUTOFIX_REASON,
};
pub use report::ProbeReport;
pub use resolve::{apply_order, resolve, Resolution};
pub use roles::{classify, Role, RoleInfo};
pub use scan::{enrich_registry, scan_registry, scan_unit, ScanResult, Scans};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("registry not found: {0}")]
    RegistryNotFound(String),
    #[error("schema error: {0}")]
    Schema(#[from] modweave_schema::SchemaError),
    #[error("cannot read import feed {path}: {source}")]
    ImportFeed {
        path: String,
        #[source]
        source: modweave_store::StoreError,
    },
    #[error("invalid invocation: {0}")]
    InvalidInvocation(String),
    #[error("store error: {0}")]
    Store(#[from] modweave_store::StoreError),
    #[error("probe error: {0}")]
    Probe(#[from] modweave_probe::ProbeError),
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: modweave_store::StoreError,
    },
}
