use crate::{fsync_dir, StoreError};
use modweave_schema::{Registry, RunSummary, IMPORT_FEED_TEMPLATE};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Replace `dest` with `content` atomically: stage into a temporary file in
/// the same directory, sync it, rename it over `dest`, then sync the directory.
/// Readers see either the old file or the new one, never a partial write.
pub fn write_atomic(dest: &Path, content: &[u8]) -> Result<(), StoreError> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| StoreError::Persist {
        path: dest.display().to_string(),
        source: e.error,
    })?;
    fsync_dir(&dir)?;

    debug!("wrote {} ({} bytes)", dest.display(), content.len());
    Ok(())
}

pub fn write_json(dest: &Path, value: &impl Serialize) -> Result<(), StoreError> {
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');
    write_atomic(dest, content.as_bytes())
}

pub fn save_registry(dest: &Path, registry: &Registry) -> Result<(), StoreError> {
    let content = registry.to_json_pretty()?;
    write_atomic(dest, content.as_bytes())
}

pub fn write_summary(dest: &Path, summary: &RunSummary) -> Result<(), StoreError> {
    write_json(dest, summary)
}

/// Read the import feed. A feed that does not exist yet is an empty feed.
pub fn read_import_feed(path: &Path) -> Result<String, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(StoreError::Io(e)),
    }
}

/// Reset the import feed to the header-only template once it has been merged.
pub fn clear_import_feed(path: &Path) -> Result<(), StoreError> {
    write_atomic(path, IMPORT_FEED_TEMPLATE.as_bytes())
}
