//! Seeding the raw execution order from a previous probe run.

use crate::candidates::CandidateFile;
use crate::ProbeError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriorReport {
    #[serde(default)]
    safe_order: Vec<String>,
}

/// Read the `safeOrder` of a prior JSON probe report. A report that does not
/// exist yet seeds nothing.
pub fn load_seed(path: &Path) -> Result<Vec<String>, ProbeError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("prior probe report {} not found, not seeding", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(ProbeError::Io(e)),
    };
    let prior: PriorReport = serde_json::from_slice(&bytes).map_err(|source| ProbeError::Seed {
        path: path.display().to_string(),
        source,
    })?;
    debug!("seeding from {} prior entries", prior.safe_order.len());
    Ok(prior.safe_order)
}

/// Reorder `files` in place: the slots occupied by files named in `prior`
/// are refilled with those same files in prior order. Files the prior run
/// never saw keep their slots.
pub fn apply_seed(files: &mut [CandidateFile], prior: &[String]) {
    let mut rank: HashMap<&str, usize> = HashMap::new();
    for (i, key) in prior.iter().enumerate() {
        rank.entry(key.as_str()).or_insert(i);
    }

    let slots: Vec<usize> = files
        .iter()
        .enumerate()
        .filter(|(_, f)| rank.contains_key(f.key.as_str()))
        .map(|(i, _)| i)
        .collect();
    let mut seeded: Vec<CandidateFile> = slots.iter().map(|&i| files[i].clone()).collect();
    seeded.sort_by_key(|f| rank.get(f.key.as_str()).copied().unwrap_or(usize::MAX));

    for (slot, file) in slots.into_iter().zip(seeded) {
        files[slot] = file;
    }
}
