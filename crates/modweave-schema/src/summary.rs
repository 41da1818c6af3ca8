use crate::types::{ModId, WorkshopId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Warn,
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Ok => write!(f, "ok"),
            RunStatus::Warn => write!(f, "warn"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

/// An enabled package id that was already provided by an earlier unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateProvider {
    pub id: ModId,
    pub kept_unit: WorkshopId,
    pub duplicate_unit: WorkshopId,
}

/// A tiledef file number declared by more than one active unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TiledefConflict {
    pub file_number: u32,
    pub units: Vec<WorkshopId>,
}

/// A map cell (`x_y.lotheader`) provided by more than one active unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MapCellConflict {
    pub x: i64,
    pub y: i64,
    pub units: Vec<WorkshopId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolverHints {
    pub duplicate_providers: Vec<DuplicateProvider>,
    pub library_ids: Vec<ModId>,
    pub resource_provider_ids: Vec<ModId>,
    pub tiledef_conflicts: Vec<TiledefConflict>,
    pub map_cell_conflicts: Vec<MapCellConflict>,
    /// Units with no package records that are not on disk either.
    pub untracked_units: Vec<WorkshopId>,
    pub auto_enabled_ids: Vec<ModId>,
}

/// The last-run summary artifact written next to the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub status: RunStatus,
    pub message: String,
    pub generated_at: String,
    pub imported_workshop_ids: Vec<WorkshopId>,
    pub imported_mod_ids: Vec<ModId>,
    pub missing_requirements: Vec<String>,
    pub cycle_members: Vec<ModId>,
    pub enabled_workshop_ids: Vec<WorkshopId>,
    pub enabled_mod_ids: Vec<ModId>,
    /// blake3 over the ordered enabled ids; equal digests mean equal orders.
    pub order_digest: String,
    pub hints: ResolverHints,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RunStatus::Warn).unwrap(), "\"warn\"");
        assert_eq!(RunStatus::Error.to_string(), "error");
    }

    #[test]
    fn summary_uses_camel_case_keys() {
        let summary = RunSummary {
            status: RunStatus::Ok,
            message: "resolved 1 mod".to_owned(),
            generated_at: "2026-01-01T00:00:00+00:00".to_owned(),
            imported_workshop_ids: vec![WorkshopId::from("100")],
            imported_mod_ids: Vec::new(),
            missing_requirements: Vec::new(),
            cycle_members: Vec::new(),
            enabled_workshop_ids: vec![WorkshopId::from("100")],
            enabled_mod_ids: vec![ModId::from("A")],
            order_digest: "abc".to_owned(),
            hints: ResolverHints::default(),
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"importedWorkshopIds\":[\"100\"]"));
        assert!(json.contains("\"enabledModIds\":[\"A\"]"));
        assert!(json.contains("\"duplicateProviders\":[]"));
    }
}
