//! Content collisions between active units. These are warnings only; they
//! never influence the order.

use crate::scan::Scans;
use modweave_schema::{MapCellConflict, Registry, TiledefConflict, WorkshopId};
use std::collections::BTreeMap;
use tracing::warn;

/// Scans of units with at least one enabled package, in registry order.
fn active_scans<'a>(
    registry: &'a Registry,
    scans: &'a Scans,
) -> impl Iterator<Item = (&'a WorkshopId, &'a crate::scan::ScanResult)> {
    registry
        .mods
        .iter()
        .filter(|e| e.has_enabled())
        .filter_map(|e| scans.get(&e.workshop_id).map(|s| (&e.workshop_id, s)))
}

/// Tiledef file numbers declared by more than one active unit, by number.
pub fn tiledef_conflicts(registry: &Registry, scans: &Scans) -> Vec<TiledefConflict> {
    let mut claims: BTreeMap<u32, Vec<WorkshopId>> = BTreeMap::new();
    for (unit, scan) in active_scans(registry, scans) {
        for number in &scan.tiledef_numbers {
            claims.entry(*number).or_default().push(unit.clone());
        }
    }
    claims
        .into_iter()
        .filter(|(_, units)| units.len() > 1)
        .map(|(file_number, units)| {
            warn!("tiledef file number {file_number} claimed by {}", join(&units));
            TiledefConflict { file_number, units }
        })
        .collect()
}

/// Map cells provided by more than one active unit, by coordinate.
pub fn map_cell_conflicts(registry: &Registry, scans: &Scans) -> Vec<MapCellConflict> {
    let mut cells: BTreeMap<(i64, i64), Vec<WorkshopId>> = BTreeMap::new();
    for (unit, scan) in active_scans(registry, scans) {
        for cell in &scan.map_cells {
            cells.entry(*cell).or_default().push(unit.clone());
        }
    }
    cells
        .into_iter()
        .filter(|(_, units)| units.len() > 1)
        .map(|((x, y), units)| {
            warn!("map cell {x}_{y} provided by {}", join(&units));
            MapCellConflict { x, y, units }
        })
        .collect()
}

fn join(units: &[WorkshopId]) -> String {
    units
        .iter()
        .map(WorkshopId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
