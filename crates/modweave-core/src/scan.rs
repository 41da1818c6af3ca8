//! Metadata scanner: what each workshop item actually contains on disk.

use modweave_schema::{parse_descriptor_file, ModDescriptor, PackageRecord, Registry, WorkshopId};
use modweave_store::{walk_files, ContentLayout, DESCRIPTOR_FILE};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Script substrings that mark a mod as touching core game systems.
pub const CORE_TOKENS: &[&str] = &[
    "Events.",
    "getPlayer",
    "getCore",
    "getWorld",
    "getCell",
    "getGameTime",
    "getSandboxOptions",
    "SandboxVars",
    "ModData",
    "ScriptManager",
    "InventoryItemFactory",
    "sendServerCommand",
    "sendClientCommand",
    "LuaEventManager",
    "isServer",
    "isClient",
    "ProceduralDistributions",
    "SuburbsDistributions",
    "getSpecificPlayer",
    "getActivatedMods",
];

/// Script substrings that mark a mod as touching the user interface.
pub const UI_TOKENS: &[&str] = &[
    "ISPanel",
    "ISButton",
    "ISUIElement",
    "ISCollapsableWindow",
    "ISContextMenu",
    "ISToolTip",
    "ISRichTextPanel",
    "ISTextEntryBox",
    "ISTickBox",
    "ISComboBox",
    "ISModalDialog",
    "ISScrollingListBox",
    "getTextManager",
    "UIFont",
    "drawText",
    "drawRect",
];

const MAPS_MARKER: &str = "/media/maps/";
const VEHICLES_MARKER: &str = "/media/scripts/vehicles/";
const LOTHEADER_SUFFIX: &str = ".lotheader";

/// What one workshop item directory contains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub workshop_id: WorkshopId,
    pub exists: bool,
    /// One per package id, first descriptor in path order wins.
    pub descriptors: Vec<ModDescriptor>,
    pub has_maps: bool,
    pub has_vehicles: bool,
    /// Distinct [`CORE_TOKENS`] referenced by any script.
    pub core_tokens: usize,
    /// Distinct [`UI_TOKENS`] referenced by any script.
    pub ui_tokens: usize,
    pub tiledef_numbers: BTreeSet<u32>,
    pub map_cells: BTreeSet<(i64, i64)>,
}

impl ScanResult {
    fn absent(workshop_id: &WorkshopId) -> Self {
        Self {
            workshop_id: workshop_id.clone(),
            ..Self::default()
        }
    }

    pub fn descriptor(&self, id: &str) -> Option<&ModDescriptor> {
        self.descriptors.iter().find(|d| d.id == *id)
    }

    pub fn declares(&self, id: &str) -> bool {
        self.descriptor(id).is_some()
    }

    pub fn contributes_resources(&self) -> bool {
        self.has_maps || self.has_vehicles
    }
}

/// Scan results keyed by workshop id.
pub type Scans = BTreeMap<WorkshopId, ScanResult>;

/// `<x>_<y>.lotheader` → `(x, y)`.
fn map_cell(file_name: &str) -> Option<(i64, i64)> {
    let stem = file_name.strip_suffix(LOTHEADER_SUFFIX)?;
    let (x, y) = stem.split_once('_')?;
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(x) || !digits(y) {
        return None;
    }
    Some((x.parse().ok()?, y.parse().ok()?))
}

fn count_tokens(path: &Path, core: &mut BTreeSet<&'static str>, ui: &mut BTreeSet<&'static str>) {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!("skipping unreadable script {}: {e}", path.display());
            return;
        }
    };
    let text = String::from_utf8_lossy(&bytes);
    for line in text.lines() {
        core.extend(CORE_TOKENS.iter().filter(|t| line.contains(**t)));
        ui.extend(UI_TOKENS.iter().filter(|t| line.contains(**t)));
    }
}

pub fn scan_unit(layout: &ContentLayout, workshop_id: &WorkshopId) -> ScanResult {
    let mut result = ScanResult::absent(workshop_id);
    if !layout.unit_exists(workshop_id) {
        return result;
    }
    let unit_dir = layout.unit_dir(workshop_id);
    result.exists = true;

    let files = match walk_files(&unit_dir) {
        Ok(files) => files,
        Err(e) => {
            warn!("cannot walk {}: {e}", unit_dir.display());
            return result;
        }
    };

    let mut core = BTreeSet::new();
    let mut ui = BTreeSet::new();
    for path in &files {
        let Ok(rel) = path.strip_prefix(&unit_dir) else { continue };
        let rel = format!("/{}", rel.to_string_lossy().replace('\\', "/"));
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

        if rel.contains(MAPS_MARKER) {
            result.has_maps = true;
            if let Some(cell) = map_cell(name) {
                result.map_cells.insert(cell);
            }
        }
        if rel.contains(VEHICLES_MARKER) {
            result.has_vehicles = true;
        }

        if name == DESCRIPTOR_FILE {
            match parse_descriptor_file(path) {
                Ok(Some(descriptor)) => {
                    if !result.declares(&descriptor.id) {
                        result
                            .tiledef_numbers
                            .extend(descriptor.tiledefs.iter().map(|t| t.file_number));
                        result.descriptors.push(descriptor);
                    }
                }
                Ok(None) => debug!("descriptor without id: {}", path.display()),
                Err(e) => warn!("skipping descriptor {}: {e}", path.display()),
            }
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("lua"))
        {
            count_tokens(path, &mut core, &mut ui);
        }
    }
    result.core_tokens = core.len();
    result.ui_tokens = ui.len();

    debug!(
        "scanned {workshop_id}: {} descriptors, maps={}, vehicles={}, core={}, ui={}",
        result.descriptors.len(),
        result.has_maps,
        result.has_vehicles,
        result.core_tokens,
        result.ui_tokens
    );
    result
}

/// Scan every unit of the registry.
pub fn scan_registry(layout: &ContentLayout, registry: &Registry) -> Scans {
    let scans: Scans = registry
        .mods
        .iter()
        .map(|entry| (entry.workshop_id.clone(), scan_unit(layout, &entry.workshop_id)))
        .collect();
    let present = scans.values().filter(|s| s.exists).count();
    info!("scanned {} workshop items, {present} on disk", scans.len());
    scans
}

fn fill_gap(target: &mut String, value: &str) {
    if target.is_empty() && !value.is_empty() {
        value.clone_into(target);
    }
}

/// Merge scanned descriptors into package records by id. Existing non-empty
/// fields are kept. New records start disabled unless their unit is in
/// `fresh_units` and had no records at all before this call. Returns how
/// many records were created.
pub fn enrich_registry(
    registry: &mut Registry,
    scans: &Scans,
    fresh_units: &BTreeSet<WorkshopId>,
) -> usize {
    let mut created = 0;
    for entry in &mut registry.mods {
        let Some(scan) = scans.get(&entry.workshop_id).filter(|s| s.exists) else {
            continue;
        };
        let fresh = entry.mods.is_empty() && fresh_units.contains(&entry.workshop_id);

        for descriptor in &scan.descriptors {
            let record = match entry.mods.iter().position(|p| p.id == descriptor.id) {
                Some(i) => &mut entry.mods[i],
                None => {
                    let mut record = PackageRecord::placeholder(descriptor.id.clone());
                    record.enabled = fresh;
                    entry.mods.push(record);
                    created += 1;
                    let last = entry.mods.len() - 1;
                    &mut entry.mods[last]
                }
            };
            fill_gap(&mut record.name, &descriptor.name);
            fill_gap(&mut record.version_min, &descriptor.version_min);
            fill_gap(&mut record.pzversion, &descriptor.pz_version);
            if record.requires.is_empty() && !descriptor.requires.is_empty() {
                record.requires.clone_from(&descriptor.requires);
            }
        }
        if entry.name.is_empty() {
            if let Some(first) = scan.descriptors.first() {
                fill_gap(&mut entry.name, &first.name);
            }
        }
    }
    if created > 0 {
        info!("scanner added {created} package records");
    }
    created
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn missing_unit_is_absent_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let scan = scan_unit(&ContentLayout::new(dir.path()), &WorkshopId::from("404"));
        assert!(!scan.exists);
        assert!(scan.descriptors.is_empty());
    }

    #[test]
    fn scan_collects_descriptors_resources_and_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("100/mods/Town");
        write(
            &root.join("mod.info"),
            "name=Town\nid=Town\nrequire=\\Lib, Lib, Tiles\ntiledef=town_tiles 310\n",
        );
        write(&root.join("media/maps/Town/30_40.lotheader"), "");
        write(&root.join("media/maps/Town/map.info"), "");
        write(
            &root.join("media/lua/client/ui.lua"),
            "local p = ISPanel:new()\nlocal q = ISPanel:new()\nEvents.OnGameStart.Add(f)\n",
        );
        write(&root.join("media/lua/server/s.lua"), "if isServer() then getPlayer() end\n");

        let scan = scan_unit(&ContentLayout::new(dir.path()), &WorkshopId::from("100"));
        assert!(scan.exists);
        assert!(scan.has_maps);
        assert!(!scan.has_vehicles);
        assert_eq!(scan.map_cells.iter().copied().collect::<Vec<_>>(), vec![(30, 40)]);
        assert_eq!(scan.tiledef_numbers.iter().copied().collect::<Vec<_>>(), vec![310]);
        assert_eq!(scan.descriptors.len(), 1);
        assert_eq!(scan.descriptors[0].requires, vec!["Lib", "Tiles"]);
        assert_eq!(scan.core_tokens, 3);
        assert_eq!(scan.ui_tokens, 1);
    }

    #[test]
    fn vehicles_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("100/mods/Car/mod.info"), "id=Car\n");
        write(&dir.path().join("100/mods/Car/media/scripts/vehicles/car.txt"), "");
        let scan = scan_unit(&ContentLayout::new(dir.path()), &WorkshopId::from("100"));
        assert!(scan.has_vehicles);
        assert!(scan.contributes_resources());
    }

    #[test]
    fn map_cell_names() {
        assert_eq!(map_cell("12_7.lotheader"), Some((12, 7)));
        assert_eq!(map_cell("a_7.lotheader"), None);
        assert_eq!(map_cell("12_7.lotpack"), None);
        assert_eq!(map_cell("127.lotheader"), None);
    }

    fn scans_for(dir: &Path, registry: &Registry) -> Scans {
        scan_registry(&ContentLayout::new(dir), registry)
    }

    #[test]
    fn enrichment_fills_gaps_only() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("100/mods/A/mod.info"),
            "id=A\nname=Scanned\nrequire=B\nversionMin=41.78\n",
        );
        let mut reg = Registry::from_json_str(
            r#"{"mods":[{"workshopId":"100","mods":[
                {"id":"A","enabled":true,"name":"Kept","requires":[]}
            ]}]}"#,
        )
        .unwrap();
        let scans = scans_for(dir.path(), &reg);
        let created = enrich_registry(&mut reg, &scans, &BTreeSet::new());
        assert_eq!(created, 0);
        let a = reg.entry("100").unwrap().package("A").unwrap();
        assert_eq!(a.name, "Kept");
        assert_eq!(a.requires, vec!["B"]);
        assert_eq!(a.version_min, "41.78");
        assert!(a.enabled);
    }

    #[test]
    fn scanned_records_start_disabled_except_in_fresh_units() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("100/mods/A/mod.info"), "id=A\n");
        write(&dir.path().join("100/mods/Extra/mod.info"), "id=Extra\n");
        write(&dir.path().join("200/mods/New/mod.info"), "id=New\n");
        let mut reg = Registry::from_json_str(
            r#"{"mods":[
                {"workshopId":"100","mods":[{"id":"A","enabled":true}]},
                {"workshopId":"200","mods":[]}
            ]}"#,
        )
        .unwrap();
        let scans = scans_for(dir.path(), &reg);
        let fresh: BTreeSet<WorkshopId> = [WorkshopId::from("200")].into_iter().collect();
        assert_eq!(enrich_registry(&mut reg, &scans, &fresh), 2);
        assert!(!reg.entry("100").unwrap().package("Extra").unwrap().enabled);
        assert!(reg.entry("200").unwrap().package("New").unwrap().enabled);
    }
}
