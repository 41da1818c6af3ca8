use modweave_schema::{ImportBlock, ModId, Registry, WorkshopId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Per unit, the package ids an import block asked to enable exclusively.
pub type Selection = BTreeMap<WorkshopId, Vec<ModId>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    pub imported_workshop_ids: Vec<WorkshopId>,
    pub imported_mod_ids: Vec<ModId>,
    pub selection: Selection,
}

impl ImportOutcome {
    /// Units imported without a selection that still have no package records.
    /// The scanner enables every package it discovers in these.
    pub fn fresh_units(&self, registry: &Registry) -> BTreeSet<WorkshopId> {
        self.imported_workshop_ids
            .iter()
            .filter(|wid| !self.selection.contains_key(*wid))
            .filter(|wid| registry.entry(wid).is_none_or(|e| e.mods.is_empty()))
            .cloned()
            .collect()
    }
}

fn push_unique<T: PartialEq + Clone>(list: &mut Vec<T>, item: &T) {
    if !list.contains(item) {
        list.push(item.clone());
    }
}

/// Merge import blocks into the registry. Units are appended when unknown,
/// selected ids get disabled placeholder records, and nothing is ever
/// disabled here; see [`apply_explicit_selection`] for that.
pub fn merge_import(registry: &mut Registry, blocks: &[ImportBlock]) -> ImportOutcome {
    let mut outcome = ImportOutcome::default();

    for block in blocks {
        let (entry, created) = registry.ensure_entry(&block.workshop_id);
        if created {
            debug!("new workshop item {}", block.workshop_id);
        }
        push_unique(&mut outcome.imported_workshop_ids, &block.workshop_id);

        if !block.has_selection() {
            continue;
        }
        let subset = outcome
            .selection
            .entry(block.workshop_id.clone())
            .or_default();
        for id in &block.mod_ids {
            entry.ensure_package(id);
            push_unique(subset, id);
            push_unique(&mut outcome.imported_mod_ids, id);
        }
    }

    if !blocks.is_empty() {
        info!(
            "imported {} workshop items, {} explicit mod ids",
            outcome.imported_workshop_ids.len(),
            outcome.imported_mod_ids.len()
        );
    }
    outcome
}

/// Enable exactly the selected ids of each selected unit and disable the rest
/// of that unit. Units without a selection are untouched.
pub fn apply_explicit_selection(registry: &mut Registry, selection: &Selection) {
    for (workshop_id, ids) in selection {
        let (entry, _) = registry.ensure_entry(workshop_id);
        for id in ids {
            entry.ensure_package(id);
        }
        for package in &mut entry.mods {
            package.enabled = ids.contains(&package.id);
        }
        debug!("{workshop_id}: enabled exactly {} mods", ids.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modweave_schema::parse_import_feed;

    fn sample_registry() -> Registry {
        Registry::from_json_str(
            r#"{"mods":[
                {"workshopId":"100","mods":[
                    {"id":"A","enabled":true},
                    {"id":"B","enabled":true}
                ]}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn merge_appends_units_and_placeholders() {
        let mut reg = sample_registry();
        let blocks = parse_import_feed("Workshop ID: 200\nMod ID: C\n---\nWorkshop ID: 100\n---\n");
        let outcome = merge_import(&mut reg, &blocks);

        assert_eq!(outcome.imported_workshop_ids, vec![WorkshopId::from("200"), WorkshopId::from("100")]);
        assert_eq!(outcome.imported_mod_ids, vec![ModId::from("C")]);
        assert_eq!(reg.mods.len(), 2);
        assert_eq!(reg.mods[1].workshop_id.as_str(), "200");
        let c = reg.entry("200").unwrap().package("C").unwrap();
        assert!(!c.enabled);
        assert!(reg.entry("100").unwrap().package("A").unwrap().enabled);
    }

    #[test]
    fn merge_never_disables() {
        let mut reg = sample_registry();
        let blocks = parse_import_feed("Workshop ID: 100\nMod ID: A\n");
        merge_import(&mut reg, &blocks);
        assert!(reg.entry("100").unwrap().package("B").unwrap().enabled);
    }

    #[test]
    fn merge_is_idempotent() {
        let feed = "Workshop ID: 100\nMod ID: B\nWorkshop ID: 300\nMod ID: X\nMod ID: Y\n";
        let blocks = parse_import_feed(feed);
        let mut reg = sample_registry();
        let first = merge_import(&mut reg, &blocks);
        let snapshot = reg.clone();
        let second = merge_import(&mut reg, &blocks);
        assert_eq!(first.selection, second.selection);
        assert_eq!(reg, snapshot);
    }

    #[test]
    fn repeated_blocks_union_their_subsets() {
        let mut reg = Registry::default();
        let blocks =
            parse_import_feed("Workshop ID: 100\nMod ID: A\n---\nWorkshop ID: 100\nMod ID: B\nMod ID: A\n---\n");
        let outcome = merge_import(&mut reg, &blocks);
        assert_eq!(
            outcome.selection[&WorkshopId::from("100")],
            vec![ModId::from("A"), ModId::from("B")]
        );
        assert_eq!(outcome.imported_workshop_ids.len(), 1);
    }

    #[test]
    fn explicit_selection_enables_exactly_the_subset() {
        let mut reg = sample_registry();
        let blocks = parse_import_feed("Workshop ID: 100\nMod ID: B\nMod ID: New\n---\n");
        let outcome = merge_import(&mut reg, &blocks);
        apply_explicit_selection(&mut reg, &outcome.selection);

        let entry = reg.entry("100").unwrap();
        assert!(!entry.package("A").unwrap().enabled);
        assert!(entry.package("B").unwrap().enabled);
        assert!(entry.package("New").unwrap().enabled);
    }

    #[test]
    fn fresh_units_have_no_selection_and_no_records() {
        let mut reg = sample_registry();
        let blocks = parse_import_feed("Workshop ID: 100\n---\nWorkshop ID: 200\n---\nWorkshop ID: 300\nMod ID: Z\n---\n");
        let outcome = merge_import(&mut reg, &blocks);
        let fresh = outcome.fresh_units(&reg);
        assert_eq!(fresh.into_iter().collect::<Vec<_>>(), vec![WorkshopId::from("200")]);
    }
}
