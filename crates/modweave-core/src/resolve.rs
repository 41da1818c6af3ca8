//! Dependency graph resolution: a deterministic topological order of every
//! enabled package, plus the diagnostics gathered on the way.

use crate::roles::{classify, RoleInfo};
use crate::scan::Scans;
use modweave_schema::{DuplicateProvider, ModId, Registry, WorkshopId};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Enabled ids in load order; cycle members come last.
    pub order: Vec<ModId>,
    pub positions: BTreeMap<ModId, usize>,
    /// The unit whose record of an id was indexed.
    pub providers: BTreeMap<ModId, WorkshopId>,
    /// Prerequisites of each indexed id, after alias resolution.
    pub prerequisites: BTreeMap<ModId, BTreeSet<ModId>>,
    /// Raw requirement token → ids that asked for it, first-seen order.
    pub missing: BTreeMap<String, Vec<ModId>>,
    pub cycle_members: Vec<ModId>,
    pub duplicates: Vec<DuplicateProvider>,
    pub roles: BTreeMap<ModId, RoleInfo>,
}

impl Resolution {
    pub fn has_cycles(&self) -> bool {
        !self.cycle_members.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }
}

struct Node<'a> {
    id: &'a ModId,
    unit: &'a WorkshopId,
    priority: i64,
    requires: &'a [String],
}

/// Ready-set ordering: priority desc, score desc, first-seen rank asc, id asc.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ReadyKey {
    priority: Reverse<i64>,
    score: Reverse<i64>,
    rank: usize,
    id: ModId,
}

pub fn resolve(registry: &Registry, scans: &Scans) -> Resolution {
    let mut resolution = Resolution::default();

    let mut nodes: Vec<Node<'_>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for entry in &registry.mods {
        for record in entry.mods.iter().filter(|p| p.enabled) {
            if let Some(&kept) = index.get(record.id.as_str()) {
                warn!(
                    "{} is enabled in both {} and {}; keeping the first",
                    record.id, nodes[kept].unit, entry.workshop_id
                );
                resolution.duplicates.push(DuplicateProvider {
                    id: record.id.clone(),
                    kept_unit: nodes[kept].unit.clone(),
                    duplicate_unit: entry.workshop_id.clone(),
                });
                continue;
            }
            index.insert(record.id.as_str(), nodes.len());
            nodes.push(Node {
                id: &record.id,
                unit: &entry.workshop_id,
                priority: record.priority.unwrap_or(0),
                requires: &record.requires,
            });
        }
    }

    let n = nodes.len();
    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut in_degree = vec![0usize; n];
    for (i, node) in nodes.iter().enumerate() {
        let mut seen = BTreeSet::new();
        for token in node.requires {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let target = registry.resolve_alias(token);
            match index.get(target) {
                Some(&j) if j == i => {}
                Some(&j) => {
                    if seen.insert(j) && dependents[j].insert(i) {
                        in_degree[i] += 1;
                    }
                }
                None => {
                    let requesters = resolution.missing.entry(token.to_owned()).or_default();
                    if !requesters.contains(node.id) {
                        requesters.push(node.id.clone());
                    }
                }
            }
        }
        resolution.prerequisites.insert(
            node.id.clone(),
            seen.iter().map(|&j| nodes[j].id.clone()).collect(),
        );
        resolution
            .providers
            .insert(node.id.clone(), node.unit.clone());
    }

    let scores: Vec<i64> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let info = classify(dependents[i].len(), scans.get(node.unit));
            let score = info.score;
            resolution.roles.insert(node.id.clone(), info);
            score
        })
        .collect();

    let key = |i: usize| ReadyKey {
        priority: Reverse(nodes[i].priority),
        score: Reverse(scores[i]),
        rank: i,
        id: nodes[i].id.clone(),
    };
    let mut ready: BTreeSet<ReadyKey> = (0..n).filter(|&i| in_degree[i] == 0).map(key).collect();
    let mut placed = vec![false; n];
    while let Some(next) = ready.pop_first() {
        let i = next.rank;
        placed[i] = true;
        resolution.order.push(next.id);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.insert(key(d));
            }
        }
    }

    let mut cycle: Vec<ModId> = (0..n)
        .filter(|&i| !placed[i])
        .map(|i| nodes[i].id.clone())
        .collect();
    cycle.sort();
    if !cycle.is_empty() {
        warn!("dependency cycle among {} mods", cycle.len());
    }
    resolution.order.extend(cycle.iter().cloned());
    resolution.cycle_members = cycle;

    resolution.positions = resolution
        .order
        .iter()
        .enumerate()
        .map(|(pos, id)| (id.clone(), pos))
        .collect();

    info!(
        "resolved {} mods: {} missing requirements, {} in cycles, {} duplicates",
        resolution.order.len(),
        resolution.missing.len(),
        resolution.cycle_members.len(),
        resolution.duplicates.len()
    );
    resolution
}

/// Reorder registry units and their packages to follow `resolution`.
///
/// A unit ranks at the smallest position among its indexed packages; units
/// without one go last, ties keep registry order. Inside a unit: indexed
/// packages by position, then enabled duplicates, then disabled packages,
/// each group in its previous relative order.
pub fn apply_order(registry: &mut Registry, resolution: &Resolution) {
    let positioned = |unit: &WorkshopId, id: &ModId, enabled: bool| -> Option<usize> {
        if !enabled || resolution.providers.get(id) != Some(unit) {
            return None;
        }
        resolution.positions.get(id).copied()
    };

    for entry in &mut registry.mods {
        let unit = entry.workshop_id.clone();
        let mut keyed: Vec<_> = std::mem::take(&mut entry.mods)
            .into_iter()
            .enumerate()
            .map(|(original, record)| {
                let group = match positioned(&unit, &record.id, record.enabled) {
                    Some(pos) => (0, pos),
                    None if record.enabled => (1, original),
                    None => (2, original),
                };
                (group, record)
            })
            .collect();
        keyed.sort_by_key(|(group, _)| *group);
        entry.mods = keyed.into_iter().map(|(_, record)| record).collect();
    }

    let mut units: Vec<_> = std::mem::take(&mut registry.mods)
        .into_iter()
        .enumerate()
        .map(|(original, entry)| {
            let rank = entry
                .mods
                .iter()
                .filter_map(|p| positioned(&entry.workshop_id, &p.id, p.enabled))
                .min()
                .unwrap_or(usize::MAX);
            ((rank, original), entry)
        })
        .collect();
    units.sort_by_key(|(key, _)| *key);
    registry.mods = units.into_iter().map(|(_, entry)| entry).collect();
    debug!("registry reordered: {} units", registry.mods.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(json: &str) -> Registry {
        Registry::from_json_str(json).unwrap()
    }

    fn ids(list: &[ModId]) -> Vec<&str> {
        list.iter().map(ModId::as_str).collect()
    }

    fn units(reg: &Registry) -> Vec<&str> {
        reg.mods.iter().map(|e| e.workshop_id.as_str()).collect()
    }

    #[test]
    fn prerequisite_comes_first_and_units_follow() {
        let mut reg = registry(
            r#"{"mods":[
                {"workshopId":"100","mods":[{"id":"A","enabled":true,"requires":["B"]}]},
                {"workshopId":"200","mods":[{"id":"B","enabled":true}]}
            ]}"#,
        );
        let res = resolve(&reg, &Scans::new());
        assert_eq!(ids(&res.order), vec!["B", "A"]);
        apply_order(&mut reg, &res);
        assert_eq!(units(&reg), vec!["200", "100"]);
    }

    #[test]
    fn cycle_members_are_appended_sorted() {
        let reg = registry(
            r#"{"mods":[
                {"workshopId":"1","mods":[{"id":"Y","enabled":true,"requires":["X"]}]},
                {"workshopId":"2","mods":[{"id":"X","enabled":true,"requires":["Y"]}]},
                {"workshopId":"3","mods":[{"id":"Free","enabled":true}]}
            ]}"#,
        );
        let res = resolve(&reg, &Scans::new());
        assert!(res.has_cycles());
        assert_eq!(ids(&res.cycle_members), vec!["X", "Y"]);
        assert_eq!(ids(&res.order), vec!["Free", "X", "Y"]);
    }

    #[test]
    fn duplicate_enabled_id_is_reported_and_excluded() {
        let mut reg = registry(
            r#"{"mods":[
                {"workshopId":"100","mods":[{"id":"shared","enabled":true}]},
                {"workshopId":"200","mods":[{"id":"shared","enabled":true},{"id":"own","enabled":true}]}
            ]}"#,
        );
        let res = resolve(&reg, &Scans::new());
        assert_eq!(
            res.duplicates,
            vec![DuplicateProvider {
                id: ModId::from("shared"),
                kept_unit: WorkshopId::from("100"),
                duplicate_unit: WorkshopId::from("200"),
            }]
        );
        assert_eq!(ids(&res.order), vec!["shared", "own"]);
        apply_order(&mut reg, &res);
        let second: Vec<_> = reg.mods[1].mods.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(second, vec!["own", "shared"]);
    }

    #[test]
    fn missing_is_keyed_by_raw_token_but_looked_up_by_alias() {
        let reg = registry(
            r#"{"mods":[
                {"workshopId":"1","mods":[
                    {"id":"A","enabled":true,"requires":["OldLib","Ghost"]},
                    {"id":"C","enabled":true,"requires":["Ghost","A","C"]}
                ]},
                {"workshopId":"2","mods":[{"id":"NewLib","enabled":true}]}
            ],
            "overrides":{"requireAliases":{"OldLib":"NewLib","Ghost":"Phantom"}}}"#,
        );
        let res = resolve(&reg, &Scans::new());
        assert_eq!(res.missing.keys().collect::<Vec<_>>(), vec!["Ghost"]);
        assert_eq!(ids(&res.missing["Ghost"]), vec!["A", "C"]);
        assert!(res.prerequisites[&ModId::from("A")].contains(&ModId::from("NewLib")));
        assert!(!res.prerequisites[&ModId::from("C")].contains(&ModId::from("C")));
        assert!(res.position("NewLib").unwrap() < res.position("A").unwrap());
    }

    #[test]
    fn priority_then_score_then_rank() {
        let reg = registry(
            r#"{"mods":[
                {"workshopId":"1","mods":[
                    {"id":"plain","enabled":true},
                    {"id":"lib","enabled":true},
                    {"id":"urgent","enabled":true,"priority":5},
                    {"id":"user","enabled":true,"requires":["lib"]}
                ]}
            ]}"#,
        );
        let res = resolve(&reg, &Scans::new());
        assert_eq!(ids(&res.order), vec!["urgent", "lib", "plain", "user"]);
    }

    #[test]
    fn disabled_records_sink_within_their_unit() {
        let mut reg = registry(
            r#"{"mods":[
                {"workshopId":"1","mods":[
                    {"id":"off","enabled":false},
                    {"id":"dep","enabled":true,"requires":["base"]},
                    {"id":"base","enabled":true}
                ]},
                {"workshopId":"2","mods":[{"id":"idle","enabled":false}]}
            ]}"#,
        );
        let res = resolve(&reg, &Scans::new());
        apply_order(&mut reg, &res);
        let first: Vec<_> = reg.mods[0].mods.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(first, vec!["base", "dep", "off"]);
        assert_eq!(units(&reg), vec!["1", "2"]);
    }

    #[test]
    fn resolution_is_deterministic() {
        let reg = registry(
            r#"{"mods":[
                {"workshopId":"1","mods":[{"id":"c","enabled":true},{"id":"a","enabled":true}]},
                {"workshopId":"2","mods":[{"id":"b","enabled":true,"requires":["a"]}]}
            ]}"#,
        );
        let first = resolve(&reg, &Scans::new());
        for _ in 0..5 {
            let again = resolve(&reg, &Scans::new());
            assert_eq!(again.order, first.order);
            assert_eq!(again.positions, first.positions);
        }
    }
}
