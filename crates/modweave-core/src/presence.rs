//! Whether each requirement of an enabled package is actually available.

use crate::scan::Scans;
use modweave_schema::{ModId, Registry, WorkshopId};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

/// Provenance reason stamped on records enabled by [`autofix`].
pub const AUTOFIX_REASON: &str = "required-by-enabled-mod";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresenceStatus {
    SatisfiedEnabled,
    PresentButNotEnabled,
    MissingOnDisk,
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PresenceStatus::SatisfiedEnabled => write!(f, "satisfied-enabled"),
            PresenceStatus::PresentButNotEnabled => write!(f, "present-but-not-enabled"),
            PresenceStatus::MissingOnDisk => write!(f, "missing-on-disk"),
        }
    }
}

/// One requirement of one enabled record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub requester: ModId,
    pub requester_unit: WorkshopId,
    pub token: String,
    /// The id after alias resolution.
    pub resolved: String,
    pub status: PresenceStatus,
    /// Units holding a disabled on-disk record of the id, in registry order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub provider_units: Vec<WorkshopId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceCounts {
    pub satisfied_enabled: usize,
    pub present_but_not_enabled: usize,
    pub missing_on_disk: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceReport {
    pub entries: Vec<PresenceEntry>,
}

impl PresenceReport {
    pub fn counts(&self) -> PresenceCounts {
        let mut counts = PresenceCounts::default();
        for entry in &self.entries {
            match entry.status {
                PresenceStatus::SatisfiedEnabled => counts.satisfied_enabled += 1,
                PresenceStatus::PresentButNotEnabled => counts.present_but_not_enabled += 1,
                PresenceStatus::MissingOnDisk => counts.missing_on_disk += 1,
            }
        }
        counts
    }

    pub fn with_status(&self, status: PresenceStatus) -> impl Iterator<Item = &PresenceEntry> {
        self.entries.iter().filter(move |e| e.status == status)
    }
}

/// Classify every requirement of every enabled record. Requirements are
/// alias-resolved and deduplicated per record; each one gets exactly one
/// status.
pub fn classify_presence(registry: &Registry, scans: &Scans) -> PresenceReport {
    let enabled: BTreeSet<&str> = registry
        .records()
        .filter(|(_, p)| p.enabled)
        .map(|(_, p)| p.id.as_str())
        .collect();

    let on_disk_providers = |id: &str| -> Vec<WorkshopId> {
        registry
            .records()
            .filter(|(unit, p)| {
                !p.enabled
                    && p.id == *id
                    && scans
                        .get(*unit)
                        .is_some_and(|s| s.exists && s.declares(id))
            })
            .map(|(unit, _)| unit.clone())
            .collect()
    };

    let mut report = PresenceReport::default();
    for (unit, record) in registry.records().filter(|(_, p)| p.enabled) {
        let mut seen = BTreeSet::new();
        for token in &record.requires {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let resolved = registry.resolve_alias(token);
            if !seen.insert(resolved) {
                continue;
            }
            let (status, providers) = if enabled.contains(resolved) {
                (PresenceStatus::SatisfiedEnabled, Vec::new())
            } else {
                let providers = on_disk_providers(resolved);
                if providers.is_empty() {
                    (PresenceStatus::MissingOnDisk, providers)
                } else {
                    (PresenceStatus::PresentButNotEnabled, providers)
                }
            };
            report.entries.push(PresenceEntry {
                requester: record.id.clone(),
                requester_unit: unit.clone(),
                token: token.to_owned(),
                resolved: resolved.to_owned(),
                status,
                provider_units: providers,
            });
        }
    }

    let counts = report.counts();
    info!(
        "presence: {} satisfied, {} present but disabled, {} missing on disk",
        counts.satisfied_enabled, counts.present_but_not_enabled, counts.missing_on_disk
    );
    report
}

/// Enable every on-disk record behind each `present-but-not-enabled`
/// requirement and stamp its provenance. Returns the ids enabled, once each,
/// in report order. Nothing else is touched.
pub fn autofix(registry: &mut Registry, report: &PresenceReport, now: &str) -> Vec<ModId> {
    let mut enabled = Vec::new();
    for entry in report.with_status(PresenceStatus::PresentButNotEnabled) {
        for unit in &entry.provider_units {
            let Some(record) = registry
                .entry_mut(unit)
                .and_then(|e| e.package_mut(&entry.resolved))
            else {
                continue;
            };
            if record.enabled {
                continue;
            }
            record.mark_added_automatically(AUTOFIX_REASON, now);
            info!(
                "auto-enabled {} in {unit} (required by {})",
                record.id, entry.requester
            );
            if !enabled.contains(&record.id) {
                enabled.push(record.id.clone());
            }
        }
    }
    enabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::ScanResult;
    use modweave_schema::parse_descriptor_str;

    fn scan_with(unit: &str, ids: &[&str]) -> (WorkshopId, ScanResult) {
        let descriptors = ids
            .iter()
            .map(|id| parse_descriptor_str(&format!("id={id}\n")).unwrap())
            .collect();
        (
            WorkshopId::from(unit),
            ScanResult {
                workshop_id: WorkshopId::from(unit),
                exists: true,
                descriptors,
                ..ScanResult::default()
            },
        )
    }

    fn registry() -> Registry {
        Registry::from_json_str(
            r#"{"mods":[
                {"workshopId":"1","mods":[
                    {"id":"Z","enabled":true,"requires":["W","Lib","Gone","Stale","W"]},
                    {"id":"Lib","enabled":true}
                ]},
                {"workshopId":"2","mods":[{"id":"W","enabled":false},{"id":"Stale","enabled":false}]}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn every_requirement_gets_one_status() {
        let reg = registry();
        let scans: Scans = [scan_with("2", &["W"])].into_iter().collect();
        let report = classify_presence(&reg, &scans);
        let statuses: Vec<_> = report
            .entries
            .iter()
            .map(|e| (e.token.as_str(), e.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("W", PresenceStatus::PresentButNotEnabled),
                ("Lib", PresenceStatus::SatisfiedEnabled),
                ("Gone", PresenceStatus::MissingOnDisk),
                ("Stale", PresenceStatus::MissingOnDisk),
            ]
        );
        assert_eq!(
            report.counts(),
            PresenceCounts {
                satisfied_enabled: 1,
                present_but_not_enabled: 1,
                missing_on_disk: 2,
            }
        );
    }

    #[test]
    fn autofix_flips_only_present_but_not_enabled() {
        let mut reg = registry();
        let scans: Scans = [scan_with("2", &["W"])].into_iter().collect();
        let report = classify_presence(&reg, &scans);
        let before = reg.clone();
        let enabled = autofix(&mut reg, &report, "2026-01-01T00:00:00Z");
        assert_eq!(enabled, vec![ModId::from("W")]);

        let w = reg.entry("2").unwrap().package("W").unwrap();
        assert!(w.enabled);
        assert_eq!(w.added_automatically, Some(true));
        assert_eq!(w.added_automatically_reason.as_deref(), Some(AUTOFIX_REASON));
        assert_eq!(w.added_automatically_at.as_deref(), Some("2026-01-01T00:00:00Z"));

        let stale = reg.entry("2").unwrap().package("Stale").unwrap();
        assert_eq!(stale, before.entry("2").unwrap().package("Stale").unwrap());
        assert_eq!(reg.mods[0], before.mods[0]);
    }

    #[test]
    fn autofix_enables_every_on_disk_copy() {
        let mut reg = Registry::from_json_str(
            r#"{"mods":[
                {"workshopId":"1","mods":[{"id":"Z","enabled":true,"requires":["W"]}]},
                {"workshopId":"2","mods":[{"id":"W","enabled":false}]},
                {"workshopId":"3","mods":[{"id":"W","enabled":false}]},
                {"workshopId":"4","mods":[{"id":"W","enabled":false}]}
            ]}"#,
        )
        .unwrap();
        let scans: Scans = [scan_with("2", &["W"]), scan_with("3", &["W"])]
            .into_iter()
            .collect();
        let report = classify_presence(&reg, &scans);
        assert_eq!(
            report.entries[0].provider_units,
            vec![WorkshopId::from("2"), WorkshopId::from("3")]
        );

        let enabled = autofix(&mut reg, &report, "2026-01-01T00:00:00Z");
        assert_eq!(enabled, vec![ModId::from("W")]);
        for unit in ["2", "3"] {
            let w = reg.entry(unit).unwrap().package("W").unwrap();
            assert!(w.enabled, "W in unit {unit} must be enabled");
            assert_eq!(w.added_automatically, Some(true));
        }
        // Not on disk for unit 4.
        assert!(!reg.entry("4").unwrap().package("W").unwrap().enabled);
    }

    #[test]
    fn aliases_apply_before_classification() {
        let reg = Registry::from_json_str(
            r#"{"mods":[{"workshopId":"1","mods":[
                {"id":"A","enabled":true,"requires":["Old"]},
                {"id":"New","enabled":true}
            ]}],
            "overrides":{"requireAliases":{"Old":"New"}}}"#,
        )
        .unwrap();
        let report = classify_presence(&reg, &Scans::new());
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].token, "Old");
        assert_eq!(report.entries[0].resolved, "New");
        assert_eq!(report.entries[0].status, PresenceStatus::SatisfiedEnabled);
    }
}
