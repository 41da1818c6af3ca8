use crate::scan::ScanResult;
use serde::Serialize;

const LIBRARY_BONUS: i64 = 200;
const RESOURCE_BONUS: i64 = 80;
const PER_DEPENDENT: i64 = 10;
const DEPENDENT_CAP: usize = 20;
const CORE_TOKEN_CAP: usize = 20;
const UI_PENALTY: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Depended on by others and ships no maps or vehicles.
    Library,
    /// Ships maps or vehicles.
    ResourceProvider,
    Content,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Library => write!(f, "library"),
            Role::ResourceProvider => write!(f, "resource-provider"),
            Role::Content => write!(f, "content"),
        }
    }
}

/// Inferred role of one enabled package and the signals behind its score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleInfo {
    pub role: Role,
    pub dependents: usize,
    pub has_maps: bool,
    pub has_vehicles: bool,
    pub core_tokens: usize,
    pub ui_tokens: usize,
    pub score: i64,
}

fn capped(n: usize, cap: usize) -> i64 {
    i64::try_from(n.min(cap)).unwrap_or(0)
}

/// Classify a package from its dependent count and its unit's scan. A unit
/// that was never scanned contributes no signals.
pub fn classify(dependents: usize, scan: Option<&ScanResult>) -> RoleInfo {
    let has_maps = scan.is_some_and(|s| s.has_maps);
    let has_vehicles = scan.is_some_and(|s| s.has_vehicles);
    let core_tokens = scan.map_or(0, |s| s.core_tokens);
    let ui_tokens = scan.map_or(0, |s| s.ui_tokens);

    let role = if scan.is_some_and(ScanResult::contributes_resources) {
        Role::ResourceProvider
    } else if dependents > 0 {
        Role::Library
    } else {
        Role::Content
    };

    let mut score = match role {
        Role::Library => LIBRARY_BONUS,
        Role::ResourceProvider => RESOURCE_BONUS,
        Role::Content => 0,
    };
    score += PER_DEPENDENT * capped(dependents, DEPENDENT_CAP);
    score += capped(core_tokens, CORE_TOKEN_CAP);
    if ui_tokens > 0 && role == Role::Content {
        score -= UI_PENALTY;
    }

    RoleInfo {
        role,
        dependents,
        has_maps,
        has_vehicles,
        core_tokens,
        ui_tokens,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(maps: bool, vehicles: bool, core: usize, ui: usize) -> ScanResult {
        ScanResult {
            exists: true,
            has_maps: maps,
            has_vehicles: vehicles,
            core_tokens: core,
            ui_tokens: ui,
            ..ScanResult::default()
        }
    }

    #[test]
    fn library_needs_dependents_and_no_resources() {
        let info = classify(3, Some(&scan(false, false, 5, 0)));
        assert_eq!(info.role, Role::Library);
        assert_eq!(info.score, 200 + 30 + 5);
    }

    #[test]
    fn resources_win_over_library() {
        let info = classify(2, Some(&scan(true, false, 0, 0)));
        assert_eq!(info.role, Role::ResourceProvider);
        assert_eq!(info.score, 80 + 20);
        let info = classify(0, Some(&scan(false, true, 0, 4)));
        assert_eq!(info.role, Role::ResourceProvider);
        assert_eq!(info.score, 80);
    }

    #[test]
    fn caps_apply() {
        let info = classify(50, Some(&scan(false, false, 99, 0)));
        assert_eq!(info.score, 200 + 200 + 20);
    }

    #[test]
    fn ui_only_content_is_penalized() {
        let info = classify(0, Some(&scan(false, false, 2, 1)));
        assert_eq!(info.role, Role::Content);
        assert_eq!(info.score, 2 - 20);
    }

    #[test]
    fn unscanned_package_is_plain_content() {
        let info = classify(0, None);
        assert_eq!(info.role, Role::Content);
        assert_eq!(info.score, 0);
        assert_eq!(Role::ResourceProvider.to_string(), "resource-provider");
    }
}
