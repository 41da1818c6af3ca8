//! Which Lua files the probe executes, and in what raw order.

use crate::env::module_name;
use crate::ProbeError;
use modweave_schema::{parse_descriptor_file, ModId, Registry, WorkshopId};
use modweave_store::{walk_files, ContentLayout, DESCRIPTOR_FILE};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Pseudo-file that stub content is attributed to.
pub const STUB_FILE: &str = "<stub>";

/// Directory next to versioned mod roots that B42 loads alongside them.
const COMMON_DIR: &str = "common";

/// Load order of the `media/lua` categories.
const CATEGORIES: &[&str] = &["shared", "client", "server"];

/// One Lua script of an enabled package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// `<workshopId>/<path relative to the unit directory>`.
    pub key: String,
    pub path: PathBuf,
    pub workshop_id: WorkshopId,
    pub mod_id: ModId,
    /// Name the file answers to through `require`.
    pub module: String,
}

/// `/`-joined path of `path` below `base`.
pub(crate) fn relative_key(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

pub(crate) fn is_lua(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("lua"))
}

/// Mod roots per package id declared under a unit directory. A root inside a
/// version directory also contributes a sibling `common/` directory, ahead
/// of the root itself.
fn package_roots(unit_dir: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>, ProbeError> {
    let mut roots: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in walk_files(unit_dir)? {
        if path.file_name().and_then(|n| n.to_str()) != Some(DESCRIPTOR_FILE) {
            continue;
        }
        let descriptor = match parse_descriptor_file(&path) {
            Ok(Some(d)) => d,
            Ok(None) => continue,
            Err(e) => {
                warn!("skipping descriptor {}: {e}", path.display());
                continue;
            }
        };
        let Some(root) = path.parent() else { continue };

        let slot = roots.entry(descriptor.id.into_inner()).or_default();
        let common = root
            .parent()
            .map(|p| p.join(COMMON_DIR))
            .filter(|c| c.is_dir() && c != root);
        for dir in common.into_iter().chain(std::iter::once(root.to_path_buf())) {
            if !slot.contains(&dir) {
                slot.push(dir);
            }
        }
    }
    Ok(roots)
}

/// Lua scripts of one mod root: `shared`, `client`, `server`, then any other
/// directory, sorted by path within each. Returns `(path, module)` pairs.
fn lua_files(mod_root: &Path) -> Result<Vec<(PathBuf, String)>, ProbeError> {
    let lua_dir = ContentLayout::lua_dir(mod_root);
    let mut files: Vec<(usize, PathBuf, String)> = Vec::new();
    for path in walk_files(&lua_dir)?.into_iter().filter(|p| is_lua(p)) {
        let Some(rel) = relative_key(&lua_dir, &path) else { continue };
        let (rank, module) = match rel.split_once('/') {
            Some((first, rest)) => match CATEGORIES.iter().position(|c| first.eq_ignore_ascii_case(c)) {
                Some(rank) => (rank, module_name(rest)),
                None => (CATEGORIES.len(), module_name(&rel)),
            },
            None => (CATEGORIES.len(), module_name(&rel)),
        };
        files.push((rank, path, module));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    Ok(files.into_iter().map(|(_, path, module)| (path, module)).collect())
}

/// Collect the candidate files of every enabled package, in registry order.
///
/// `max_units` bounds how many units with enabled packages on disk are
/// visited; `max_files` truncates the final list. A unit or mod root that
/// cannot be read is skipped with a warning.
pub fn discover_candidates(
    layout: &ContentLayout,
    registry: &Registry,
    max_units: Option<usize>,
    max_files: Option<usize>,
) -> Vec<CandidateFile> {
    let mut files = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut units = 0usize;

    for entry in &registry.mods {
        if !entry.has_enabled() {
            continue;
        }
        if !layout.unit_exists(&entry.workshop_id) {
            debug!("unit {} has no content on disk", entry.workshop_id);
            continue;
        }
        let unit_dir = layout.unit_dir(&entry.workshop_id);
        if max_units.is_some_and(|max| units >= max) {
            debug!("unit limit {units} reached");
            break;
        }
        units += 1;

        let roots = match package_roots(&unit_dir) {
            Ok(roots) => roots,
            Err(e) => {
                warn!("skipping unit {}: {e}", entry.workshop_id);
                continue;
            }
        };
        for record in entry.mods.iter().filter(|p| p.enabled) {
            let Some(mod_roots) = roots.get(record.id.as_str()) else {
                debug!("{} has no descriptor under {}", record.id, unit_dir.display());
                continue;
            };
            for root in mod_roots {
                let scripts = match lua_files(root) {
                    Ok(scripts) => scripts,
                    Err(e) => {
                        warn!("skipping scripts of {} under {}: {e}", record.id, root.display());
                        continue;
                    }
                };
                for (path, module) in scripts {
                    if !seen.insert(path.clone()) {
                        continue;
                    }
                    let Some(rel) = relative_key(&unit_dir, &path) else { continue };
                    files.push(CandidateFile {
                        key: format!("{}/{rel}", entry.workshop_id),
                        path,
                        workshop_id: entry.workshop_id.clone(),
                        mod_id: record.id.clone(),
                        module,
                    });
                }
            }
        }
    }

    if let Some(max) = max_files {
        files.truncate(max);
    }
    debug!("{} candidate files across {units} units", files.len());
    files
}

/// Every `*.lua` file under a stub root, sorted.
pub fn stub_files(root: &Path) -> Result<Vec<PathBuf>, ProbeError> {
    Ok(walk_files(root)?.into_iter().filter(|p| is_lua(p)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn registry(json: &str) -> Registry {
        Registry::from_json_str(json).unwrap()
    }

    #[test]
    fn categories_load_shared_client_server_then_other() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("100/mods/A");
        write(&root.join("mod.info"), "id=A\n");
        for rel in [
            "media/lua/server/s.lua",
            "media/lua/client/c.lua",
            "media/lua/shared/z.lua",
            "media/lua/shared/a/b.lua",
            "media/lua/extra/x.lua",
            "media/lua/shared/readme.txt",
        ] {
            write(&root.join(rel), "");
        }
        let reg = registry(
            r#"{"mods":[{"workshopId":"100","mods":[{"id":"A","enabled":true}]}]}"#,
        );
        let files = discover_candidates(&ContentLayout::new(dir.path()), &reg, None, None);
        let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "100/mods/A/media/lua/shared/a/b.lua",
                "100/mods/A/media/lua/shared/z.lua",
                "100/mods/A/media/lua/client/c.lua",
                "100/mods/A/media/lua/server/s.lua",
                "100/mods/A/media/lua/extra/x.lua",
            ]
        );
        assert_eq!(files[0].module, "a/b");
        assert_eq!(files[4].module, "extra/x");
    }

    #[test]
    fn disabled_packages_and_missing_units_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("100/mods/A/mod.info"), "id=A\n");
        write(&dir.path().join("100/mods/A/media/lua/shared/a.lua"), "");
        write(&dir.path().join("100/mods/B/mod.info"), "id=B\n");
        write(&dir.path().join("100/mods/B/media/lua/shared/b.lua"), "");
        let reg = registry(
            r#"{"mods":[
                {"workshopId":"300","mods":[{"id":"Gone","enabled":true}]},
                {"workshopId":"100","mods":[{"id":"A","enabled":false},{"id":"B","enabled":true}]}
            ]}"#,
        );
        let files = discover_candidates(&ContentLayout::new(dir.path()), &reg, None, None);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].mod_id.as_str(), "B");
        assert_eq!(files[0].workshop_id.as_str(), "100");
    }

    #[test]
    fn common_sibling_is_loaded_before_version_root() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("100/mods/A");
        write(&base.join("42/mod.info"), "id=A\n");
        write(&base.join("42/media/lua/shared/v.lua"), "");
        write(&base.join("common/media/lua/shared/c.lua"), "");
        let reg = registry(
            r#"{"mods":[{"workshopId":"100","mods":[{"id":"A","enabled":true}]}]}"#,
        );
        let files = discover_candidates(&ContentLayout::new(dir.path()), &reg, None, None);
        let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "100/mods/A/common/media/lua/shared/c.lua",
                "100/mods/A/42/media/lua/shared/v.lua",
            ]
        );
    }

    #[test]
    fn limits_bound_units_and_files() {
        let dir = tempfile::tempdir().unwrap();
        for (wid, id) in [("100", "A"), ("200", "B")] {
            write(&dir.path().join(format!("{wid}/mods/{id}/mod.info")), &format!("id={id}\n"));
            write(&dir.path().join(format!("{wid}/mods/{id}/media/lua/shared/one.lua")), "");
            write(&dir.path().join(format!("{wid}/mods/{id}/media/lua/shared/two.lua")), "");
        }
        let reg = registry(
            r#"{"mods":[
                {"workshopId":"100","mods":[{"id":"A","enabled":true}]},
                {"workshopId":"200","mods":[{"id":"B","enabled":true}]}
            ]}"#,
        );
        let layout = ContentLayout::new(dir.path());
        assert_eq!(discover_candidates(&layout, &reg, Some(1), None).len(), 2);
        assert_eq!(discover_candidates(&layout, &reg, None, Some(3)).len(), 3);
        assert_eq!(discover_candidates(&layout, &reg, None, None).len(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_unit_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("100/mods/A/mod.info"), "id=A\n");
        write(&dir.path().join("100/mods/A/media/lua/shared/a.lua"), "");
        write(&dir.path().join("200/mods/B/mod.info"), "id=B\n");
        write(&dir.path().join("200/mods/B/media/lua/shared/b.lua"), "");
        let locked = dir.path().join("100/mods");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Permission bits do not bind this user.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let reg = registry(
            r#"{"mods":[
                {"workshopId":"100","mods":[{"id":"A","enabled":true}]},
                {"workshopId":"200","mods":[{"id":"B","enabled":true}]}
            ]}"#,
        );
        let files = discover_candidates(&ContentLayout::new(dir.path()), &reg, None, None);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let keys: Vec<_> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["200/mods/B/media/lua/shared/b.lua"]);
    }

    #[test]
    fn stub_files_are_lua_only() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("b.lua"), "");
        write(&dir.path().join("a/a.lua"), "");
        write(&dir.path().join("notes.md"), "");
        let files = stub_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a/a.lua"));
    }
}
