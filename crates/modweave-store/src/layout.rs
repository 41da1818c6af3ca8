use std::fs;
use std::path::{Path, PathBuf};

/// File name of a package descriptor inside workshop content.
pub const DESCRIPTOR_FILE: &str = "mod.info";
const SUMMARY_FILE: &str = "last-run.json";

/// Directory conventions of the workshop content root: one directory per
/// workshop id, with mods somewhere below it.
#[derive(Debug, Clone)]
pub struct ContentLayout {
    root: PathBuf,
}

impl ContentLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn unit_dir(&self, workshop_id: &str) -> PathBuf {
        self.root.join(workshop_id)
    }

    pub fn unit_exists(&self, workshop_id: &str) -> bool {
        self.unit_dir(workshop_id).is_dir()
    }

    /// `media/lua` relative to a mod root.
    #[inline]
    pub fn lua_dir(mod_root: &Path) -> PathBuf {
        mod_root.join("media").join("lua")
    }
}

/// Every regular file below `dir`, recursively, in sorted path order.
/// Symlinked directories are not followed. A missing `dir` yields nothing.
pub fn walk_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if dir.is_dir() {
        collect_files(dir, &mut out)?;
    }
    out.sort();
    Ok(out)
}

fn collect_files(current: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
            out.push(path);
        }
    }
    Ok(())
}

/// Paths of the artifacts one run reads and writes.
#[derive(Debug, Clone)]
pub struct RunLayout {
    registry: PathBuf,
    import_feed: PathBuf,
    summary: PathBuf,
}

impl RunLayout {
    pub fn new(registry: impl Into<PathBuf>, import_feed: impl Into<PathBuf>) -> Self {
        let registry = registry.into();
        let summary = registry.with_file_name(SUMMARY_FILE);
        Self {
            registry,
            import_feed: import_feed.into(),
            summary,
        }
    }

    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<PathBuf>) -> Self {
        self.summary = summary.into();
        self
    }

    #[inline]
    pub fn registry(&self) -> &Path {
        &self.registry
    }

    #[inline]
    pub fn import_feed(&self) -> &Path {
        &self.import_feed
    }

    #[inline]
    pub fn summary(&self) -> &Path {
        &self.summary
    }

    /// Advisory lock file guarding read-modify-write of the registry.
    pub fn lock_file(&self) -> PathBuf {
        let mut name = self
            .registry
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".lock");
        self.registry.with_file_name(name)
    }
}
