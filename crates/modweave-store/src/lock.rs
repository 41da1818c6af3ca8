use crate::StoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive advisory lock held for the whole of a write run, so two runs
/// never interleave their read-modify-write of the same registry.
///
/// Acquisition blocks until any other holder lets go. The lock file itself
/// is left in place.
#[derive(Debug)]
pub struct RegistryLock {
    file: File,
    path: PathBuf,
}

impl RegistryLock {
    pub fn acquire(lock_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| StoreError::LockFailed(format!("{}: {e}", lock_path.display())))?;
        debug!("holding {}", lock_path.display());
        Ok(Self {
            file,
            path: lock_path.to_path_buf(),
        })
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            debug!("unlocking {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn other_handle(path: &Path) -> File {
        OpenOptions::new().write(true).open(path).unwrap()
    }

    #[test]
    fn acquire_creates_missing_parent_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("state/mods.json.lock");
        let _lock = RegistryLock::acquire(&lock_path).unwrap();
        assert!(lock_path.exists());
    }

    #[test]
    fn held_lock_excludes_other_handles() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("mods.json.lock");

        let _lock = RegistryLock::acquire(&lock_path).unwrap();
        assert!(other_handle(&lock_path).try_lock_exclusive().is_err());
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("mods.json.lock");

        drop(RegistryLock::acquire(&lock_path).unwrap());

        let other = other_handle(&lock_path);
        other.try_lock_exclusive().unwrap();
        other.unlock().unwrap();
        assert!(lock_path.exists(), "lock file stays behind");
    }
}
