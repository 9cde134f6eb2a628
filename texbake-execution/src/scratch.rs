//! Scratch directories and orphan cleanup
//!
//! Bake outputs and task bundles live under the collection directory.
//! Each export assembles its results in its own folder under the finalize
//! directory; the folder carries a lock file with the owning PID so that a
//! later cleanup can tell live folders from ones left behind by a crash.

use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, info, warn};
use uuid::Uuid;

use texbake_config::PathsConfig;

use crate::error::{ExecutionError, ExecutionResult};

pub const LOCK_FILE_NAME: &str = ".texbake.lock";
const EXPORT_FOLDER_PREFIX: &str = "export_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchLayout {
    pub collection_dir: PathBuf,
    pub finalize_dir: PathBuf,
}

impl ScratchLayout {
    pub fn new(collection_dir: impl Into<PathBuf>, finalize_dir: impl Into<PathBuf>) -> Self {
        Self {
            collection_dir: collection_dir.into(),
            finalize_dir: finalize_dir.into(),
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(&paths.collection_dir, &paths.finalize_dir)
    }

    pub fn bake_dir(&self) -> PathBuf {
        self.collection_dir.join("bakes")
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.collection_dir.join("bundles")
    }

    /// Create every scratch directory
    pub fn prepare(&self) -> ExecutionResult<()> {
        for dir in [self.bake_dir(), self.bundle_dir(), self.finalize_dir.clone()] {
            std::fs::create_dir_all(&dir).map_err(|e| ExecutionError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Delete the task bundles of a finished or cancelled run
    pub fn clear_bundles(&self) -> ExecutionResult<()> {
        let dir = self.bundle_dir();
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!(dir = %dir.display(), "Removed task bundles");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ExecutionError::io(dir, e)),
        }
    }
}

/// A PID-locked per-export folder, removed on drop unless kept
#[derive(Debug)]
pub struct ExportFolder {
    path: PathBuf,
    keep: bool,
}

impl ExportFolder {
    pub fn create(finalize_dir: &Path) -> ExecutionResult<Self> {
        let path = finalize_dir.join(format!("{}{}", EXPORT_FOLDER_PREFIX, Uuid::new_v4().simple()));
        std::fs::create_dir_all(&path).map_err(|e| ExecutionError::io(&path, e))?;

        let lock = path.join(LOCK_FILE_NAME);
        std::fs::write(&lock, std::process::id().to_string())
            .map_err(|e| ExecutionError::io(&lock, e))?;

        debug!(folder = %path.display(), "Created export folder");
        Ok(Self { path, keep: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leave the folder in place after drop
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for ExportFolder {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(folder = %self.path.display(), error = %e, "Failed to remove export folder");
        }
    }
}

fn lock_owner(folder: &Path) -> Option<u32> {
    std::fs::read_to_string(folder.join(LOCK_FILE_NAME))
        .ok()
        .and_then(|content| content.trim().parse().ok())
}

fn is_alive(system: &mut System, pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

/// Remove export folders whose owning process is gone, or that carry no
/// lock at all. Returns the removed folders.
pub fn cleanup_orphans(finalize_dir: &Path) -> ExecutionResult<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(finalize_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ExecutionError::io(finalize_dir, e)),
    };

    let mut system = System::new();
    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ExecutionError::io(finalize_dir, e))?;
        let path = entry.path();
        let is_export = path.is_dir()
            && entry
                .file_name()
                .to_string_lossy()
                .starts_with(EXPORT_FOLDER_PREFIX);
        if !is_export {
            continue;
        }

        if let Some(pid) = lock_owner(&path) {
            if is_alive(&mut system, pid) {
                debug!(folder = %path.display(), pid, "Export folder owned by a live process");
                continue;
            }
        }

        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                info!(folder = %path.display(), "Removed orphaned export folder");
                removed.push(path);
            }
            Err(e) => warn!(folder = %path.display(), error = %e, "Failed to remove orphaned export folder"),
        }
    }
    Ok(removed)
}
