//! Memoized image content digests

use log::trace;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::errors::{CacheError, CacheResult};
use crate::stats::{CacheStats, StatsCollector};

/// Identity of an image file on disk. A rewrite of the file changes its
/// modification time or size and therefore its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageFingerprint {
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
    pub size: u64,
}

impl ImageFingerprint {
    pub fn of(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        let metadata =
            std::fs::metadata(path).map_err(|e| CacheError::unreadable(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            modified: metadata.modified().ok(),
            size: metadata.len(),
        })
    }
}

/// Per-image digest memoization shared across export runs
#[derive(Debug)]
pub struct ImageHashCache {
    entries: RwLock<HashMap<ImageFingerprint, String>>,
    stats: StatsCollector,
    enabled: bool,
}

impl ImageHashCache {
    pub fn new() -> Self {
        Self::with_memoization(true)
    }

    /// A disabled cache always recomputes
    pub fn with_memoization(enabled: bool) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: StatsCollector::new(),
            enabled,
        }
    }

    /// Return the digest of `path`, computing it with `digest` on a miss
    pub fn digest_with<F>(&self, path: &Path, digest: F) -> CacheResult<String>
    where
        F: FnOnce(&Path) -> std::io::Result<String>,
    {
        let fingerprint = ImageFingerprint::of(path)?;

        if self.enabled {
            if let Some(found) = self.entries.read().get(&fingerprint) {
                self.stats.record_hit();
                return Ok(found.clone());
            }
        }
        self.stats.record_miss();

        trace!("Digesting image {}", path.display());
        let value = digest(path).map_err(|e| CacheError::unreadable(path, e))?;

        if self.enabled {
            self.entries.write().insert(fingerprint, value.clone());
            self.stats.record_put();
        }
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let dropped = entries.len() as u64;
        entries.clear();
        self.stats.record_evictions(dropped);
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.get_stats(self.len())
    }
}

impl Default for ImageHashCache {
    fn default() -> Self {
        Self::new()
    }
}
