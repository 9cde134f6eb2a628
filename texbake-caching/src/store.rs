//! Bake result cache keyed by content hash

use log::debug;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use texbake_core::ContentHash;

use crate::stats::{CacheStats, StatsCollector};

/// Channel socket name → resolved texture file
pub type ChannelMap = BTreeMap<String, PathBuf>;

/// Store handle shared between the generator and the controller
pub type SharedCacheStore = Arc<CacheStore>;

/// Maps a content hash to the textures already produced for it.
///
/// Written by the task generator (copied simple textures) and by the
/// controller (successful bakes). Entries are only added or extended; a
/// full [`clear`](Self::clear) is the only removal.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: RwLock<HashMap<ContentHash, ChannelMap>>,
    stats: StatsCollector,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedCacheStore {
        Arc::new(Self::new())
    }

    /// Look up the channel map of a hash, counting the hit or miss
    pub fn get(&self, hash: &ContentHash) -> Option<ChannelMap> {
        let entries = self.entries.read();
        match entries.get(hash) {
            Some(map) => {
                self.stats.record_hit();
                Some(map.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Membership test that leaves the statistics untouched
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.entries.read().contains_key(hash)
    }

    /// Record one produced channel texture
    pub fn record(&self, hash: &ContentHash, channel: impl Into<String>, path: impl AsRef<Path>) {
        let channel = channel.into();
        debug!("Caching {} for {} at {}", channel, hash.short(), path.as_ref().display());
        self.entries
            .write()
            .entry(hash.clone())
            .or_default()
            .insert(channel, path.as_ref().to_path_buf());
        self.stats.record_put();
    }

    /// Merge a whole channel map into the entry of a hash
    pub fn extend(&self, hash: &ContentHash, channels: ChannelMap) {
        if channels.is_empty() {
            return;
        }
        let mut entries = self.entries.write();
        entries.entry(hash.clone()).or_default().extend(channels);
        self.stats.record_put();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every entry. Only called on explicit user request.
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
