//! Caches shared across export runs
//!
//! Both caches live for the lifetime of the host process and are only
//! cleared on explicit request. Nothing is persisted across restarts.

pub mod errors;
pub mod image_hash;
pub mod stats;
pub mod store;

pub use errors::{CacheError, CacheResult};
pub use image_hash::{ImageFingerprint, ImageHashCache};
pub use stats::{CacheStats, StatsCollector};
pub use store::{CacheStore, ChannelMap, SharedCacheStore};
