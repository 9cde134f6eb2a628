//! Content hash newtype

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex digest identifying the baking-relevant state of a
/// (material, object, channel) triple.
///
/// Identical hashes imply identical required output textures, so the value is
/// used both as the in-run dedup key and as the cross-run cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn new(hex: impl Into<String>) -> Self {
        ContentHash(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, used for file names and log lines
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ContentHash {
    fn from(hex: String) -> Self {
        ContentHash(hex)
    }
}
