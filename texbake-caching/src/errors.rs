//! Cache error types

use std::path::PathBuf;
use thiserror::Error;

pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    /// A file to fingerprint or digest could not be read
    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Unreadable {
            path: path.into(),
            source,
        }
    }

    /// The file does not exist, as opposed to existing but being unreadable
    pub fn is_missing(&self) -> bool {
        match self {
            CacheError::Unreadable { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
        }
    }
}
