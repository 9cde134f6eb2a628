//! Scratch and output location configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of per-export scratch folders
    #[serde(default = "default_collection_dir")]
    pub collection_dir: PathBuf,

    /// Where finished exports are assembled
    #[serde(default = "default_finalize_dir")]
    pub finalize_dir: PathBuf,

    /// Project save path. An export refuses to start without one unless
    /// the scene itself carries a project path.
    #[serde(default)]
    pub save_path: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            collection_dir: default_collection_dir(),
            finalize_dir: default_finalize_dir(),
            save_path: None,
        }
    }
}

impl Validatable for PathsConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.collection_dir.as_os_str().is_empty() {
            return Err(self.validation_error("collection_dir cannot be empty"));
        }
        if self.finalize_dir.as_os_str().is_empty() {
            return Err(self.validation_error("finalize_dir cannot be empty"));
        }
        if self.collection_dir == self.finalize_dir {
            return Err(self.validation_error(
                "collection_dir and finalize_dir must be different directories",
            ));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "paths"
    }
}

fn default_collection_dir() -> PathBuf {
    std::env::temp_dir().join("texbake").join("collect")
}

fn default_finalize_dir() -> PathBuf {
    std::env::temp_dir().join("texbake").join("finalize")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_defaults_live_under_temp() {
        let config = PathsConfig::default();
        assert!(config.collection_dir.starts_with(std::env::temp_dir()));
        assert!(config.save_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_same_dirs_rejected() {
        let config = PathsConfig {
            collection_dir: PathBuf::from("/work"),
            finalize_dir: PathBuf::from("/work"),
            save_path: None,
        };
        assert!(config.validate().is_err());
    }
}
