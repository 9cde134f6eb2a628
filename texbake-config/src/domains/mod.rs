//! Domain-specific configuration modules

pub mod bake;
pub mod cache;
pub mod logging;
pub mod paths;
pub mod pool;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main texbake configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TexbakeConfig {
    /// Worker pool and scheduler tuning
    #[serde(default)]
    pub pool: pool::PoolConfig,

    /// Bake output defaults
    #[serde(default)]
    pub bake: bake::BakeConfig,

    /// Scratch and output locations
    #[serde(default)]
    pub paths: paths::PathsConfig,

    /// Result caching
    #[serde(default)]
    pub cache: cache::CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl TexbakeConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.pool.validate()?;
        self.bake.validate()?;
        self.paths.validate()?;
        self.cache.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = TexbakeConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
