//! Configuration loading and environment variable handling

use crate::domains::TexbakeConfig;
use crate::error::{ConfigError, ConfigResult};
use log::debug;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "TEXBAKE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<TexbakeConfig> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let mut config: TexbakeConfig = serde_yaml::from_str(&content)?;

        // Apply environment variable overrides
        self.apply_env_overrides(&mut config)?;

        // Validate all domains
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<TexbakeConfig> {
        let mut config = TexbakeConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<TexbakeConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut TexbakeConfig) -> ConfigResult<()> {
        self.apply_pool_overrides(&mut config.pool)?;
        self.apply_bake_overrides(&mut config.bake)?;
        self.apply_paths_overrides(&mut config.paths);
        self.apply_cache_overrides(&mut config.cache)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    /// Apply pool config overrides
    fn apply_pool_overrides(
        &self,
        config: &mut crate::domains::pool::PoolConfig,
    ) -> ConfigResult<()> {
        if let Some(workers) = self.parse_env_var("INITIAL_WORKERS")? {
            config.initial_workers = workers;
        }

        if let Some(workers) = self.parse_env_var("MIN_WORKERS")? {
            config.min_workers = Some(workers);
        }

        if let Some(workers) = self.parse_env_var("MAX_WORKERS")? {
            config.max_workers = workers;
        }

        if let Some(seconds) = self.parse_env_var("STALL_TIMEOUT_SECONDS")? {
            config.stall_timeout = Duration::from_secs(seconds);
        }

        if let Some(seconds) = self.parse_env_var("READY_TIMEOUT_SECONDS")? {
            config.ready_timeout = Duration::from_secs(seconds);
        }

        if let Some(millis) = self.parse_env_var("CHECK_INTERVAL_MS")? {
            config.check_interval = Duration::from_millis(millis);
        }

        Ok(())
    }

    /// Apply bake config overrides
    fn apply_bake_overrides(
        &self,
        config: &mut crate::domains::bake::BakeConfig,
    ) -> ConfigResult<()> {
        if let Some(resolution) = self.parse_env_var("DEFAULT_RESOLUTION")? {
            config.default_resolution = resolution;
        }

        if let Some(include) = self.parse_env_var("INCLUDE_MESH_CONTEXT")? {
            config.include_mesh_context = include;
        }

        if let Ok(method) = self.get_env_var("BAKE_METHOD") {
            config.bake_method = method;
        }

        Ok(())
    }

    /// Apply path config overrides
    fn apply_paths_overrides(&self, config: &mut crate::domains::paths::PathsConfig) {
        if let Ok(dir) = self.get_env_var("COLLECTION_DIR") {
            config.collection_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = self.get_env_var("FINALIZE_DIR") {
            config.finalize_dir = PathBuf::from(dir);
        }

        if let Ok(path) = self.get_env_var("SAVE_PATH") {
            config.save_path = Some(PathBuf::from(path));
        }
    }

    /// Apply cache config overrides
    fn apply_cache_overrides(
        &self,
        config: &mut crate::domains::cache::CacheConfig,
    ) -> ConfigResult<()> {
        if let Some(enabled) = self.parse_env_var("CACHE_ENABLED")? {
            config.enabled = enabled;
        }

        Ok(())
    }

    /// Apply logging config overrides
    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|e| ConfigError::env("LOG_LEVEL", e))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|e| ConfigError::env("LOG_FORMAT", e))?;
        }

        Ok(())
    }

    /// Parse an optional prefixed environment variable
    fn parse_env_var<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_env_var(name) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::env(name, e)),
            Err(_) => Ok(None),
        }
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
