//! Bake output configuration

use crate::error::ConfigResult;
use crate::validation::{validate_enum_choice, validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};

const BAKE_METHODS: &[&str] = &["emit", "native"];

/// Bake configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeConfig {
    /// Resolution used when a material references no images
    #[serde(default = "default_resolution")]
    pub default_resolution: u32,

    /// Include the evaluated mesh of the baked object in content hashes
    pub include_mesh_context: bool,

    /// `emit` routes every channel through an emission pass, `native`
    /// uses channel-specific passes where the host has them
    #[serde(default = "default_bake_method")]
    pub bake_method: String,

    /// Name of the temporary UV layer built for UDIM atlas bakes
    #[serde(default = "default_atlas_uv_name")]
    pub atlas_uv_name: String,
}

impl BakeConfig {
    pub fn uses_native_passes(&self) -> bool {
        self.bake_method.eq_ignore_ascii_case("native")
    }
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            default_resolution: default_resolution(),
            include_mesh_context: true,
            bake_method: default_bake_method(),
            atlas_uv_name: default_atlas_uv_name(),
        }
    }
}

impl Validatable for BakeConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.default_resolution, "default_resolution", self.domain_name())?;
        validate_enum_choice(&self.bake_method, BAKE_METHODS, "bake_method", self.domain_name())?;
        validate_required_string(&self.atlas_uv_name, "atlas_uv_name", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "bake"
    }
}

fn default_resolution() -> u32 {
    2048
}

fn default_bake_method() -> String {
    "emit".to_string()
}

fn default_atlas_uv_name() -> String {
    "TexbakeAtlas".to_string()
}
