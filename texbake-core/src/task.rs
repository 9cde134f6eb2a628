//! Bake task model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::hash::ContentHash;

/// Unique identifier for a bake task (newtype pattern for type safety)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new random task ID
    pub fn new() -> Self {
        TaskId(Uuid::new_v4())
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        TaskId(uuid)
    }
}

/// Stable identity of a material datablock
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialIdentity {
    pub name: String,
    pub uuid: Uuid,
}

impl fmt::Display for MaterialIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}

/// Channel-specific native bake passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativePass {
    Normal,
    Roughness,
    Diffuse,
}

/// How a channel is captured.
///
/// `Emit` reroutes the channel signal through an emission shader and captures
/// it with a plain radiance pass; `Native` uses the host's channel-specific
/// pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum BakeType {
    Emit,
    Native(NativePass),
}

impl BakeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BakeType::Emit => "EMIT",
            BakeType::Native(NativePass::Normal) => "NORMAL",
            BakeType::Native(NativePass::Roughness) => "ROUGHNESS",
            BakeType::Native(NativePass::Diffuse) => "DIFFUSE",
        }
    }
}

impl From<BakeType> for String {
    fn from(value: BakeType) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for BakeType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_uppercase().as_str() {
            "EMIT" => Ok(BakeType::Emit),
            "NORMAL" => Ok(BakeType::Native(NativePass::Normal)),
            "ROUGHNESS" => Ok(BakeType::Native(NativePass::Roughness)),
            "DIFFUSE" => Ok(BakeType::Native(NativePass::Diffuse)),
            _ => Err(format!("Unknown bake type: {}", value)),
        }
    }
}

impl fmt::Display for BakeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Extra outputs of the three-pass decal bake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecalSpec {
    /// Mix-shader node blending the base and decal shaders
    pub mix_node: String,
    /// Shader feeding the mix node's second shader input
    pub decal_shader: String,
    pub base_output: PathBuf,
    pub decal_output: PathBuf,
    pub mask_output: PathBuf,
}

/// One bake unit: a channel of a material on one object.
///
/// Created by the task generator and read-only afterwards, except for
/// attaching the isolated bundle path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BakeTask {
    pub id: TaskId,
    pub material: MaterialIdentity,
    pub object_name: String,
    /// Target socket name, e.g. `Base Color`
    pub channel: String,
    pub bake_type: BakeType,
    pub output_path: PathBuf,
    pub resolution: Resolution,
    /// UV layer to bake onto; `None` bakes onto the active layer
    pub uv_layer: Option<String>,
    pub is_value: bool,
    pub is_color_data: bool,
    pub content_hash: ContentHash,
    /// UDIM tile numbers merged onto the bake atlas, in atlas order
    #[serde(default)]
    pub udim_tiles: Vec<u32>,
    #[serde(default)]
    pub decal: Option<DecalSpec>,
    #[serde(default)]
    pub bundle_path: Option<PathBuf>,
}

impl BakeTask {
    /// Attach the isolated dependency bundle. The only mutation a task sees
    /// after creation.
    pub fn with_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.bundle_path = Some(path.into());
        self
    }

    pub fn bundle_path(&self) -> Option<&Path> {
        self.bundle_path.as_deref()
    }

    pub fn is_decal(&self) -> bool {
        self.decal.is_some()
    }

    pub fn is_udim(&self) -> bool {
        !self.udim_tiles.is_empty()
    }

    /// Short label for log lines
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.object_name, self.material.name, self.channel)
    }
}
