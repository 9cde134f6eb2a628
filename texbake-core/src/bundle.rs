//! Isolated task bundles
//!
//! A bundle is the minimal subset of a scene a worker needs for one task:
//! the target object, its mesh, the material and everything the material
//! references. Loading one never touches the full project.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::SceneError;
use crate::scene::{ImageData, ImageSource, Material, Mesh, NodeGroup, Scene, SceneObject};
use crate::task::TaskId;

/// Placeholder for the tile number in tiled image paths
pub const UDIM_TOKEN: &str = "<UDIM>";

pub const BUNDLE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneBundle {
    pub format_version: u32,
    pub task_id: TaskId,
    pub object: SceneObject,
    #[serde(default)]
    pub mesh: Option<Mesh>,
    pub material: Material,
    #[serde(default)]
    pub node_groups: Vec<NodeGroup>,
    #[serde(default)]
    pub images: Vec<ImageData>,
}

impl SceneBundle {
    pub fn bundle_file_name(task_id: &TaskId) -> String {
        format!("task_{}.bundle.json", task_id)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let content = std::fs::read_to_string(path)?;
        let bundle: SceneBundle = serde_json::from_str(&content)?;
        if bundle.format_version != BUNDLE_FORMAT_VERSION {
            return Err(SceneError::Parse(format!(
                "unsupported bundle format version {}",
                bundle.format_version
            )));
        }
        Ok(bundle)
    }

    /// Rewrite image paths from a translation map. Tiled images take a
    /// template path whose `<UDIM>` token is replaced per tile.
    pub fn apply_texture_translation(&mut self, map: &BTreeMap<String, PathBuf>) {
        for image in &mut self.images {
            let Some(target) = map.get(&image.name) else {
                continue;
            };
            image.filepath = target.clone();
            if let ImageSource::Tiled { tiles } = &mut image.source {
                let template = target.to_string_lossy();
                for tile in tiles {
                    tile.filepath =
                        PathBuf::from(template.replace(UDIM_TOKEN, &tile.number.to_string()));
                }
            }
        }
    }

    /// A fresh scene holding only the bundle's data
    pub fn into_scene(self) -> Scene {
        let meshes = self.mesh.into_iter().collect();
        Scene {
            project_path: None,
            objects: vec![self.object],
            meshes,
            materials: vec![self.material],
            node_groups: self.node_groups,
            images: self.images,
        }
    }
}
