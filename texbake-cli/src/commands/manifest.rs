//! Host and finalizer used by the `export` command
//!
//! The CLI drives the pipeline from a serialized scene, so there is no live
//! host state to restore. Saving the project writes the scene description to
//! the save path. Finalization writes a JSON manifest binding every exported
//! material slot to its baked or copied textures.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use texbake_core::{ContentHash, Scene, SpecialChannel};
use texbake_execution::{
    ExecutionError, ExecutionResult, ExportHost, FinalizeInput, Finalizer, RunReport,
};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Writes the scene description as the project file
#[derive(Debug, Default)]
pub struct SceneFileHost {
    saved: Option<PathBuf>,
}

impl SceneFileHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved_path(&self) -> Option<&Path> {
        self.saved.as_deref()
    }
}

impl ExportHost for SceneFileHost {
    fn save_project(&mut self, scene: &Scene, save_path: &Path) -> ExecutionResult<()> {
        if let Some(parent) = save_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ExecutionError::io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(scene)
            .map_err(|e| ExecutionError::Host(format!("Failed to serialize scene: {}", e)))?;
        fs::write(save_path, content).map_err(|e| ExecutionError::io(save_path, e))?;

        debug!(path = %save_path.display(), "Saved project");
        self.saved = Some(save_path.to_path_buf());
        Ok(())
    }

    fn restore_state(&mut self) -> ExecutionResult<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct Manifest<'a> {
    pub created_at: DateTime<Utc>,
    pub project: &'a Path,
    pub materials: Vec<ManifestMaterial>,
    pub special: Vec<ManifestSpecial>,
    pub run: &'a RunReport,
}

#[derive(Debug, Serialize)]
pub struct ManifestMaterial {
    pub object: String,
    pub slot_index: u32,
    pub material: String,
    pub hash: ContentHash,
    /// Shader input socket to texture file
    pub channels: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct ManifestSpecial {
    pub object: String,
    pub material: String,
    pub channel: SpecialChannel,
    pub server_input: &'static str,
    pub path: PathBuf,
}

/// Assembles the manifest in the export folder and delivers it to the
/// output directory
#[derive(Debug, Clone)]
pub struct ManifestFinalizer {
    output_dir: PathBuf,
}

impl ManifestFinalizer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn build<'a>(input: &'a FinalizeInput<'_>) -> Manifest<'a> {
        let materials = input
            .assignments
            .iter()
            .map(|assignment| {
                let channels = input.channels(&assignment.hash).unwrap_or_else(|| {
                    warn!(
                        object = %assignment.object,
                        material = %assignment.material,
                        hash = %assignment.hash.short(),
                        "No textures recorded for material"
                    );
                    BTreeMap::new()
                });
                ManifestMaterial {
                    object: assignment.object.clone(),
                    slot_index: assignment.slot_index,
                    material: assignment.material.clone(),
                    hash: assignment.hash.clone(),
                    channels,
                }
            })
            .collect();

        let special = input
            .special
            .iter()
            .map(|binding| ManifestSpecial {
                object: binding.object.clone(),
                material: binding.material.clone(),
                channel: binding.channel,
                server_input: binding.channel.server_input(),
                path: binding.path.clone(),
            })
            .collect();

        Manifest {
            created_at: Utc::now(),
            project: input.save_path,
            materials,
            special,
            run: input.run,
        }
    }
}

impl Finalizer for ManifestFinalizer {
    fn finalize(&mut self, input: &FinalizeInput<'_>) -> ExecutionResult<PathBuf> {
        let manifest = Self::build(input);
        let content = serde_json::to_string_pretty(&manifest)
            .map_err(|e| ExecutionError::Finalize(format!("Failed to serialize manifest: {}", e)))?;

        let staged = input.folder.join(MANIFEST_FILE_NAME);
        fs::write(&staged, content).map_err(|e| ExecutionError::io(&staged, e))?;

        fs::create_dir_all(&self.output_dir).map_err(|e| ExecutionError::io(&self.output_dir, e))?;
        let delivered = self.output_dir.join(MANIFEST_FILE_NAME);
        fs::copy(&staged, &delivered).map_err(|e| ExecutionError::io(&delivered, e))?;

        info!(
            manifest = %delivered.display(),
            materials = manifest.materials.len(),
            special = manifest.special.len(),
            "Wrote export manifest"
        );
        Ok(delivered)
    }
}
