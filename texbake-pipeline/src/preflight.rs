//! Pre-flight validation of an export set

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use texbake_core::{Scene, SceneError, SceneObject, SetupError};

/// Objects to export: the named ones, or every exportable object when no
/// names are given
pub fn select_objects<'a>(
    scene: &'a Scene,
    names: &[String],
) -> Result<Vec<&'a SceneObject>, SetupError> {
    let objects: Vec<&SceneObject> = if names.is_empty() {
        scene.objects.iter().filter(|o| o.exportable).collect()
    } else {
        names
            .iter()
            .map(|name| {
                scene
                    .object(name)
                    .ok_or_else(|| SceneError::ObjectNotFound(name.clone()))
            })
            .collect::<Result<_, _>>()?
    };

    if objects.is_empty() {
        return Err(SetupError::NoExportableObjects);
    }
    Ok(objects)
}

/// The configured save path, else the path the project was saved at
pub fn resolve_save_path(
    scene: &Scene,
    configured: Option<&Path>,
) -> Result<PathBuf, SetupError> {
    configured
        .map(Path::to_path_buf)
        .or_else(|| scene.project_path.clone())
        .ok_or(SetupError::MissingSavePath)
}

/// Check that every mesh using a material of the export set has a UV map.
///
/// Users are searched in the whole scene, not only in the export set: a
/// shared material baked while any of its users lacks UVs corrupts the bake
/// state of every user.
pub fn preflight(scene: &Scene, objects: &[&SceneObject]) -> Result<(), SetupError> {
    let mut materials: Vec<&str> = Vec::new();
    let mut seen = HashSet::new();
    for object in objects.iter().filter(|o| o.is_mesh()) {
        for material in object.material_slots.iter().flatten() {
            if seen.insert(material.as_str()) {
                materials.push(material);
            }
        }
    }

    for material in &materials {
        for user in scene.users_of_material(material) {
            let Some(mesh) = scene.mesh_for(user)? else {
                continue;
            };
            if !mesh.has_uv_map() {
                return Err(SetupError::MissingUvMap {
                    object: user.name.clone(),
                    material: material.to_string(),
                });
            }
        }
        debug!(material, "UV pre-flight passed");
    }

    info!(
        objects = objects.len(),
        materials = materials.len(),
        "Pre-flight validation passed"
    );
    Ok(())
}
