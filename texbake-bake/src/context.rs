//! Per-task bake context
//!
//! A context owns a fresh scene built from one task bundle. Nothing in it
//! outlives the task: dropping the context is the full reset between tasks.

use tracing::{debug, warn};
use uuid::Uuid;

use texbake_core::{Material, Mesh, ObjectKind, Scene, SceneBundle, SceneObject};
use texbake_ipc::TaskMessage;

use crate::error::{BakeError, BakeResult};

#[derive(Debug)]
pub struct BakeContext {
    scene: Scene,
    object: String,
    material: String,
}

impl BakeContext {
    /// Load the task's bundle, apply its texture translation map and
    /// resolve the target object and material
    pub fn load(task: &TaskMessage) -> BakeResult<Self> {
        let mut bundle = SceneBundle::load(&task.task_bundle_file)?;
        bundle.apply_texture_translation(&task.texture_translation_map);
        let scene = bundle.into_scene();

        let object = scene
            .object(&task.object_name)
            .ok_or_else(|| BakeError::ObjectNotFound(task.object_name.clone()))?;
        let material = locate_material(&scene, object, &task.material_uuid, &task.material_name)?;

        debug!(
            object = %object.name,
            material = %material.name,
            bundle = %task.task_bundle_file.display(),
            "Loaded bake context"
        );
        Ok(Self {
            object: object.name.clone(),
            material: material.name.clone(),
            scene,
        })
    }

    pub fn from_scene(scene: Scene, object: impl Into<String>, material: impl Into<String>) -> Self {
        Self {
            scene,
            object: object.into(),
            material: material.into(),
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn object_name(&self) -> &str {
        &self.object
    }

    pub fn material(&self) -> BakeResult<&Material> {
        self.scene
            .material(&self.material)
            .ok_or_else(|| BakeError::MaterialNotFound {
                name: self.material.clone(),
                uuid: Uuid::nil(),
            })
    }

    /// Mesh of the target object
    pub fn mesh_mut(&mut self) -> BakeResult<&mut Mesh> {
        let mesh_name = self
            .scene
            .object(&self.object)
            .and_then(|o| match &o.kind {
                ObjectKind::Mesh { mesh } => Some(mesh.clone()),
                _ => None,
            })
            .ok_or_else(|| BakeError::NoMesh(self.object.clone()))?;
        self.scene
            .mesh_mut(&mesh_name)
            .ok_or_else(|| BakeError::NoMesh(self.object.clone()))
    }
}

/// The material of `object` matching the task identity: by UUID first,
/// then by name with a warning
pub fn locate_material<'a>(
    scene: &'a Scene,
    object: &SceneObject,
    uuid: &Uuid,
    name: &str,
) -> BakeResult<&'a Material> {
    let slots: Vec<&Material> = object
        .material_slots
        .iter()
        .flatten()
        .filter_map(|m| scene.material(m))
        .collect();

    if let Some(material) = slots.iter().copied().find(|m| &m.uuid == uuid) {
        return Ok(material);
    }

    match slots.iter().copied().find(|m| m.name == name) {
        Some(material) => {
            warn!(
                material = name,
                expected_uuid = %uuid,
                found_uuid = %material.uuid,
                "Material identity not found, falling back to name match"
            );
            Ok(material)
        }
        None if scene.material_by_uuid(uuid).is_some() || scene.material(name).is_some() => {
            Err(BakeError::MaterialNotOnObject {
                material: name.to_string(),
                object: object.name.clone(),
            })
        }
        None => Err(BakeError::MaterialNotFound {
            name: name.to_string(),
            uuid: *uuid,
        }),
    }
}
