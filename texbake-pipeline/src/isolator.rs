//! Task isolation
//!
//! Persists, per task, the minimal subset of the scene the task needs into
//! a standalone bundle file, so that workers never load the full project.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use texbake_core::{
    BakeTask, ImageData, Scene, SceneBundle, SceneError, TaskId, BUNDLE_FORMAT_VERSION,
};
use texbake_material::MaterialGraph;

/// Prefix of project-relative paths in host image references
const PROJECT_RELATIVE_PREFIX: &str = "//";

#[derive(Debug, Error)]
pub enum IsolationError {
    #[error("Task {task}: {source}")]
    Scene {
        task: TaskId,
        #[source]
        source: SceneError,
    },

    #[error("Cannot write bundle {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot serialize bundle for task {task}: {source}")]
    Serialization {
        task: TaskId,
        #[source]
        source: serde_json::Error,
    },
}

/// Tasks with their bundle attached, plus the per-task texture translation
/// maps handed to workers alongside the bundle
#[derive(Debug, Default)]
pub struct IsolatedTasks {
    pub tasks: Vec<BakeTask>,
    pub texture_maps: HashMap<TaskId, BTreeMap<String, PathBuf>>,
}

impl IsolatedTasks {
    pub fn texture_map(&self, task: &TaskId) -> BTreeMap<String, PathBuf> {
        self.texture_maps.get(task).cloned().unwrap_or_default()
    }
}

pub struct TaskIsolator {
    bundle_dir: PathBuf,
}

impl TaskIsolator {
    pub fn new(bundle_dir: impl Into<PathBuf>) -> Self {
        Self {
            bundle_dir: bundle_dir.into(),
        }
    }

    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    /// Write one bundle per task. The first failure aborts the whole
    /// isolation; bundles already written are left for the scratch cleanup.
    pub fn isolate(&self, scene: &Scene, tasks: Vec<BakeTask>) -> Result<IsolatedTasks, IsolationError> {
        std::fs::create_dir_all(&self.bundle_dir).map_err(|e| IsolationError::Io {
            path: self.bundle_dir.clone(),
            source: e,
        })?;

        let project_dir = scene
            .project_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);

        let mut isolated = IsolatedTasks::default();
        for task in tasks {
            let bundle = build_bundle(scene, &task)?;
            let texture_map = translation_map(&bundle.images, project_dir.as_deref());
            let path = self.write_bundle(&bundle)?;

            debug!(
                task = %task.label(),
                images = bundle.images.len(),
                groups = bundle.node_groups.len(),
                path = %path.display(),
                "Isolated task"
            );
            isolated.texture_maps.insert(task.id, texture_map);
            isolated.tasks.push(task.with_bundle(path));
        }

        info!(
            bundles = isolated.tasks.len(),
            dir = %self.bundle_dir.display(),
            "Task isolation finished"
        );
        Ok(isolated)
    }

    fn write_bundle(&self, bundle: &SceneBundle) -> Result<PathBuf, IsolationError> {
        let path = self
            .bundle_dir
            .join(SceneBundle::bundle_file_name(&bundle.task_id));
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_vec(bundle).map_err(|e| IsolationError::Serialization {
            task: bundle.task_id,
            source: e,
        })?;
        std::fs::write(&tmp, content).map_err(|e| IsolationError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| IsolationError::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }
}

/// Collect the object, its mesh, the material and every node group and
/// image the material reaches
fn build_bundle(scene: &Scene, task: &BakeTask) -> Result<SceneBundle, IsolationError> {
    let scene_error = |source| IsolationError::Scene {
        task: task.id,
        source,
    };

    let object = scene
        .object(&task.object_name)
        .ok_or_else(|| scene_error(SceneError::ObjectNotFound(task.object_name.clone())))?;
    let mesh = scene.mesh_for(object).map_err(scene_error)?.cloned();
    let material = scene
        .material_by_uuid(&task.material.uuid)
        .or_else(|| scene.material(&task.material.name))
        .ok_or_else(|| scene_error(SceneError::MaterialNotFound(task.material.name.clone())))?;

    let graph = MaterialGraph::new(&material.tree, &scene.node_groups);
    let node_groups = graph.reachable_groups().into_iter().cloned().collect();

    let mut image_names: Vec<&str> = graph.all_nodes().filter_map(|n| n.image.as_deref()).collect();
    image_names.sort_unstable();
    image_names.dedup();
    let images = image_names
        .into_iter()
        .map(|name| {
            scene
                .image(name)
                .cloned()
                .ok_or_else(|| scene_error(SceneError::ImageNotFound(name.to_string())))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SceneBundle {
        format_version: BUNDLE_FORMAT_VERSION,
        task_id: task.id,
        object: object.clone(),
        mesh,
        material: material.clone(),
        node_groups,
        images,
    })
}

/// Absolute path of every image in the bundle. Tiled images map to their
/// `<UDIM>` template.
fn translation_map(images: &[ImageData], project_dir: Option<&Path>) -> BTreeMap<String, PathBuf> {
    images
        .iter()
        .map(|image| (image.name.clone(), absolutize(&image.filepath, project_dir)))
        .collect()
}

fn absolutize(path: &Path, project_dir: Option<&Path>) -> PathBuf {
    let text = path.to_string_lossy();
    match (text.strip_prefix(PROJECT_RELATIVE_PREFIX), project_dir) {
        (Some(relative), Some(dir)) => dir.join(relative),
        (Some(_), None) => path.to_path_buf(),
        (None, Some(dir)) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}
