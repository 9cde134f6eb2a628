//! Bake task generation
//!
//! Walks the export set object by object and slot by slot. Each
//! (material, object slot) pair is hashed; a hash already handled in this
//! run is skipped, a hash known to the cache reuses its textures, and
//! anything else is classified into bake tasks or copied textures.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use texbake_caching::{CacheStore, ChannelMap, ImageHashCache};
use texbake_config::{BakeConfig, CacheConfig};
use texbake_core::{
    channel_spec, BakeTask, BakeType, ChannelSpec, ContentHash, DecalSpec, Material,
    MaterialIdentity, NativePass, Scene, SceneObject, SetupError, SpecialChannel, TaskId,
};
use texbake_material::{
    classify, first_image, BakeStrategy, Classification, MaterialGraph, MaterialHasher,
    MeshContext,
};

use crate::texture::normalize_texture;

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub default_resolution: u32,
    pub include_mesh_context: bool,
    pub native_passes: bool,
    pub atlas_uv_name: String,
    pub use_cache: bool,
    /// Where baked and copied textures go
    pub bake_dir: PathBuf,
}

impl GeneratorOptions {
    pub fn from_config(bake: &BakeConfig, cache: &CacheConfig, bake_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_resolution: bake.default_resolution,
            include_mesh_context: bake.include_mesh_context,
            native_passes: bake.uses_native_passes(),
            atlas_uv_name: bake.atlas_uv_name.clone(),
            use_cache: cache.enabled,
            bake_dir: bake_dir.into(),
        }
    }
}

/// A baked or copied texture that needs a dedicated input binding on the
/// asset server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialBinding {
    pub object: String,
    pub material: String,
    pub channel: SpecialChannel,
    pub path: PathBuf,
    pub hash: ContentHash,
}

/// Which hash supplies the textures of an object's material slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialAssignment {
    pub object: String,
    pub slot_index: u32,
    pub material: String,
    pub hash: ContentHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMaterial {
    pub object: String,
    pub material: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct GeneratedTasks {
    pub tasks: Vec<BakeTask>,
    /// Channel maps reused from the cache, and of copied simple materials
    pub cached: HashMap<ContentHash, ChannelMap>,
    pub special: Vec<SpecialBinding>,
    pub assignments: Vec<MaterialAssignment>,
    pub skipped: Vec<SkippedMaterial>,
}

pub struct TaskGenerator<'a> {
    scene: &'a Scene,
    cache: &'a CacheStore,
    hasher: MaterialHasher<'a>,
    options: GeneratorOptions,
}

impl<'a> TaskGenerator<'a> {
    pub fn new(
        scene: &'a Scene,
        cache: &'a CacheStore,
        images: &'a ImageHashCache,
        options: GeneratorOptions,
    ) -> Self {
        Self {
            scene,
            cache,
            hasher: MaterialHasher::new(scene, images, options.include_mesh_context),
            options,
        }
    }

    pub fn generate(&self, objects: &[&SceneObject]) -> Result<GeneratedTasks, SetupError> {
        let mut out = GeneratedTasks::default();
        let mut processed: HashSet<ContentHash> = HashSet::new();

        for object in objects.iter().filter(|o| o.is_mesh()) {
            let mesh = self.scene.mesh_for(object)?;

            for (slot_index, slot) in object.material_slots.iter().enumerate() {
                let Some(material_name) = slot else {
                    continue;
                };
                let Some(material) = self.scene.material(material_name) else {
                    warn!(object = %object.name, material = %material_name, "Material slot references unknown material");
                    out.skipped.push(SkippedMaterial {
                        object: object.name.clone(),
                        material: material_name.clone(),
                        reason: "material not found".to_string(),
                    });
                    continue;
                };

                let slot_index = slot_index as u32;
                let hash = self
                    .hasher
                    .hash(material, mesh.map(|mesh| MeshContext { mesh, slot_index }));
                out.assignments.push(MaterialAssignment {
                    object: object.name.clone(),
                    slot_index,
                    material: material.name.clone(),
                    hash: hash.clone(),
                });

                if !processed.insert(hash.clone()) {
                    debug!(object = %object.name, material = %material.name, "Hash already handled in this run");
                    continue;
                }

                if self.options.use_cache {
                    if let Some(channels) = self.cache.get(&hash) {
                        info!(
                            object = %object.name,
                            material = %material.name,
                            hash = hash.short(),
                            "Cache hit, reusing {} textures",
                            channels.len()
                        );
                        for (channel, path) in &channels {
                            push_special(&mut out.special, object, material, channel, path, &hash);
                        }
                        out.cached.insert(hash, channels);
                        continue;
                    }
                }

                let classification =
                    match classify(material, self.scene, self.options.default_resolution) {
                        Ok(classification) => classification,
                        Err(e) => {
                            warn!(object = %object.name, material = %material.name, error = %e, "Material excluded");
                            out.skipped.push(SkippedMaterial {
                                object: object.name.clone(),
                                material: material.name.clone(),
                                reason: e.to_string(),
                            });
                            continue;
                        }
                    };

                match &classification.strategy {
                    BakeStrategy::Simple => {
                        let channels = self.copy_simple(object, material, &classification, &hash);
                        for (channel, path) in &channels {
                            push_special(&mut out.special, object, material, channel, path, &hash);
                        }
                        if !channels.is_empty() {
                            out.cached.insert(hash, channels);
                        }
                    }
                    _ => {
                        let tasks = self.bake_tasks(object, material, &classification, &hash);
                        for task in &tasks {
                            push_special(
                                &mut out.special,
                                object,
                                material,
                                &task.channel,
                                &task.output_path,
                                &hash,
                            );
                        }
                        out.tasks.extend(tasks);
                    }
                }
            }
        }

        info!(
            tasks = out.tasks.len(),
            cached = out.cached.len(),
            skipped = out.skipped.len(),
            "Task generation finished"
        );
        Ok(out)
    }

    /// Copy the first image of every connected channel into the bake dir.
    /// The copies are cached only when every channel made it.
    fn copy_simple(
        &self,
        object: &SceneObject,
        material: &Material,
        classification: &Classification,
        hash: &ContentHash,
    ) -> ChannelMap {
        let graph = MaterialGraph::new(&material.tree, &self.scene.node_groups);
        let mut channels = ChannelMap::new();
        let mut missing = Vec::new();

        for channel in &classification.channels {
            let Some(image) = first_image(&graph, &channel.port, self.scene) else {
                missing.push(channel.socket());
                continue;
            };
            let stem = output_stem(object, material, hash, channel.socket());
            match normalize_texture(&image.filepath, &self.options.bake_dir, &stem) {
                Ok(path) => {
                    channels.insert(channel.socket().to_string(), path);
                }
                Err(e) => {
                    warn!(
                        material = %material.name,
                        channel = channel.socket(),
                        error = %e,
                        "Could not copy source texture"
                    );
                    missing.push(channel.socket());
                }
            }
        }

        if missing.is_empty() {
            self.cache.extend(hash, channels.clone());
        } else {
            warn!(
                material = %material.name,
                missing = ?missing,
                "Incomplete texture set, not caching"
            );
        }
        debug!(material = %material.name, copied = channels.len(), "Copied simple material textures");
        channels
    }

    fn bake_tasks(
        &self,
        object: &SceneObject,
        material: &Material,
        classification: &Classification,
        hash: &ContentHash,
    ) -> Vec<BakeTask> {
        let identity = MaterialIdentity {
            name: material.name.clone(),
            uuid: material.uuid,
        };
        let (udim_tiles, uv_layer) = match &classification.strategy {
            BakeStrategy::Udim { tiles } => (tiles.clone(), Some(self.options.atlas_uv_name.clone())),
            _ => (Vec::new(), None),
        };

        let task_for = |spec: &ChannelSpec| {
            let stem = output_stem(object, material, hash, spec.socket);
            BakeTask {
                id: TaskId::new(),
                material: identity.clone(),
                object_name: object.name.clone(),
                channel: spec.socket.to_string(),
                bake_type: bake_type_for(spec, self.options.native_passes),
                output_path: self.options.bake_dir.join(format!("{}.png", stem)),
                resolution: classification.resolution,
                uv_layer: uv_layer.clone(),
                is_value: spec.is_value,
                is_color_data: spec.is_color_data,
                content_hash: hash.clone(),
                udim_tiles: udim_tiles.clone(),
                decal: None,
                bundle_path: None,
            }
        };

        let mut tasks = Vec::new();

        if let BakeStrategy::Decal(layout) = &classification.strategy {
            if let Some(spec) = channel_spec("Base Color") {
                let mut task = task_for(spec);
                let stem = output_stem(object, material, hash, spec.socket);
                task.decal = Some(DecalSpec {
                    mix_node: layout.mix_node.path(),
                    decal_shader: layout.decal_shader.path(),
                    base_output: self.options.bake_dir.join(format!("{}_decal_base.png", stem)),
                    decal_output: self.options.bake_dir.join(format!("{}_decal_color.png", stem)),
                    mask_output: self.options.bake_dir.join(format!("{}_decal_mask.png", stem)),
                });
                tasks.push(task);
            }
        }

        for channel in &classification.channels {
            if tasks.iter().any(|t| t.channel == channel.socket()) {
                continue;
            }
            tasks.push(task_for(channel.spec));
        }

        debug!(
            object = %object.name,
            material = %material.name,
            strategy = classification.strategy.name(),
            tasks = tasks.len(),
            resolution = %classification.resolution,
            "Generated bake tasks"
        );
        tasks
    }
}

/// Bake pass of a channel. The emit method still uses the native normal
/// pass; the native method also uses native passes for color and roughness.
fn bake_type_for(spec: &ChannelSpec, native_passes: bool) -> BakeType {
    if !native_passes {
        return spec.bake_type;
    }
    match spec.socket {
        "Base Color" => BakeType::Native(NativePass::Diffuse),
        "Roughness" => BakeType::Native(NativePass::Roughness),
        _ => spec.bake_type,
    }
}

fn push_special(
    special: &mut Vec<SpecialBinding>,
    object: &SceneObject,
    material: &Material,
    channel: &str,
    path: &Path,
    hash: &ContentHash,
) {
    if let Some(kind) = channel_spec(channel).and_then(|s| s.special) {
        special.push(SpecialBinding {
            object: object.name.clone(),
            material: material.name.clone(),
            channel: kind,
            path: path.to_path_buf(),
            hash: hash.clone(),
        });
    }
}

/// File-system friendly name fragment
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

fn output_stem(object: &SceneObject, material: &Material, hash: &ContentHash, channel: &str) -> String {
    format!(
        "{}_{}_{}_{}",
        sanitize(&object.name),
        sanitize(&material.name),
        hash.short(),
        sanitize(channel)
    )
}
