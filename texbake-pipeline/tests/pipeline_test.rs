//! End-to-end tests of export preparation: pre-flight, generation and
//! isolation against a scene description

use serde_json::json;
use std::path::Path;

use texbake_caching::{CacheStore, ImageHashCache};
use texbake_config::{BakeConfig, CacheConfig};
use texbake_core::{BakeType, Resolution, Scene, SceneBundle, SetupError};
use texbake_pipeline::{preflight, select_objects, GeneratorOptions, TaskGenerator, TaskIsolator};

fn link(from: &str, from_socket: &str, to: &str, to_socket: &str) -> serde_json::Value {
    json!({"from_node": from, "from_socket": from_socket, "to_node": to, "to_socket": to_socket})
}

fn write_png(path: &Path, width: u32, height: u32) {
    image::RgbaImage::from_pixel(width, height, image::Rgba([200, 120, 40, 255]))
        .save(path)
        .unwrap();
}

fn shop_scene(dir: &Path) -> Scene {
    write_png(&dir.join("planks.png"), 8, 8);
    write_png(&dir.join("label.png"), 4, 4);

    serde_json::from_value(json!({
        "project_path": dir.join("shop.blend"),
        "objects": [
            {"name": "Crate", "kind": "mesh", "mesh": "CrateMesh", "material_slots": ["Noisy", "Label"]},
            {"name": "Shelf", "kind": "mesh", "mesh": "ShelfMesh", "material_slots": ["Noisy"]},
            {"name": "Camera", "kind": "other"}
        ],
        "meshes": [
            {"name": "CrateMesh", "vertex_count": 4, "polygons": [{"vertices": [0, 1, 2, 3]}],
             "uv_layers": [{"name": "UVMap", "coords": [[0,0],[1,0],[1,1],[0,1]]}]},
            {"name": "ShelfMesh", "vertex_count": 3, "polygons": [{"vertices": [0, 1, 2]}],
             "uv_layers": [{"name": "UVMap", "coords": [[0,0],[1,0],[1,1]]}]}
        ],
        "materials": [
            {
                "name": "Noisy",
                "uuid": "0d9c8b7a-6f5e-4d3c-8b2a-19f8e7d6c5b4",
                "tree": {
                    "nodes": [
                        {"name": "Out", "type": "output_material"},
                        {"name": "BSDF", "type": "principled_bsdf"},
                        {"name": "Noise", "type": "tex_noise"},
                        {"name": "Planks", "type": "image_texture", "image": "planks"}
                    ],
                    "links": [
                        link("BSDF", "BSDF", "Out", "Surface"),
                        link("Noise", "Color", "BSDF", "Base Color")
                    ]
                }
            },
            {
                "name": "Label",
                "uuid": "7a6b5c4d-3e2f-4a1b-9c8d-7e6f5a4b3c2d",
                "tree": {
                    "nodes": [
                        {"name": "Out", "type": "output_material"},
                        {"name": "BSDF", "type": "principled_bsdf"},
                        {"name": "Tex", "type": "image_texture", "image": "label"}
                    ],
                    "links": [
                        link("BSDF", "BSDF", "Out", "Surface"),
                        link("Tex", "Color", "BSDF", "Base Color")
                    ]
                }
            }
        ],
        "images": [
            {"name": "planks", "filepath": dir.join("planks.png"), "size": [8, 8]},
            {"name": "label", "filepath": dir.join("label.png"), "size": [4, 4]}
        ]
    }))
    .unwrap()
}

fn options(dir: &Path) -> GeneratorOptions {
    let bake = BakeConfig {
        include_mesh_context: false,
        ..BakeConfig::default()
    };
    GeneratorOptions::from_config(&bake, &CacheConfig::default(), dir.join("bakes"))
}

#[test]
fn test_procedural_material_yields_one_base_color_task() {
    let dir = tempfile::tempdir().unwrap();
    let scene = shop_scene(dir.path());
    let objects = select_objects(&scene, &["Crate".to_string()]).unwrap();
    preflight(&scene, &objects).unwrap();

    let cache = CacheStore::new();
    let images = ImageHashCache::new();
    let generated = TaskGenerator::new(&scene, &cache, &images, options(dir.path()))
        .generate(&objects)
        .unwrap();

    assert_eq!(generated.tasks.len(), 1);
    let task = &generated.tasks[0];
    assert_eq!(task.channel, "Base Color");
    assert_eq!(task.material.name, "Noisy");
    assert_eq!(task.bake_type, BakeType::Emit);
    // the unlinked planks image still sets the resolution
    assert_eq!(task.resolution, Resolution::square(8));
    assert!(task.is_color_data);
    assert!(task.uv_layer.is_none());

    // the label material is simple and copied instead of baked
    assert_eq!(generated.cached.len(), 1);
    let copied = generated.cached.values().next().unwrap();
    assert!(copied["Base Color"].exists());
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_shared_material_is_generated_once_without_mesh_context() {
    let dir = tempfile::tempdir().unwrap();
    let scene = shop_scene(dir.path());
    let objects = select_objects(&scene, &[]).unwrap();
    preflight(&scene, &objects).unwrap();

    let cache = CacheStore::new();
    let images = ImageHashCache::new();
    let generated = TaskGenerator::new(&scene, &cache, &images, options(dir.path()))
        .generate(&objects)
        .unwrap();

    let noisy: Vec<_> = generated
        .tasks
        .iter()
        .filter(|t| t.material.name == "Noisy")
        .collect();
    assert_eq!(noisy.len(), 1);

    let assigned: Vec<_> = generated
        .assignments
        .iter()
        .filter(|a| a.material == "Noisy")
        .collect();
    assert_eq!(assigned.len(), 2);
    assert_eq!(assigned[0].hash, assigned[1].hash);
}

#[test]
fn test_preflight_failure_produces_no_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let mut scene = shop_scene(dir.path());
    // Shelf is outside the export set but shares the material
    scene.mesh_mut("ShelfMesh").unwrap().uv_layers.clear();

    let objects = select_objects(&scene, &["Crate".to_string()]).unwrap();
    let err = preflight(&scene, &objects).unwrap_err();
    match err {
        SetupError::MissingUvMap { object, material } => {
            assert_eq!(object, "Shelf");
            assert_eq!(material, "Noisy");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!dir.path().join("bakes").exists());
}

#[test]
fn test_generated_tasks_isolate_into_loadable_bundles() {
    let dir = tempfile::tempdir().unwrap();
    let scene = shop_scene(dir.path());
    let objects = select_objects(&scene, &["Crate".to_string()]).unwrap();

    let cache = CacheStore::new();
    let images = ImageHashCache::new();
    let generated = TaskGenerator::new(&scene, &cache, &images, options(dir.path()))
        .generate(&objects)
        .unwrap();

    let isolated = TaskIsolator::new(dir.path().join("bundles"))
        .isolate(&scene, generated.tasks)
        .unwrap();
    let task = &isolated.tasks[0];

    let mut bundle = SceneBundle::load(task.bundle_path().unwrap()).unwrap();
    bundle.apply_texture_translation(&isolated.texture_map(&task.id));
    let bundle_scene = bundle.into_scene();

    assert!(bundle_scene.material_by_uuid(&task.material.uuid).is_some());
    assert!(bundle_scene.material("Label").is_none());
    assert_eq!(
        bundle_scene.image("planks").unwrap().filepath,
        dir.path().join("planks.png")
    );
}

/// Feed a material's Roughness from an image whose file does not exist
fn add_missing_roughness_image(scene: &mut Scene, material: &str, dir: &Path) {
    let tree = &mut scene
        .materials
        .iter_mut()
        .find(|m| m.name == material)
        .unwrap()
        .tree;
    tree.nodes.push(
        serde_json::from_value(json!({"name": "Worn", "type": "image_texture", "image": "worn"}))
            .unwrap(),
    );
    tree.links
        .push(serde_json::from_value(link("Worn", "Color", "BSDF", "Roughness")).unwrap());
    scene.images.push(
        serde_json::from_value(json!({"name": "worn", "filepath": dir.join("worn.png"), "size": [4, 4]}))
            .unwrap(),
    );
}

#[test]
fn test_incomplete_simple_copy_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let mut scene = shop_scene(dir.path());
    add_missing_roughness_image(&mut scene, "Label", dir.path());
    let objects = select_objects(&scene, &["Crate".to_string()]).unwrap();

    let cache = CacheStore::new();
    let images = ImageHashCache::new();
    let generator = TaskGenerator::new(&scene, &cache, &images, options(dir.path()));
    let generated = generator.generate(&objects).unwrap();

    // the copy that worked is still delivered for this run
    let copied = generated.cached.values().next().unwrap();
    assert!(copied["Base Color"].exists());
    assert!(!copied.contains_key("Roughness"));
    assert!(cache.is_empty());

    // so the next run retries instead of trusting a partial entry
    let again = generator.generate(&objects).unwrap();
    assert_eq!(again.cached.len(), 1);
    assert!(cache.is_empty());
}
