use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value as JsonValue};
use std::path::Path;

use texbake_caching::ImageHashCache;
use texbake_config::TexbakeConfig;
use texbake_core::Scene;
use texbake_material::{classify, MaterialHasher, MeshContext};

fn load_scene(path: &Path) -> Result<Scene> {
    Scene::from_json_file(path).with_context(|| format!("Failed to load scene from {:?}", path))
}

/// Classify every material of a scene
pub fn classify_scene(config: &TexbakeConfig, scene: &Scene) -> Result<Vec<JsonValue>> {
    let mut rows = Vec::with_capacity(scene.materials.len());
    for material in &scene.materials {
        let row = match classify(material, scene, config.bake.default_resolution) {
            Ok(classification) => json!({
                "material": material.name,
                "strategy": classification.strategy.name(),
                "needs_bake": classification.strategy.needs_bake(),
                "channels": classification
                    .channels
                    .iter()
                    .map(|c| c.socket())
                    .collect::<Vec<_>>(),
                "resolution": [classification.resolution.width, classification.resolution.height],
            }),
            Err(e) if e.is_exclusion() => json!({
                "material": material.name,
                "strategy": "excluded",
                "reason": e.to_string(),
            }),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to classify material '{}'", material.name)))
            }
        };
        rows.push(row);
    }
    Ok(rows)
}

pub fn handle_classify(config: &TexbakeConfig, scene_path: &Path, format: &str) -> Result<()> {
    let scene = load_scene(scene_path)?;
    let rows = classify_scene(config, &scene)?;

    match format.to_lowercase().as_str() {
        "json" => {
            let rendered =
                serde_json::to_string_pretty(&rows).context("Failed to format result as JSON")?;
            println!("{}", rendered);
        }
        "text" => {
            for row in &rows {
                let channels = row["channels"]
                    .as_array()
                    .map(|c| {
                        c.iter()
                            .filter_map(JsonValue::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    })
                    .unwrap_or_default();
                println!(
                    "{:<32} {:<9} {}",
                    row["material"].as_str().unwrap_or_default(),
                    row["strategy"].as_str().unwrap_or_default(),
                    row["reason"].as_str().map(str::to_string).unwrap_or(channels)
                );
            }
        }
        _ => {
            return Err(anyhow!(
                "Unknown output format: {}. Valid formats: text, json",
                format
            ))
        }
    }
    Ok(())
}

/// Content hash of `material` as baked onto `object`
pub fn material_hash(
    config: &TexbakeConfig,
    scene: &Scene,
    object: &str,
    material: &str,
) -> Result<String> {
    let scene_object = scene
        .object(object)
        .ok_or_else(|| anyhow!("Object not found: {}", object))?;
    let slot_index = scene_object
        .material_slots
        .iter()
        .position(|slot| slot.as_deref() == Some(material))
        .ok_or_else(|| anyhow!("Object '{}' has no slot using material '{}'", object, material))?;
    let material = scene
        .material(material)
        .ok_or_else(|| anyhow!("Material not found: {}", material))?;
    let mesh = scene.mesh_for(scene_object)?;

    let images = ImageHashCache::with_memoization(config.cache.memoize_image_hashes);
    let hasher = MaterialHasher::new(scene, &images, config.bake.include_mesh_context);
    let context = mesh.map(|mesh| MeshContext {
        mesh,
        slot_index: slot_index as u32,
    });
    Ok(hasher.hash(material, context).to_string())
}

pub fn handle_hash(
    config: &TexbakeConfig,
    scene_path: &Path,
    object: &str,
    material: &str,
) -> Result<()> {
    let scene = load_scene(scene_path)?;
    println!("{}", material_hash(config, &scene, object, material)?);
    Ok(())
}
