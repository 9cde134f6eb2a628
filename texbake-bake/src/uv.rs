//! UV layer operations used by decal and UDIM bakes
//!
//! Both mutate the mesh of the worker's private bake context. Mirroring is
//! undone from a snapshot of the original coordinates rather than by
//! mirroring again, so the restored layer is bit-identical.

use texbake_core::{Mesh, UvLayer};

use crate::error::{BakeError, BakeResult};

/// Saved coordinates of one UV layer
#[derive(Debug, Clone)]
pub struct UvSnapshot {
    layer: String,
    coords: Vec<[f32; 2]>,
}

impl UvSnapshot {
    pub fn capture(layer: &UvLayer) -> Self {
        Self {
            layer: layer.name.clone(),
            coords: layer.coords.clone(),
        }
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// Put the saved coordinates back
    pub fn restore(self, mesh: &mut Mesh) -> BakeResult<()> {
        let mesh_name = mesh.name.clone();
        let layer = mesh
            .uv_layer_mut(&self.layer)
            .ok_or_else(|| BakeError::UvLayerMissing {
                mesh: mesh_name,
                layer: self.layer.clone(),
            })?;
        layer.coords = self.coords;
        Ok(())
    }
}

fn active_layer_name(mesh: &Mesh) -> BakeResult<String> {
    mesh.active_uv_layer()
        .map(|l| l.name.clone())
        .ok_or_else(|| BakeError::UvLayerMissing {
            mesh: mesh.name.clone(),
            layer: "<active>".to_string(),
        })
}

/// Mirror the active UV layer horizontally (`u → 1 - u`) and return the
/// snapshot that undoes it
pub fn mirror_active_layer(mesh: &mut Mesh) -> BakeResult<UvSnapshot> {
    let name = active_layer_name(mesh)?;
    let mesh_name = mesh.name.clone();
    let layer = mesh
        .uv_layer_mut(&name)
        .ok_or(BakeError::UvLayerMissing {
            mesh: mesh_name,
            layer: name,
        })?;

    let snapshot = UvSnapshot::capture(layer);
    for [u, _] in layer.coords.iter_mut() {
        *u = 1.0 - *u;
    }
    Ok(snapshot)
}

/// UDIM tile number of a UV coordinate
pub fn udim_tile_of([u, v]: [f32; 2]) -> u32 {
    let column = u.floor().clamp(0.0, 9.0) as u32;
    let row = v.floor().max(0.0) as u32;
    1001 + column + 10 * row
}

/// Offset of a tile's UV square
pub fn udim_tile_origin(tile: u32) -> [f32; 2] {
    let index = tile.saturating_sub(1001);
    [(index % 10) as f32, (index / 10) as f32]
}

/// Position of a UDIM coordinate on the side-by-side atlas of `tiles`.
/// Coordinates on a tile outside the list land on the first atlas slot.
pub fn udim_to_atlas(coord: [f32; 2], tiles: &[u32]) -> [f32; 2] {
    let count = tiles.len().max(1) as f32;
    let tile = udim_tile_of(coord);
    let index = tiles.iter().position(|t| *t == tile).unwrap_or(0) as f32;
    let [u, v] = coord;
    [(index + u.fract()) / count, v.fract()]
}

/// Inverse of [`udim_to_atlas`]: the UDIM coordinate behind an atlas
/// position
pub fn atlas_to_udim([u, v]: [f32; 2], tiles: &[u32]) -> [f32; 2] {
    if tiles.is_empty() {
        return [u, v];
    }
    let count = tiles.len() as f32;
    let scaled = (u * count).clamp(0.0, count - f32::EPSILON);
    let index = scaled.floor() as usize;
    let [origin_u, origin_v] = udim_tile_origin(tiles[index.min(tiles.len() - 1)]);
    [origin_u + scaled.fract(), origin_v + v]
}

/// Build (or rebuild) the atlas layer `atlas_name` from the active layer
/// and make it the active layer
pub fn build_udim_atlas(mesh: &mut Mesh, atlas_name: &str, tiles: &[u32]) -> BakeResult<()> {
    let source = active_layer_name(mesh)?;
    let coords: Vec<[f32; 2]> = mesh
        .uv_layers
        .iter()
        .find(|l| l.name == source)
        .map(|l| l.coords.iter().map(|c| udim_to_atlas(*c, tiles)).collect())
        .unwrap_or_default();

    match mesh.uv_layer_mut(atlas_name) {
        Some(layer) => layer.coords = coords,
        None => mesh.uv_layers.push(UvLayer {
            name: atlas_name.to_string(),
            active: false,
            coords,
        }),
    }
    mesh.set_active_uv_layer(atlas_name);
    Ok(())
}
