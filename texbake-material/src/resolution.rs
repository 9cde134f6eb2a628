//! Bake resolution detection

use std::collections::BTreeSet;
use texbake_core::{ImageData, NodeType, Resolution, Scene};

use crate::graph::MaterialGraph;

/// Resolution of the largest image (by pixel area) referenced anywhere in
/// the material graph, nested groups included. Falls back to a square
/// `default_size` when the graph references no sized image.
pub fn material_resolution(graph: &MaterialGraph<'_>, scene: &Scene, default_size: u32) -> Resolution {
    graph
        .all_nodes()
        .filter(|n| n.node_type == NodeType::ImageTexture)
        .filter_map(|n| n.image.as_deref().and_then(|name| scene.image(name)))
        .filter(|image| image.pixel_area() > 0)
        .max_by_key(|image| image.pixel_area())
        .map(|image| Resolution::new(image.size[0], image.size[1]))
        .unwrap_or(Resolution::square(default_size))
}

/// Atlas resolution for a set of tiled images: one column per distinct tile
/// number across all of them. Tiles are assumed to share the size of the
/// first sized tile; an image's own size is used when tiles carry none.
pub fn udim_resolution(images: &[&ImageData], default_size: u32) -> Resolution {
    let count = images
        .iter()
        .flat_map(|image| image.tiles().iter().map(|t| t.number))
        .collect::<BTreeSet<u32>>()
        .len()
        .max(1) as u32;
    let sized = |size: [u32; 2]| size[0] > 0 && size[1] > 0;
    let [width, height] = images
        .iter()
        .flat_map(|image| image.tiles().iter().map(|t| t.size))
        .find(|size| sized(*size))
        .or_else(|| images.iter().map(|image| image.size).find(|size| sized(*size)))
        .unwrap_or([default_size, default_size]);

    Resolution::new(width.saturating_mul(count), height)
}
