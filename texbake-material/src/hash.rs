//! Content hashing of materials
//!
//! The digest covers everything that influences the baked textures of a
//! material on one object slot: graph structure, parameters, image pixel
//! content and, optionally, the mesh the material is baked onto.

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use tracing::warn;

use texbake_caching::ImageHashCache;
use texbake_core::{ContentHash, ImageData, ImageSource, Material, Mesh, NodeTree, NodeType, Scene};

use crate::graph::MaterialGraph;

/// Bumped whenever the digest layout changes so that stale cache entries
/// never match
pub const HASH_RECIPE: &str = "texbake-hash-v1";

/// Mesh data of the object a material is baked onto
#[derive(Debug, Clone, Copy)]
pub struct MeshContext<'a> {
    pub mesh: &'a Mesh,
    /// Material slot of the object the material sits in
    pub slot_index: u32,
}

/// SHA-256 of a file's bytes, hex encoded
pub fn file_digest(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Length-prefixed field writer so that adjacent fields cannot alias
struct Fields(Sha256);

impl Fields {
    fn new() -> Self {
        Fields(Sha256::new())
    }

    fn put(&mut self, tag: &str, value: &[u8]) {
        self.0.update(tag.as_bytes());
        self.0.update((value.len() as u64).to_le_bytes());
        self.0.update(value);
    }

    fn put_str(&mut self, tag: &str, value: &str) {
        self.put(tag, value.as_bytes());
    }

    fn put_json(&mut self, tag: &str, value: &JsonValue) {
        // serde_json maps are ordered (BTreeMap) without preserve_order, so
        // the encoding is stable
        self.put_str(tag, &value.to_string());
    }

    fn finish(self) -> ContentHash {
        ContentHash::new(format!("{:x}", self.0.finalize()))
    }
}

/// Computes content hashes against a scene, memoizing image digests
pub struct MaterialHasher<'a> {
    scene: &'a Scene,
    images: &'a ImageHashCache,
    include_mesh_context: bool,
}

impl<'a> MaterialHasher<'a> {
    pub fn new(scene: &'a Scene, images: &'a ImageHashCache, include_mesh_context: bool) -> Self {
        Self {
            scene,
            images,
            include_mesh_context,
        }
    }

    /// Hash of a material as baked onto `mesh` (when mesh context is
    /// enabled). Channels of one material share the hash; a cache entry
    /// under it maps every produced channel to its texture.
    pub fn hash(&self, material: &Material, mesh: Option<MeshContext<'_>>) -> ContentHash {
        let graph = MaterialGraph::new(&material.tree, &self.scene.node_groups);
        let mut fields = Fields::new();
        fields.put_str("recipe", HASH_RECIPE);

        self.put_tree(&mut fields, "root", &material.tree);

        let mut groups = graph.reachable_groups();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        for group in groups {
            fields.put_str("group", &group.name);
            self.put_tree(&mut fields, "group_tree", &group.tree);
        }

        let mut image_names: Vec<&str> = graph
            .all_nodes()
            .filter(|n| n.node_type == NodeType::ImageTexture)
            .filter_map(|n| n.image.as_deref())
            .collect();
        image_names.sort_unstable();
        image_names.dedup();
        for name in image_names {
            fields.put_str("image", name);
            match self.scene.image(name) {
                Some(image) => self.put_image(&mut fields, image),
                None => fields.put_str("image_missing", name),
            }
        }

        if self.include_mesh_context {
            if let Some(context) = mesh {
                put_mesh(&mut fields, context);
            }
        }

        fields.finish()
    }

    fn put_tree(&self, fields: &mut Fields, tag: &str, tree: &NodeTree) {
        fields.put_str(tag, "");

        let mut nodes: Vec<_> = tree.nodes.iter().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        for node in nodes {
            fields.put_str("node", &node.name);
            fields.put_str("type", node.node_type.as_str());
            for (key, value) in &node.properties {
                fields.put_str("prop", key);
                fields.put_json("value", value);
            }

            let mut inputs: Vec<_> = node
                .inputs
                .iter()
                .filter(|socket| !tree.is_linked(&node.name, &socket.name))
                .collect();
            inputs.sort_by(|a, b| a.name.cmp(&b.name));
            for socket in inputs {
                fields.put_str("input", &socket.name);
                fields.put_json("default", socket.default.as_ref().unwrap_or(&JsonValue::Null));
            }

            if let Some(image) = &node.image {
                fields.put_str("node_image", image);
            }
            if let Some(group) = &node.group {
                fields.put_str("node_group", group);
            }
        }

        let mut links: Vec<_> = tree.links.iter().collect();
        links.sort();
        for link in links {
            fields.put_str("link_from", &link.from_node);
            fields.put_str("link_from_socket", &link.from_socket);
            fields.put_str("link_to", &link.to_node);
            fields.put_str("link_to_socket", &link.to_socket);
        }
    }

    fn put_image(&self, fields: &mut Fields, image: &ImageData) {
        match &image.source {
            ImageSource::Single => {
                fields.put_str("pixels", &self.digest(&image.filepath));
            }
            ImageSource::Tiled { tiles } => {
                let mut tiles: Vec<_> = tiles.iter().collect();
                tiles.sort_by_key(|t| t.number);
                for tile in tiles {
                    fields.put("tile", &tile.number.to_le_bytes());
                    fields.put_str("tile_pixels", &self.digest(&tile.filepath));
                }
            }
        }
    }

    /// Pixel digest of an image file. Unreadable files hash by path so
    /// that the material still gets a stable key.
    fn digest(&self, path: &Path) -> String {
        match self.images.digest_with(path, file_digest) {
            Ok(digest) => digest,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Image unreadable, hashing its path");
                format!("missing:{}", path.display())
            }
        }
    }
}

fn put_mesh(fields: &mut Fields, context: MeshContext<'_>) {
    let mesh = context.mesh;
    fields.put("slot", &context.slot_index.to_le_bytes());
    fields.put("vertex_count", &mesh.vertex_count.to_le_bytes());

    for polygon in &mesh.polygons {
        let mut bytes = Vec::with_capacity(polygon.vertices.len() * 4 + 4);
        bytes.extend_from_slice(&polygon.material_index.to_le_bytes());
        for vertex in &polygon.vertices {
            bytes.extend_from_slice(&vertex.to_le_bytes());
        }
        fields.put("polygon", &bytes);
    }

    for layer in &mesh.uv_layers {
        fields.put_str("uv_layer", &layer.name);
        let mut bytes = Vec::with_capacity(layer.coords.len() * 8);
        for [u, v] in &layer.coords {
            bytes.extend_from_slice(&u.to_bits().to_le_bytes());
            bytes.extend_from_slice(&v.to_bits().to_le_bytes());
        }
        fields.put("uv_coords", &bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scene_with(dir: &Path) -> Scene {
        std::fs::write(dir.join("a.png"), b"tile-a").unwrap();
        std::fs::write(dir.join("b.png"), b"tile-b").unwrap();
        serde_json::from_value(json!({
            "materials": [{
                "name": "Tiles",
                "uuid": "5d2b1c8e-9f0a-4e7b-8c6d-3a2f1e0d9c8b",
                "tree": {
                    "nodes": [
                        {"name": "Out", "type": "output_material"},
                        {"name": "BSDF", "type": "principled_bsdf",
                         "inputs": [{"name": "Roughness", "default": 0.5}]},
                        {"name": "Tex", "type": "image_texture", "image": "udim"}
                    ],
                    "links": [
                        {"from_node": "BSDF", "from_socket": "BSDF", "to_node": "Out", "to_socket": "Surface"},
                        {"from_node": "Tex", "from_socket": "Color", "to_node": "BSDF", "to_socket": "Base Color"}
                    ]
                }
            }],
            "meshes": [{"name": "Quad", "vertex_count": 4,
                        "polygons": [{"vertices": [0, 1, 2, 3]}],
                        "uv_layers": [{"name": "UVMap", "coords": [[0,0],[1,0],[1,1],[0,1]]}]}],
            "images": [{
                "name": "udim",
                "filepath": dir.join("t.<UDIM>.png"),
                "source": {"kind": "tiled", "tiles": [
                    {"number": 1001, "filepath": dir.join("a.png")},
                    {"number": 1002, "filepath": dir.join("b.png")}
                ]}
            }]
        }))
        .unwrap()
    }

    fn hash_of(scene: &Scene, include_mesh: bool) -> ContentHash {
        let cache = ImageHashCache::with_memoization(false);
        let hasher = MaterialHasher::new(scene, &cache, include_mesh);
        let mesh = MeshContext {
            mesh: &scene.meshes[0],
            slot_index: 0,
        };
        hasher.hash(&scene.materials[0], Some(mesh))
    }

    #[test]
    fn test_hash_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let scene = scene_with(dir.path());
        let first = hash_of(&scene, true);
        assert_eq!(first, hash_of(&scene, true));
        assert_eq!(first.as_str().len(), 64);
    }

    #[test]
    fn test_tile_pixel_change_changes_hash() {
        let dir = tempfile::tempdir().unwrap();
        let scene = scene_with(dir.path());
        let before = hash_of(&scene, true);

        std::fs::write(dir.path().join("b.png"), b"tile-b-repainted").unwrap();
        assert_ne!(before, hash_of(&scene, true));
    }

    #[test]
    fn test_tile_number_swap_changes_hash() {
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene_with(dir.path());
        let before = hash_of(&scene, true);

        if let ImageSource::Tiled { tiles } = &mut scene.images[0].source {
            tiles[0].number = 1002;
            tiles[1].number = 1001;
        }
        assert_ne!(before, hash_of(&scene, true));
    }

    #[test]
    fn test_unlinked_default_changes_hash() {
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene_with(dir.path());
        let before = hash_of(&scene, false);

        scene.materials[0].tree.nodes[1].inputs[0].default = Some(json!(0.8));
        assert_ne!(before, hash_of(&scene, false));
    }

    #[test]
    fn test_mesh_context_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene_with(dir.path());
        let with_mesh = hash_of(&scene, true);
        let without_mesh = hash_of(&scene, false);
        assert_ne!(with_mesh, without_mesh);

        scene.meshes[0].uv_layers[0].coords[2] = [0.5, 0.5];
        assert_ne!(with_mesh, hash_of(&scene, true));
        assert_eq!(without_mesh, hash_of(&scene, false));
    }

    #[test]
    fn test_node_order_does_not_matter() {
        let dir = tempfile::tempdir().unwrap();
        let mut scene = scene_with(dir.path());
        let before = hash_of(&scene, true);
        scene.materials[0].tree.nodes.reverse();
        scene.materials[0].tree.links.reverse();
        assert_eq!(before, hash_of(&scene, true));
    }

    #[test]
    fn test_file_digest_matches_known_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bin");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_digest(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
