//! Host scene contract
//!
//! The host application's scene is an external collaborator. These types are
//! the subset of it the pipeline needs: objects and their material slots,
//! meshes with UV layers, materials and node groups as shader graphs, and the
//! images those graphs reference. A scene can be read from a JSON
//! description, and isolated task bundles reuse the same types.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::SceneError;

/// Complete scene description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    /// Where the host project is saved, if it has been saved at all
    pub project_path: Option<PathBuf>,
    pub objects: Vec<SceneObject>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub node_groups: Vec<NodeGroup>,
    pub images: Vec<ImageData>,
}

impl Scene {
    /// Load a scene description from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn object(&self, name: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn object_mut(&mut self, name: &str) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|o| o.name == name)
    }

    pub fn mesh(&self, name: &str) -> Option<&Mesh> {
        self.meshes.iter().find(|m| m.name == name)
    }

    pub fn mesh_mut(&mut self, name: &str) -> Option<&mut Mesh> {
        self.meshes.iter_mut().find(|m| m.name == name)
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    pub fn material_by_uuid(&self, uuid: &Uuid) -> Option<&Material> {
        self.materials.iter().find(|m| &m.uuid == uuid)
    }

    pub fn node_group(&self, name: &str) -> Option<&NodeGroup> {
        self.node_groups.iter().find(|g| g.name == name)
    }

    pub fn image(&self, name: &str) -> Option<&ImageData> {
        self.images.iter().find(|i| i.name == name)
    }

    pub fn image_mut(&mut self, name: &str) -> Option<&mut ImageData> {
        self.images.iter_mut().find(|i| i.name == name)
    }

    /// Mesh data behind a mesh object, `None` for other object kinds
    pub fn mesh_for(&self, object: &SceneObject) -> Result<Option<&Mesh>, SceneError> {
        match &object.kind {
            ObjectKind::Mesh { mesh } => self
                .mesh(mesh)
                .map(Some)
                .ok_or_else(|| SceneError::MeshNotFound(mesh.clone())),
            _ => Ok(None),
        }
    }

    /// Every object in the scene with at least one slot using `material`
    pub fn users_of_material<'a>(
        &'a self,
        material: &'a str,
    ) -> impl Iterator<Item = &'a SceneObject> + 'a {
        self.objects
            .iter()
            .filter(move |o| o.material_slots.iter().flatten().any(|m| m == material))
    }
}

/// Object kinds the pipeline distinguishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectKind {
    Mesh { mesh: String },
    Curve,
    Empty,
    Other,
}

/// A scene object with its material slots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    #[serde(flatten)]
    pub kind: ObjectKind,
    #[serde(default)]
    pub material_slots: Vec<Option<String>>,
    #[serde(default = "default_exportable")]
    pub exportable: bool,
}

fn default_exportable() -> bool {
    true
}

impl SceneObject {
    pub fn is_mesh(&self) -> bool {
        matches!(self.kind, ObjectKind::Mesh { .. })
    }
}

/// Mesh polygon with its material slot index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<u32>,
    #[serde(default)]
    pub material_index: u32,
}

/// Per-loop UV coordinates of one UV layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UvLayer {
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub coords: Vec<[f32; 2]>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Mesh {
    pub name: String,
    pub vertex_count: u32,
    pub polygons: Vec<Polygon>,
    pub uv_layers: Vec<UvLayer>,
}

impl Mesh {
    pub fn has_uv_map(&self) -> bool {
        !self.uv_layers.is_empty()
    }

    /// The active UV layer, falling back to the first one
    pub fn active_uv_layer(&self) -> Option<&UvLayer> {
        self.uv_layers
            .iter()
            .find(|l| l.active)
            .or_else(|| self.uv_layers.first())
    }

    pub fn uv_layer_mut(&mut self, name: &str) -> Option<&mut UvLayer> {
        self.uv_layers.iter_mut().find(|l| l.name == name)
    }

    /// Make `name` the only active UV layer. Returns false if it does not exist.
    pub fn set_active_uv_layer(&mut self, name: &str) -> bool {
        if !self.uv_layers.iter().any(|l| l.name == name) {
            return false;
        }
        for layer in &mut self.uv_layers {
            layer.active = layer.name == name;
        }
        true
    }
}

/// Shader node types the pipeline reasons about. Anything else is kept
/// verbatim in [`NodeType::Other`] and treated as procedural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    OutputMaterial,
    PrincipledBsdf,
    DiffuseBsdf,
    GlossyBsdf,
    Emission,
    MixShader,
    AddShader,
    ImageTexture,
    TexCoord,
    UvMap,
    Mapping,
    Reroute,
    Attribute,
    NormalMap,
    Displacement,
    Group,
    GroupInput,
    GroupOutput,
    Value,
    Rgb,
    Other(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::OutputMaterial => "output_material",
            NodeType::PrincipledBsdf => "principled_bsdf",
            NodeType::DiffuseBsdf => "diffuse_bsdf",
            NodeType::GlossyBsdf => "glossy_bsdf",
            NodeType::Emission => "emission",
            NodeType::MixShader => "mix_shader",
            NodeType::AddShader => "add_shader",
            NodeType::ImageTexture => "image_texture",
            NodeType::TexCoord => "tex_coord",
            NodeType::UvMap => "uv_map",
            NodeType::Mapping => "mapping",
            NodeType::Reroute => "reroute",
            NodeType::Attribute => "attribute",
            NodeType::NormalMap => "normal_map",
            NodeType::Displacement => "displacement",
            NodeType::Group => "group",
            NodeType::GroupInput => "group_input",
            NodeType::GroupOutput => "group_output",
            NodeType::Value => "value",
            NodeType::Rgb => "rgb",
            NodeType::Other(name) => name,
        }
    }

    /// Surface shader nodes that can act as a material's main shader
    pub fn is_bsdf(&self) -> bool {
        matches!(
            self,
            NodeType::PrincipledBsdf
                | NodeType::DiffuseBsdf
                | NodeType::GlossyBsdf
                | NodeType::Emission
        )
    }

    /// Nodes that combine two shader results
    pub fn is_shader_combiner(&self) -> bool {
        matches!(self, NodeType::MixShader | NodeType::AddShader)
    }
}

impl From<String> for NodeType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "output_material" => NodeType::OutputMaterial,
            "principled_bsdf" => NodeType::PrincipledBsdf,
            "diffuse_bsdf" => NodeType::DiffuseBsdf,
            "glossy_bsdf" => NodeType::GlossyBsdf,
            "emission" => NodeType::Emission,
            "mix_shader" => NodeType::MixShader,
            "add_shader" => NodeType::AddShader,
            "image_texture" => NodeType::ImageTexture,
            "tex_coord" => NodeType::TexCoord,
            "uv_map" => NodeType::UvMap,
            "mapping" => NodeType::Mapping,
            "reroute" => NodeType::Reroute,
            "attribute" => NodeType::Attribute,
            "normal_map" => NodeType::NormalMap,
            "displacement" => NodeType::Displacement,
            "group" => NodeType::Group,
            "group_input" => NodeType::GroupInput,
            "group_output" => NodeType::GroupOutput,
            "value" => NodeType::Value,
            "rgb" => NodeType::Rgb,
            _ => NodeType::Other(value),
        }
    }
}

impl From<NodeType> for String {
    fn from(value: NodeType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An input socket with its unlinked default value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSocket {
    pub name: String,
    #[serde(default)]
    pub default: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderNode {
    /// Unique within its tree
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub properties: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub inputs: Vec<NodeSocket>,
    /// Image datablock name for image texture nodes
    #[serde(default)]
    pub image: Option<String>,
    /// Node group name for group nodes
    #[serde(default)]
    pub group: Option<String>,
}

impl ShaderNode {
    pub fn input(&self, name: &str) -> Option<&NodeSocket> {
        self.inputs.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeLink {
    pub from_node: String,
    pub from_socket: String,
    pub to_node: String,
    pub to_socket: String,
}

/// A shader graph: nodes plus directed links between their sockets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeTree {
    pub nodes: Vec<ShaderNode>,
    pub links: Vec<NodeLink>,
}

impl NodeTree {
    pub fn node(&self, name: &str) -> Option<&ShaderNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Links feeding the given input socket
    pub fn links_into<'a>(
        &'a self,
        node: &'a str,
        socket: &'a str,
    ) -> impl Iterator<Item = &'a NodeLink> + 'a {
        self.links
            .iter()
            .filter(move |l| l.to_node == node && l.to_socket == socket)
    }

    /// Links feeding any input socket of the given node
    pub fn links_into_node<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a NodeLink> + 'a {
        self.links.iter().filter(move |l| l.to_node == node)
    }

    pub fn is_linked(&self, node: &str, socket: &str) -> bool {
        self.links_into(node, socket).next().is_some()
    }

    /// The active material output node. Prefers a node flagged
    /// `is_active_output`, otherwise the first output node.
    pub fn output_node(&self) -> Option<&ShaderNode> {
        let mut outputs = self
            .nodes
            .iter()
            .filter(|n| n.node_type == NodeType::OutputMaterial);
        let first = outputs.next()?;
        if is_active_output(first) {
            return Some(first);
        }
        outputs.find(|n| is_active_output(n)).or(Some(first))
    }

    pub fn nodes_of_type<'a>(&'a self, node_type: &'a NodeType) -> impl Iterator<Item = &'a ShaderNode> + 'a {
        self.nodes.iter().filter(move |n| &n.node_type == node_type)
    }
}

fn is_active_output(node: &ShaderNode) -> bool {
    node.properties
        .get("is_active_output")
        .and_then(JsonValue::as_bool)
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub uuid: Uuid,
    #[serde(default)]
    pub tree: NodeTree,
}

/// Reusable sub-graph referenced by group nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGroup {
    pub name: String,
    #[serde(default)]
    pub tree: NodeTree,
}

/// One tile of a UDIM-tiled image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdimTile {
    /// Tile number, 1001 for the first tile
    pub number: u32,
    pub filepath: PathBuf,
    #[serde(default)]
    pub size: [u32; 2],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    #[default]
    Single,
    Tiled { tiles: Vec<UdimTile> },
}

/// Image datablock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub name: String,
    /// File path; for tiled images a template containing `<UDIM>`
    pub filepath: PathBuf,
    #[serde(default)]
    pub size: [u32; 2],
    #[serde(default)]
    pub source: ImageSource,
}

impl ImageData {
    pub fn is_tiled(&self) -> bool {
        matches!(self.source, ImageSource::Tiled { .. })
    }

    pub fn tiles(&self) -> &[UdimTile] {
        match &self.source {
            ImageSource::Tiled { tiles } => tiles,
            ImageSource::Single => &[],
        }
    }

    pub fn pixel_area(&self) -> u64 {
        u64::from(self.size[0]) * u64::from(self.size[1])
    }
}
