//! Material classification
//!
//! Exactly one strategy applies to a material, checked in priority order:
//! UDIM-tiled, decal, complex, simple.

use std::collections::BTreeSet;
use tracing::debug;

use texbake_core::{
    ChannelSpec, ImageData, Material, NodeType, Resolution, Scene, ShaderNode, PBR_CHANNELS,
};

use crate::error::ClassifyError;
use crate::graph::{MaterialGraph, NodeRef, Port, Walk};
use crate::resolution::{material_resolution, udim_resolution};

/// Input sockets of shader combiner nodes
pub const SHADER_INPUT: &str = "Shader";
pub const SECOND_SHADER_INPUT: &str = "Shader_001";
pub const MIX_FACTOR_INPUT: &str = "Fac";

/// Node types a simple material may route texture data through
fn is_safe_passthrough(node_type: &NodeType) -> bool {
    matches!(
        node_type,
        NodeType::TexCoord
            | NodeType::UvMap
            | NodeType::Mapping
            | NodeType::Reroute
            | NodeType::Attribute
            | NodeType::NormalMap
            | NodeType::Displacement
    )
}

/// Node locations of a two-shader decal setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecalLayout {
    pub mix_node: NodeRef,
    pub base_shader: NodeRef,
    pub decal_shader: NodeRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BakeStrategy {
    /// A connected image is tiled; bake onto a merged atlas
    Udim { tiles: Vec<u32> },
    /// Two shaders blended by a mix shader on the surface path
    Decal(DecalLayout),
    /// Some connected branch contains a procedural node
    Complex,
    /// Every connected branch ends at image textures; copy instead of bake
    Simple,
}

impl BakeStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            BakeStrategy::Udim { .. } => "udim",
            BakeStrategy::Decal(_) => "decal",
            BakeStrategy::Complex => "complex",
            BakeStrategy::Simple => "simple",
        }
    }

    pub fn needs_bake(&self) -> bool {
        !matches!(self, BakeStrategy::Simple)
    }
}

/// A PBR channel with something linked into it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedChannel {
    pub spec: &'static ChannelSpec,
    pub port: Port,
}

impl ConnectedChannel {
    pub fn socket(&self) -> &'static str {
        self.spec.socket
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub strategy: BakeStrategy,
    pub main_shader: Option<NodeRef>,
    pub output: NodeRef,
    pub channels: Vec<ConnectedChannel>,
    pub resolution: Resolution,
}

impl Classification {
    pub fn channel(&self, socket: &str) -> Option<&ConnectedChannel> {
        self.channels.iter().find(|c| c.socket() == socket)
    }
}

/// Classify a material of `scene`
pub fn classify(
    material: &Material,
    scene: &Scene,
    default_resolution: u32,
) -> Result<Classification, ClassifyError> {
    let graph = MaterialGraph::new(&material.tree, &scene.node_groups);
    let output = graph
        .output()
        .ok_or_else(|| ClassifyError::NoOutputNode(material.name.clone()))?;

    let surface = find_surface(&graph, &output);
    let main_shader = surface.main_shader.clone();
    let channels = connected_channels(&graph, &output, main_shader.as_ref());

    let tiled = connected_images(&graph, &output, scene)
        .into_iter()
        .filter(|image| image.is_tiled())
        .collect::<Vec<_>>();

    let (strategy, resolution) = if !tiled.is_empty() {
        let tiles: BTreeSet<u32> = tiled
            .iter()
            .flat_map(|image| image.tiles().iter().map(|t| t.number))
            .collect();
        (
            BakeStrategy::Udim {
                tiles: tiles.into_iter().collect(),
            },
            udim_resolution(&tiled, default_resolution),
        )
    } else {
        let resolution = material_resolution(&graph, scene, default_resolution);
        let strategy = match (surface.mix, main_shader.clone()) {
            (Some((mix_node, Some(decal_shader))), Some(base_shader)) => {
                BakeStrategy::Decal(DecalLayout {
                    mix_node,
                    base_shader,
                    decal_shader,
                })
            }
            _ if main_shader.is_none() => BakeStrategy::Complex,
            _ if channels.iter().all(|c| is_texture_only(&graph, &c.port)) => BakeStrategy::Simple,
            _ => BakeStrategy::Complex,
        };
        (strategy, resolution)
    };

    debug!(
        material = %material.name,
        strategy = strategy.name(),
        channels = channels.len(),
        %resolution,
        "Classified material"
    );

    Ok(Classification {
        strategy,
        main_shader,
        output,
        channels,
        resolution,
    })
}

struct Surface {
    main_shader: Option<NodeRef>,
    /// First mix shader on the path to the main shader and the shader on
    /// its second input, if any
    mix: Option<(NodeRef, Option<NodeRef>)>,
}

/// Follow the surface input down to the main shader along first shader
/// inputs, remembering the first mix shader crossed on the way
fn find_surface(graph: &MaterialGraph<'_>, output: &NodeRef) -> Surface {
    let mut main_shader = None;
    let mut mix = None;

    graph.walk_upstream(output.port("Surface"), |node_ref, node| {
        if node.node_type.is_bsdf() {
            main_shader = Some(node_ref.clone());
            return Walk::Halt;
        }
        match node.node_type {
            NodeType::MixShader => {
                if mix.is_none() {
                    mix = Some(node_ref.clone());
                }
                Walk::Follow(SHADER_INPUT)
            }
            NodeType::AddShader => Walk::Follow(SHADER_INPUT),
            NodeType::Reroute => Walk::Descend,
            _ => Walk::Stop,
        }
    });

    let mix = mix.map(|mix_node| {
        let decal = graph
            .find_upstream(mix_node.port(SECOND_SHADER_INPUT), |n| n.node_type.is_bsdf())
            .map(|(node_ref, _)| node_ref);
        (mix_node, decal)
    });

    Surface { main_shader, mix }
}

/// PBR channels with a link into the main shader or, for output-node
/// channels, into the output node
fn connected_channels(
    graph: &MaterialGraph<'_>,
    output: &NodeRef,
    main_shader: Option<&NodeRef>,
) -> Vec<ConnectedChannel> {
    PBR_CHANNELS
        .iter()
        .filter_map(|spec| {
            let owner = if spec.on_output { Some(output) } else { main_shader }?;
            let port = owner.port(spec.socket);
            graph
                .is_linked(&port)
                .then_some(ConnectedChannel { spec, port })
        })
        .collect()
}

/// Images reached from any linked input of the output node
fn connected_images<'s>(
    graph: &MaterialGraph<'_>,
    output: &NodeRef,
    scene: &'s Scene,
) -> Vec<&'s ImageData> {
    let mut images: Vec<&'s ImageData> = Vec::new();
    let Some(tree) = graph.tree(&output.scope) else {
        return images;
    };

    let sockets: BTreeSet<&str> = tree
        .links_into_node(&output.name)
        .map(|l| l.to_socket.as_str())
        .collect();

    for socket in sockets {
        graph.walk_upstream(output.port(socket), |_, node| {
            if let Some(image) = image_of(node, scene) {
                if !images.iter().any(|i| i.name == image.name) {
                    images.push(image);
                }
            }
            Walk::Descend
        });
    }
    images
}

fn image_of<'s>(node: &ShaderNode, scene: &'s Scene) -> Option<&'s ImageData> {
    if node.node_type != NodeType::ImageTexture {
        return None;
    }
    node.image.as_deref().and_then(|name| scene.image(name))
}

/// True when every branch feeding `port` ends at an image texture, passing
/// only through safe passthrough nodes, and at least one image is reached
fn is_texture_only(graph: &MaterialGraph<'_>, port: &Port) -> bool {
    let mut reached_image = false;
    let mut procedural = false;

    graph.walk_upstream(port.clone(), |_, node| {
        if node.node_type == NodeType::ImageTexture {
            reached_image = true;
            Walk::Stop
        } else if is_safe_passthrough(&node.node_type) {
            Walk::Descend
        } else {
            procedural = true;
            Walk::Halt
        }
    });

    reached_image && !procedural
}

/// First image texture feeding a channel, used to copy simple materials
pub fn first_image<'s>(
    graph: &MaterialGraph<'_>,
    port: &Port,
    scene: &'s Scene,
) -> Option<&'s ImageData> {
    graph
        .find_upstream(port.clone(), |n| n.node_type == NodeType::ImageTexture)
        .and_then(|(_, node)| image_of(node, scene))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scene(materials: serde_json::Value) -> Scene {
        serde_json::from_value(json!({
            "materials": materials,
            "images": [
                {"name": "wood", "filepath": "/t/wood.png", "size": [1024, 1024]},
                {"name": "big", "filepath": "/t/big.png", "size": [4096, 4096]},
                {"name": "tiles", "filepath": "/t/tiles.<UDIM>.png", "size": [512, 512],
                 "source": {"kind": "tiled", "tiles": [
                    {"number": 1002, "filepath": "/t/tiles.1002.png", "size": [512, 512]},
                    {"number": 1001, "filepath": "/t/tiles.1001.png", "size": [512, 512]}
                 ]}}
            ]
        }))
        .unwrap()
    }

    fn material(nodes: serde_json::Value, links: serde_json::Value) -> serde_json::Value {
        json!({
            "name": "M",
            "uuid": "0b8f8a5e-0c36-4c55-93c1-2a8c1a4f6d11",
            "tree": {"nodes": nodes, "links": links}
        })
    }

    fn link(from: &str, from_socket: &str, to: &str, to_socket: &str) -> serde_json::Value {
        json!({"from_node": from, "from_socket": from_socket, "to_node": to, "to_socket": to_socket})
    }

    fn classify_one(material: serde_json::Value) -> Result<Classification, ClassifyError> {
        let scene = scene(json!([material]));
        classify(&scene.materials[0], &scene, 2048)
    }

    #[test]
    fn test_simple_texture_material() {
        let result = classify_one(material(
            json!([
                {"name": "Out", "type": "output_material"},
                {"name": "BSDF", "type": "principled_bsdf"},
                {"name": "Tex", "type": "image_texture", "image": "wood"},
                {"name": "Map", "type": "mapping"},
                {"name": "Coord", "type": "tex_coord"}
            ]),
            json!([
                link("BSDF", "BSDF", "Out", "Surface"),
                link("Tex", "Color", "BSDF", "Base Color"),
                link("Map", "Vector", "Tex", "Vector"),
                link("Coord", "UV", "Map", "Vector")
            ]),
        ))
        .unwrap();

        assert_eq!(result.strategy, BakeStrategy::Simple);
        assert_eq!(result.main_shader, Some(NodeRef::root("BSDF")));
        assert_eq!(result.channels.len(), 1);
        assert_eq!(result.channels[0].socket(), "Base Color");
        assert_eq!(result.resolution, Resolution::square(1024));
    }

    #[test]
    fn test_noise_makes_material_complex() {
        let result = classify_one(material(
            json!([
                {"name": "Out", "type": "output_material"},
                {"name": "BSDF", "type": "principled_bsdf"},
                {"name": "Noise", "type": "tex_noise"},
                {"name": "Tex", "type": "image_texture", "image": "big"}
            ]),
            json!([
                link("BSDF", "BSDF", "Out", "Surface"),
                link("Noise", "Color", "BSDF", "Base Color"),
                link("Tex", "Color", "BSDF", "Roughness")
            ]),
        ))
        .unwrap();

        assert_eq!(result.strategy, BakeStrategy::Complex);
        let sockets: Vec<_> = result.channels.iter().map(|c| c.socket()).collect();
        assert_eq!(sockets, vec!["Base Color", "Roughness"]);
        assert_eq!(result.resolution, Resolution::square(4096));
    }

    #[test]
    fn test_decal_mix_on_surface_path() {
        let result = classify_one(material(
            json!([
                {"name": "Out", "type": "output_material"},
                {"name": "Mix", "type": "mix_shader"},
                {"name": "Base", "type": "principled_bsdf"},
                {"name": "Sticker", "type": "principled_bsdf"},
                {"name": "Tex", "type": "image_texture", "image": "wood"}
            ]),
            json!([
                link("Mix", "Shader", "Out", "Surface"),
                link("Base", "BSDF", "Mix", "Shader"),
                link("Sticker", "BSDF", "Mix", "Shader_001"),
                link("Tex", "Alpha", "Mix", "Fac"),
                link("Tex", "Color", "Base", "Base Color")
            ]),
        ))
        .unwrap();

        match result.strategy {
            BakeStrategy::Decal(layout) => {
                assert_eq!(layout.mix_node, NodeRef::root("Mix"));
                assert_eq!(layout.base_shader, NodeRef::root("Base"));
                assert_eq!(layout.decal_shader, NodeRef::root("Sticker"));
            }
            other => panic!("expected decal, got {:?}", other),
        }
    }

    #[test]
    fn test_udim_takes_priority_over_decal() {
        let result = classify_one(material(
            json!([
                {"name": "Out", "type": "output_material"},
                {"name": "Mix", "type": "mix_shader"},
                {"name": "Base", "type": "principled_bsdf"},
                {"name": "Sticker", "type": "principled_bsdf"},
                {"name": "Tiles", "type": "image_texture", "image": "tiles"}
            ]),
            json!([
                link("Mix", "Shader", "Out", "Surface"),
                link("Base", "BSDF", "Mix", "Shader"),
                link("Sticker", "BSDF", "Mix", "Shader_001"),
                link("Tiles", "Color", "Base", "Base Color")
            ]),
        ))
        .unwrap();

        assert_eq!(result.strategy, BakeStrategy::Udim { tiles: vec![1001, 1002] });
        assert_eq!(result.resolution, Resolution::new(1024, 512));
    }

    #[test]
    fn test_missing_output_is_error() {
        let err = classify_one(material(
            json!([{"name": "BSDF", "type": "principled_bsdf"}]),
            json!([]),
        ))
        .unwrap_err();
        assert!(err.is_exclusion());
    }

    #[test]
    fn test_no_main_shader_is_never_simple() {
        let result = classify_one(material(
            json!([
                {"name": "Out", "type": "output_material"},
                {"name": "Tex", "type": "image_texture", "image": "wood"}
            ]),
            json!([link("Tex", "Color", "Out", "Displacement")]),
        ))
        .unwrap();
        assert_eq!(result.strategy, BakeStrategy::Complex);
        assert!(result.main_shader.is_none());
        assert_eq!(result.channels[0].socket(), "Displacement");
    }

    #[test]
    fn test_texture_inside_group_stays_simple() {
        let mut scene = scene(json!([material(
            json!([
                {"name": "Out", "type": "output_material"},
                {"name": "BSDF", "type": "principled_bsdf"},
                {"name": "Grp", "type": "group", "group": "Wrap"}
            ]),
            json!([
                link("BSDF", "BSDF", "Out", "Surface"),
                link("Grp", "Color", "BSDF", "Base Color")
            ]),
        )]));
        scene.node_groups = serde_json::from_value(json!([
            {"name": "Wrap", "tree": {
                "nodes": [
                    {"name": "Tex", "type": "image_texture", "image": "wood"},
                    {"name": "R", "type": "reroute"},
                    {"name": "GOut", "type": "group_output"}
                ],
                "links": [
                    link("Tex", "Color", "R", "Input"),
                    link("R", "Output", "GOut", "Color")
                ]
            }}
        ]))
        .unwrap();

        let result = classify(&scene.materials[0], &scene, 2048).unwrap();
        assert_eq!(result.strategy, BakeStrategy::Simple);
    }

    #[test]
    fn test_each_material_gets_exactly_one_strategy() {
        let cases = vec![
            material(json!([{"name": "Out", "type": "output_material"}]), json!([])),
            material(
                json!([
                    {"name": "Out", "type": "output_material"},
                    {"name": "E", "type": "emission"},
                    {"name": "V", "type": "value"}
                ]),
                json!([link("E", "Emission", "Out", "Surface"), link("V", "Value", "E", "Strength")]),
            ),
        ];
        for case in cases {
            let strategy = classify_one(case).unwrap().strategy;
            let matches = [
                matches!(strategy, BakeStrategy::Udim { .. }),
                matches!(strategy, BakeStrategy::Decal(_)),
                matches!(strategy, BakeStrategy::Complex),
                matches!(strategy, BakeStrategy::Simple),
            ];
            assert_eq!(matches.iter().filter(|m| **m).count(), 1);
        }
    }
}
