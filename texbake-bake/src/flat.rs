//! Flat reference backend
//!
//! Bakes in texture space without a renderer. A channel's signal is reduced
//! to a constant or an image texture lookup: image textures are sampled
//! (nearest texel), `value` and `rgb` nodes and unlinked socket defaults
//! give constants, and any other node passes through its first linked
//! input. Shading accuracy is not the point; the backend exercises the full
//! bake protocol, including decal passes and UDIM atlases, with real files.

use image::{Rgba, RgbaImage};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, warn};

use texbake_core::{channel_spec, ImageSource, NodeType, Scene, ShaderNode};
use texbake_ipc::TaskMessage;
use texbake_material::{classify, MaterialGraph, NodeRef, Port, MIX_FACTOR_INPUT};

use crate::backend::{BakeBackend, BakeOutcome};
use crate::composite::composite_decal_files;
use crate::context::BakeContext;
use crate::error::{BakeError, BakeResult};
use crate::uv::{atlas_to_udim, build_udim_atlas, mirror_active_layer, udim_tile_of, udim_tile_origin};

/// Color of image references that cannot be resolved
const MISSING_IMAGE: [f32; 4] = [1.0, 0.0, 1.0, 1.0];
const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
/// Hop limit when resolving a signal through groups and passthrough nodes
const MAX_HOPS: usize = 256;
/// Used when a UDIM task names no atlas layer
const DEFAULT_ATLAS_LAYER: &str = "TexbakeAtlas";

/// A channel signal reduced to something that can be evaluated per texel
#[derive(Debug, Clone, PartialEq)]
enum Signal {
    Constant([f32; 4]),
    Texture { image: String, alpha: bool },
}

fn json_to_rgba(value: &JsonValue) -> Option<[f32; 4]> {
    match value {
        JsonValue::Number(n) => n.as_f64().map(|v| [v as f32, v as f32, v as f32, 1.0]),
        JsonValue::Bool(b) => {
            let v = if *b { 1.0 } else { 0.0 };
            Some([v, v, v, 1.0])
        }
        JsonValue::Array(items) => {
            let mut rgba = BLACK;
            let numbers: Vec<f32> = items.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect();
            match numbers.len() {
                0 => return None,
                1 => rgba = [numbers[0], numbers[0], numbers[0], 1.0],
                _ => {
                    for (slot, value) in rgba.iter_mut().zip(numbers) {
                        *slot = value;
                    }
                }
            }
            Some(rgba)
        }
        _ => None,
    }
}

enum Source<'a> {
    Node {
        node_ref: NodeRef,
        node: &'a ShaderNode,
        socket: String,
    },
    Unlinked(Port),
}

/// Reduces graph ports to signals
struct SignalCompiler<'a> {
    graph: MaterialGraph<'a>,
    scene: &'a Scene,
}

impl<'a> SignalCompiler<'a> {
    /// Follow the link into `port` through group boundaries
    fn source(&self, mut port: Port) -> Source<'a> {
        for _ in 0..MAX_HOPS {
            let Some(tree) = self.graph.tree(&port.scope) else {
                break;
            };
            let Some(link) = tree.links_into(&port.node, &port.socket).next() else {
                return Source::Unlinked(port);
            };
            let Some(from) = tree.node(&link.from_node) else {
                return Source::Unlinked(port);
            };

            match from.node_type {
                NodeType::Group => {
                    let mut inner = port.scope.clone();
                    inner.push(from.name.clone());
                    let output = self
                        .graph
                        .tree(&inner)
                        .and_then(|t| t.nodes_of_type(&NodeType::GroupOutput).next());
                    let Some(output) = output else {
                        return Source::Unlinked(port);
                    };
                    port = Port {
                        scope: inner,
                        node: output.name.clone(),
                        socket: link.from_socket.clone(),
                    };
                }
                NodeType::GroupInput => {
                    let Some((group_node, parent)) = port.scope.split_last() else {
                        return Source::Unlinked(port);
                    };
                    port = Port {
                        scope: parent.to_vec(),
                        node: group_node.clone(),
                        socket: link.from_socket.clone(),
                    };
                }
                _ => {
                    return Source::Node {
                        node_ref: NodeRef {
                            scope: port.scope.clone(),
                            name: from.name.clone(),
                        },
                        node: from,
                        socket: link.from_socket.clone(),
                    }
                }
            }
        }
        warn!(node = %port.node, "Signal path too long, using black");
        Source::Unlinked(port)
    }

    fn default_of(&self, port: &Port) -> [f32; 4] {
        self.graph
            .tree(&port.scope)
            .and_then(|t| t.node(&port.node))
            .and_then(|n| n.input(&port.socket))
            .and_then(|s| s.default.as_ref())
            .and_then(json_to_rgba)
            .unwrap_or(BLACK)
    }

    fn compile(&self, port: Port) -> Signal {
        let mut port = port;
        for _ in 0..MAX_HOPS {
            let (node_ref, node, socket) = match self.source(port) {
                Source::Unlinked(p) => return Signal::Constant(self.default_of(&p)),
                Source::Node {
                    node_ref,
                    node,
                    socket,
                } => (node_ref, node, socket),
            };

            match node.node_type {
                NodeType::ImageTexture => {
                    return match node.image.as_deref().filter(|name| self.scene.image(name).is_some()) {
                        Some(image) => Signal::Texture {
                            image: image.to_string(),
                            alpha: socket == "Alpha",
                        },
                        None => {
                            warn!(node = %node_ref, "Image texture without image");
                            Signal::Constant(MISSING_IMAGE)
                        }
                    };
                }
                NodeType::Value => {
                    let value = node.properties.get("value").and_then(json_to_rgba).unwrap_or(BLACK);
                    return Signal::Constant(value);
                }
                NodeType::Rgb => {
                    let color = node.properties.get("color").and_then(json_to_rgba).unwrap_or(BLACK);
                    return Signal::Constant(color);
                }
                _ => {
                    let tree = self.graph.tree(&node_ref.scope);
                    let first_linked = tree.and_then(|t| t.links_into_node(&node.name).next());
                    match first_linked {
                        Some(link) => port = node_ref.port(link.to_socket.clone()),
                        None => {
                            let value = node
                                .inputs
                                .iter()
                                .find_map(|s| s.default.as_ref().and_then(json_to_rgba))
                                .unwrap_or(BLACK);
                            return Signal::Constant(value);
                        }
                    }
                }
            }
        }
        Signal::Constant(BLACK)
    }
}

enum Sampler {
    Single(RgbaImage),
    Tiled(BTreeMap<u32, RgbaImage>),
}

fn texel(image: &RgbaImage, u: f32, v: f32) -> [f32; 4] {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return BLACK;
    }
    let x = ((u * width as f32).floor() as i64).clamp(0, i64::from(width) - 1) as u32;
    let y = (((1.0 - v) * height as f32).floor() as i64).clamp(0, i64::from(height) - 1) as u32;
    let p = image.get_pixel(x, y);
    [p[0], p[1], p[2], p[3]].map(|c| f32::from(c) / 255.0)
}

impl Sampler {
    fn sample(&self, [u, v]: [f32; 2]) -> [f32; 4] {
        match self {
            Sampler::Single(image) => texel(image, u.rem_euclid(1.0), v.rem_euclid(1.0)),
            Sampler::Tiled(tiles) => {
                let tile = udim_tile_of([u, v]);
                let [origin_u, origin_v] = udim_tile_origin(tile);
                match tiles.get(&tile) {
                    Some(image) => texel(image, u - origin_u, v - origin_v),
                    None => [0.0; 4],
                }
            }
        }
    }
}

fn open_rgba(path: &Path) -> BakeResult<RgbaImage> {
    image::open(path)
        .map(|i| i.to_rgba8())
        .map_err(|e| BakeError::image(path, e))
}

/// Decoded images used by the signals of one task
#[derive(Default)]
struct ImageBank {
    samplers: HashMap<String, Sampler>,
}

impl ImageBank {
    fn load<'s>(scene: &Scene, signals: impl IntoIterator<Item = &'s Signal>) -> BakeResult<Self> {
        let mut bank = ImageBank::default();
        for signal in signals {
            let Signal::Texture { image, .. } = signal else {
                continue;
            };
            if bank.samplers.contains_key(image) {
                continue;
            }
            let Some(data) = scene.image(image) else {
                continue;
            };
            let sampler = match &data.source {
                ImageSource::Single => Sampler::Single(open_rgba(&data.filepath)?),
                ImageSource::Tiled { tiles } => Sampler::Tiled(
                    tiles
                        .iter()
                        .map(|t| open_rgba(&t.filepath).map(|image| (t.number, image)))
                        .collect::<BakeResult<_>>()?,
                ),
            };
            bank.samplers.insert(image.clone(), sampler);
        }
        Ok(bank)
    }

    fn evaluate(&self, signal: &Signal, uv: [f32; 2]) -> [f32; 4] {
        match signal {
            Signal::Constant(value) => *value,
            Signal::Texture { image, alpha } => match self.samplers.get(image) {
                Some(sampler) => {
                    let rgba = sampler.sample(uv);
                    if *alpha {
                        [rgba[3], rgba[3], rgba[3], 1.0]
                    } else {
                        rgba
                    }
                }
                None => MISSING_IMAGE,
            },
        }
    }
}

/// How texel positions map to shading coordinates
#[derive(Debug, Clone, Default)]
struct Mapping {
    /// UDIM tiles laid out on the atlas, empty for regular bakes
    tiles: Vec<u32>,
    mirrored: bool,
}

impl Mapping {
    fn shading_uv(&self, x: u32, y: u32, width: u32, height: u32) -> [f32; 2] {
        let u = (x as f32 + 0.5) / width as f32;
        let v = 1.0 - (y as f32 + 0.5) / height as f32;
        let u = if self.mirrored { 1.0 - u } else { u };
        if self.tiles.is_empty() {
            [u, v]
        } else {
            atlas_to_udim([u, v], &self.tiles)
        }
    }
}

fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn render(bank: &ImageBank, signal: &Signal, mapping: &Mapping, task: &TaskMessage, is_value: bool) -> RgbaImage {
    let width = task.resolution_x.max(1);
    let height = task.resolution_y.max(1);
    RgbaImage::from_fn(width, height, |x, y| {
        let rgba = bank.evaluate(signal, mapping.shading_uv(x, y, width, height));
        if is_value {
            let v = to_u8(rgba[0]);
            Rgba([v, v, v, u8::MAX])
        } else {
            Rgba([to_u8(rgba[0]), to_u8(rgba[1]), to_u8(rgba[2]), u8::MAX])
        }
    })
}

fn save(image: &RgbaImage, path: &Path) -> BakeResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BakeError::io(parent, e))?;
    }
    image.save(path).map_err(|e| BakeError::image(path, e))
}

/// Signals of one task, compiled against the bundle scene
struct BakePlan {
    channel: Signal,
    /// Decal shader color and mix factor for decal tasks
    decal: Option<(Signal, Signal)>,
    bank: ImageBank,
}

fn plan(context: &BakeContext, task: &TaskMessage) -> BakeResult<BakePlan> {
    let scene = context.scene();
    let material = context.material()?;
    let classification = classify(material, scene, task.resolution_x)
        .map_err(|_| BakeError::NoShader(material.name.clone()))?;

    let compiler = SignalCompiler {
        graph: MaterialGraph::new(&material.tree, &scene.node_groups),
        scene,
    };

    let socket = task.target_socket_name.as_str();
    let on_output = channel_spec(socket).map(|s| s.on_output).unwrap_or(false);
    let owner = if on_output {
        Some(&classification.output)
    } else {
        classification.main_shader.as_ref()
    };
    let owner = owner.ok_or_else(|| BakeError::NoShader(material.name.clone()))?;
    let channel = compiler.compile(owner.port(socket));

    let decal = match &task.decal {
        Some(spec) => {
            let mix = NodeRef::from_path(&spec.mix_node);
            let shader = NodeRef::from_path(&spec.decal_shader);
            if compiler.graph.node(&mix).is_none() {
                return Err(BakeError::DecalNodeMissing(spec.mix_node.clone()));
            }
            if compiler.graph.node(&shader).is_none() {
                return Err(BakeError::DecalNodeMissing(spec.decal_shader.clone()));
            }
            Some((
                compiler.compile(shader.port(socket)),
                compiler.compile(mix.port(MIX_FACTOR_INPUT)),
            ))
        }
        None => None,
    };

    let signals = std::iter::once(&channel).chain(decal.iter().flat_map(|(c, m)| [c, m]));
    let bank = ImageBank::load(scene, signals)?;
    Ok(BakePlan {
        channel,
        decal,
        bank,
    })
}

/// Select or build the UV layer the task bakes onto
fn prepare_uv(context: &mut BakeContext, task: &TaskMessage) -> BakeResult<()> {
    let mesh = context.mesh_mut()?;
    if !task.udim_tiles.is_empty() {
        let atlas = task.uv_layer.as_deref().unwrap_or(DEFAULT_ATLAS_LAYER);
        return build_udim_atlas(mesh, atlas, &task.udim_tiles);
    }
    if let Some(layer) = &task.uv_layer {
        if !mesh.set_active_uv_layer(layer) {
            return Err(BakeError::UvLayerMissing {
                mesh: mesh.name.clone(),
                layer: layer.clone(),
            });
        }
    }
    Ok(())
}

/// Reference backend used by the `texbake --worker` process
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatBakeBackend;

impl BakeBackend for FlatBakeBackend {
    type Context = BakeContext;

    fn name(&self) -> &'static str {
        "flat"
    }

    fn load(&self, task: &TaskMessage) -> BakeResult<BakeContext> {
        BakeContext::load(task)
    }

    fn bake(&self, context: &mut BakeContext, task: &TaskMessage) -> BakeResult<BakeOutcome> {
        prepare_uv(context, task)?;
        let plan = plan(context, task)?;
        let mapping = Mapping {
            tiles: task.udim_tiles.clone(),
            mirrored: false,
        };

        let Some(spec) = &task.decal else {
            debug!(channel = %task.target_socket_name, bake_type = %task.bake_type, "Baking channel");
            save(
                &render(&plan.bank, &plan.channel, &mapping, task, task.is_value_bake),
                &task.output_path,
            )?;
            return Ok(BakeOutcome::single(&task.output_path));
        };
        let Some((decal_color, mask)) = &plan.decal else {
            return Err(BakeError::DecalNodeMissing(spec.decal_shader.clone()));
        };

        debug!(channel = %task.target_socket_name, "Baking decal passes");
        save(&render(&plan.bank, &plan.channel, &mapping, task, false), &spec.base_output)?;

        let snapshot = mirror_active_layer(context.mesh_mut()?)?;
        let mirrored = Mapping {
            mirrored: true,
            ..mapping.clone()
        };
        let decal_pass = save(&render(&plan.bank, decal_color, &mirrored, task, false), &spec.decal_output);
        snapshot.restore(context.mesh_mut()?)?;
        decal_pass?;

        save(&render(&plan.bank, mask, &mapping, task, true), &spec.mask_output)?;
        composite_decal_files(spec, &task.output_path)?;

        Ok(BakeOutcome {
            outputs: vec![
                spec.base_output.clone(),
                spec.decal_output.clone(),
                spec.mask_output.clone(),
                task.output_path.clone(),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link(from: &str, from_socket: &str, to: &str, to_socket: &str) -> JsonValue {
        json!({"from_node": from, "from_socket": from_socket, "to_node": to, "to_socket": to_socket})
    }

    fn compile(scene: &Scene, port: Port) -> Signal {
        let material = &scene.materials[0];
        SignalCompiler {
            graph: MaterialGraph::new(&material.tree, &scene.node_groups),
            scene,
        }
        .compile(port)
    }

    #[test]
    fn test_json_to_rgba() {
        assert_eq!(json_to_rgba(&json!(0.5)), Some([0.5, 0.5, 0.5, 1.0]));
        assert_eq!(json_to_rgba(&json!([0.1, 0.2, 0.3])), Some([0.1, 0.2, 0.3, 1.0]));
        assert_eq!(json_to_rgba(&json!([0.1, 0.2, 0.3, 0.4])), Some([0.1, 0.2, 0.3, 0.4]));
        assert_eq!(json_to_rgba(&json!("red")), None);
    }

    #[test]
    fn test_signal_through_group_and_procedural_node() {
        let scene: Scene = serde_json::from_value(json!({
            "materials": [{
                "name": "M",
                "uuid": "6f1c3f4e-8a57-4c4b-9d38-2c1e5e0f9a10",
                "tree": {
                    "nodes": [
                        {"name": "BSDF", "type": "principled_bsdf"},
                        {"name": "Wrap", "type": "group", "group": "G",
                         "inputs": [{"name": "Tint", "default": [0.2, 0.4, 0.6, 1.0]}]}
                    ],
                    "links": [link("Wrap", "Color", "BSDF", "Base Color")]
                }
            }],
            "node_groups": [{"name": "G", "tree": {
                "nodes": [
                    {"name": "In", "type": "group_input"},
                    {"name": "Hue", "type": "hue_saturation"},
                    {"name": "Out", "type": "group_output"}
                ],
                "links": [
                    link("In", "Tint", "Hue", "Color"),
                    link("Hue", "Color", "Out", "Color")
                ]
            }}]
        }))
        .unwrap();

        let signal = compile(&scene, NodeRef::root("BSDF").port("Base Color"));
        assert_eq!(signal, Signal::Constant([0.2, 0.4, 0.6, 1.0]));
    }

    #[test]
    fn test_image_alpha_socket_and_value_node() {
        let scene: Scene = serde_json::from_value(json!({
            "materials": [{
                "name": "M",
                "uuid": "6f1c3f4e-8a57-4c4b-9d38-2c1e5e0f9a10",
                "tree": {
                    "nodes": [
                        {"name": "BSDF", "type": "principled_bsdf"},
                        {"name": "Tex", "type": "image_texture", "image": "decal"},
                        {"name": "Rough", "type": "value", "properties": {"value": 0.25}}
                    ],
                    "links": [
                        link("Tex", "Alpha", "BSDF", "Alpha"),
                        link("Rough", "Value", "BSDF", "Roughness")
                    ]
                }
            }],
            "images": [{"name": "decal", "filepath": "/t/decal.png"}]
        }))
        .unwrap();

        assert_eq!(
            compile(&scene, NodeRef::root("BSDF").port("Alpha")),
            Signal::Texture {
                image: "decal".to_string(),
                alpha: true
            }
        );
        assert_eq!(
            compile(&scene, NodeRef::root("BSDF").port("Roughness")),
            Signal::Constant([0.25, 0.25, 0.25, 1.0])
        );
        assert_eq!(
            compile(&scene, NodeRef::root("BSDF").port("Metallic")),
            Signal::Constant(BLACK)
        );
    }

    #[test]
    fn test_mirrored_mapping() {
        let mapping = Mapping {
            tiles: Vec::new(),
            mirrored: true,
        };
        let [u, v] = mapping.shading_uv(0, 0, 4, 4);
        assert!((u - 0.875).abs() < 1e-6);
        assert!((v - 0.875).abs() < 1e-6);
    }

    #[test]
    fn test_tiled_sampler_picks_tile() {
        let tiles = BTreeMap::from([
            (1001, RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]))),
            (1002, RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255]))),
        ]);
        let sampler = Sampler::Tiled(tiles);
        assert_eq!(sampler.sample([0.5, 0.5]), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(sampler.sample([1.5, 0.5]), [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(sampler.sample([2.5, 0.5]), [0.0; 4]);
    }
}
