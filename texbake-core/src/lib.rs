//! Core domain models and types for texbake
//!
//! This crate contains the host-scene contract, the bake task model and the
//! error types shared by every other texbake crate. It has minimal
//! dependencies and defines the domain language of the pipeline.

pub mod bundle;
pub mod channel;
pub mod error;
pub mod hash;
pub mod scene;
pub mod task;

// Re-export commonly used types at the crate root
pub use bundle::{SceneBundle, BUNDLE_FORMAT_VERSION, UDIM_TOKEN};
pub use channel::{channel_spec, ChannelSpec, SpecialChannel, PBR_CHANNELS};
pub use error::{SceneError, SetupError};
pub use hash::ContentHash;
pub use scene::{
    ImageData, ImageSource, Material, Mesh, NodeGroup, NodeLink, NodeSocket, NodeTree, NodeType,
    ObjectKind, Polygon, Scene, SceneObject, ShaderNode, UdimTile, UvLayer,
};
pub use task::{
    BakeTask, BakeType, DecalSpec, MaterialIdentity, NativePass, Resolution, TaskId,
};
