//! Material analysis for texbake
//!
//! Everything here reads the shader graph of one material (plus the node
//! groups and images it reaches) and answers three questions: which bake
//! strategy applies, which channels are connected, and what content hash
//! identifies the bake result.

pub mod classify;
pub mod error;
pub mod graph;
pub mod hash;
pub mod resolution;

pub use classify::{
    classify, first_image, BakeStrategy, Classification, ConnectedChannel, DecalLayout,
    MIX_FACTOR_INPUT, SECOND_SHADER_INPUT, SHADER_INPUT,
};
pub use error::ClassifyError;
pub use graph::{MaterialGraph, NodeRef, Port, Walk};
pub use hash::{file_digest, MaterialHasher, MeshContext, HASH_RECIPE};
pub use resolution::{material_resolution, udim_resolution};
