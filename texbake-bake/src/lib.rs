//! Worker side of texbake
//!
//! Everything that runs inside a worker process: the line-protocol loop,
//! the per-task bake context, the bake backend seam with its flat
//! reference implementation, UV helpers and decal compositing.

pub mod backend;
pub mod composite;
pub mod context;
pub mod error;
pub mod flat;
pub mod uv;
pub mod worker;

pub use backend::{BakeBackend, BakeOutcome};
pub use composite::{composite_decal, composite_decal_files};
pub use context::{locate_material, BakeContext};
pub use error::{BakeError, BakeResult};
pub use flat::FlatBakeBackend;
pub use uv::{
    atlas_to_udim, build_udim_atlas, mirror_active_layer, udim_tile_of, udim_tile_origin,
    udim_to_atlas, UvSnapshot,
};
pub use worker::{run_worker, Worker, WorkerStats};
