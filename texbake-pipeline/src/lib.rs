//! Export preparation for texbake
//!
//! Runs before any worker starts: validate the export set, turn materials
//! into bake tasks (or cached and copied textures), and persist one
//! isolated bundle per task. Every failure here is a setup failure.

pub mod generator;
pub mod isolator;
pub mod preflight;
pub mod texture;

pub use generator::{
    GeneratedTasks, GeneratorOptions, MaterialAssignment, SkippedMaterial, SpecialBinding,
    TaskGenerator,
};
pub use isolator::{IsolatedTasks, IsolationError, TaskIsolator};
pub use preflight::{preflight, resolve_save_path, select_objects};
pub use texture::{normalize_texture, TextureError};
