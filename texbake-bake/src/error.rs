//! Bake error types

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use texbake_core::SceneError;
use texbake_ipc::IpcError;

/// Errors raised while processing a bake task
#[derive(Debug, Error)]
pub enum BakeError {
    #[error("Failed to load task bundle: {0}")]
    Bundle(#[from] SceneError),

    #[error("Object '{0}' not found in bundle")]
    ObjectNotFound(String),

    #[error("Material '{name}' ({uuid}) not found in bundle")]
    MaterialNotFound { name: String, uuid: Uuid },

    #[error("Material '{material}' is not assigned to object '{object}'")]
    MaterialNotOnObject { material: String, object: String },

    #[error("Object '{0}' has no mesh to bake onto")]
    NoMesh(String),

    #[error("UV layer '{layer}' not found on '{mesh}'")]
    UvLayerMissing { mesh: String, layer: String },

    #[error("Material '{0}' has no shader to bake from")]
    NoShader(String),

    #[error("Decal node '{0}' not found")]
    DecalNodeMissing(String),

    #[error("Image size mismatch: {0}")]
    SizeMismatch(String),

    #[error("Image error for {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),
}

impl BakeError {
    pub fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        BakeError::Image {
            path: path.into(),
            source,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BakeError::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors that end the worker loop rather than a single task
    pub fn is_fatal(&self) -> bool {
        matches!(self, BakeError::Ipc(_))
    }
}

pub type BakeResult<T> = Result<T, BakeError>;
