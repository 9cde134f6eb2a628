//! Core error types for texbake

use thiserror::Error;

/// Errors raised while reading or querying a host scene description
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Mesh not found: {0}")]
    MeshNotFound(String),

    #[error("Material not found: {0}")]
    MaterialNotFound(String),

    #[error("Node group not found: {0}")]
    NodeGroupNotFound(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Failed to parse scene: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SceneError {
    fn from(err: serde_json::Error) -> Self {
        SceneError::Parse(err.to_string())
    }
}

/// Setup failures. Fatal to the whole export: no worker is ever launched.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("No save path configured for the export")]
    MissingSavePath,

    #[error("No exportable objects in the export set")]
    NoExportableObjects,

    #[error(
        "Object '{object}' uses material '{material}' but has no UV map; \
         every mesh using a baked material must have a UV map"
    )]
    MissingUvMap { object: String, material: String },

    #[error("Another export is already running")]
    AlreadyRunning,

    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_uv_message_names_object_and_material() {
        let err = SetupError::MissingUvMap {
            object: "Crate".to_string(),
            material: "Wood".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("'Crate'"));
        assert!(message.contains("'Wood'"));
    }

    #[test]
    fn test_json_error_conversion() {
        let err: SceneError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, SceneError::Parse(_)));
    }
}
