//! Material analysis errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Without an output node nothing reaches the surface; such materials
    /// are excluded from the export
    #[error("Material '{0}' has no material output node")]
    NoOutputNode(String),

    #[error("Material '{0}' not found in scene")]
    UnknownMaterial(String),
}

impl ClassifyError {
    /// Whether the material can simply be skipped with a warning
    pub fn is_exclusion(&self) -> bool {
        matches!(self, ClassifyError::NoOutputNode(_))
    }
}
