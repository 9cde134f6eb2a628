//! Source texture normalization for simple materials

use image::ImageFormat;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("Cannot copy texture {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot convert texture {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("png"))
        .unwrap_or(false)
}

/// Copy `source` to `<dest_dir>/<stem>.png`, re-encoding it as PNG when it
/// is in any other format
pub fn normalize_texture(source: &Path, dest_dir: &Path, stem: &str) -> Result<PathBuf, TextureError> {
    std::fs::create_dir_all(dest_dir).map_err(|e| TextureError::Io {
        path: dest_dir.to_path_buf(),
        source: e,
    })?;
    let target = dest_dir.join(format!("{}.png", stem));

    if is_png(source) {
        std::fs::copy(source, &target).map_err(|e| TextureError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
    } else {
        debug!(source = %source.display(), "Converting texture to PNG");
        let decoded = image::open(source).map_err(|e| TextureError::Decode {
            path: source.to_path_buf(),
            source: e,
        })?;
        decoded
            .save_with_format(&target, ImageFormat::Png)
            .map_err(|e| TextureError::Decode {
                path: target.clone(),
                source: e,
            })?;
    }

    Ok(target)
}
