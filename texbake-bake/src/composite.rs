//! Decal compositing
//!
//! Combines the three decal passes into the final base color texture:
//! `rgb = base * (1 - a) + decal * a` with `a` taken from the mask's red
//! channel, and a fully opaque result.

use image::{Rgba, RgbaImage};
use std::path::Path;
use tracing::debug;

use texbake_core::DecalSpec;

use crate::error::{BakeError, BakeResult};

fn blend(base: u8, decal: u8, alpha: f32) -> u8 {
    let value = f32::from(base) * (1.0 - alpha) + f32::from(decal) * alpha;
    value.round().clamp(0.0, 255.0) as u8
}

/// Composite in memory. All three images must have the same size.
pub fn composite_decal(base: &RgbaImage, decal: &RgbaImage, mask: &RgbaImage) -> BakeResult<RgbaImage> {
    if base.dimensions() != decal.dimensions() || base.dimensions() != mask.dimensions() {
        return Err(BakeError::SizeMismatch(format!(
            "base {:?}, decal {:?}, mask {:?}",
            base.dimensions(),
            decal.dimensions(),
            mask.dimensions()
        )));
    }

    let (width, height) = base.dimensions();
    Ok(RgbaImage::from_fn(width, height, |x, y| {
        let b = base.get_pixel(x, y);
        let d = decal.get_pixel(x, y);
        let alpha = f32::from(mask.get_pixel(x, y)[0]) / 255.0;
        Rgba([
            blend(b[0], d[0], alpha),
            blend(b[1], d[1], alpha),
            blend(b[2], d[2], alpha),
            u8::MAX,
        ])
    }))
}

fn open_rgba(path: &Path) -> BakeResult<RgbaImage> {
    image::open(path)
        .map(|i| i.to_rgba8())
        .map_err(|e| BakeError::image(path, e))
}

/// Read the three pass files of `spec` and write the composite to `output`
pub fn composite_decal_files(spec: &DecalSpec, output: &Path) -> BakeResult<()> {
    let base = open_rgba(&spec.base_output)?;
    let decal = open_rgba(&spec.decal_output)?;
    let mask = open_rgba(&spec.mask_output)?;

    let composite = composite_decal(&base, &decal, &mask)?;
    composite
        .save(output)
        .map_err(|e| BakeError::image(output, e))?;

    debug!(output = %output.display(), "Wrote decal composite");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(r: u8, g: u8, b: u8, a: u8) -> RgbaImage {
        RgbaImage::from_pixel(2, 2, Rgba([r, g, b, a]))
    }

    #[test]
    fn test_composite_formula() {
        let base = solid(200, 100, 0, 128);
        let decal = solid(0, 50, 255, 255);
        let mut mask = solid(0, 0, 0, 255);
        mask.put_pixel(1, 0, Rgba([255, 255, 255, 255]));
        mask.put_pixel(0, 1, Rgba([64, 64, 64, 255]));

        let out = composite_decal(&base, &decal, &mask).unwrap();

        // no decal
        assert_eq!(out.get_pixel(0, 0), &Rgba([200, 100, 0, 255]));
        // full decal
        assert_eq!(out.get_pixel(1, 0), &Rgba([0, 50, 255, 255]));
        // partial: base * (1 - a) + decal * a
        let a = 64.0 / 255.0;
        let expected = |b: f32, d: f32| (b * (1.0 - a) + d * a).round() as u8;
        assert_eq!(
            out.get_pixel(0, 1),
            &Rgba([expected(200.0, 0.0), expected(100.0, 50.0), expected(0.0, 255.0), 255])
        );
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let base = solid(0, 0, 0, 255);
        let decal = RgbaImage::new(3, 3);
        assert!(matches!(
            composite_decal(&base, &decal, &base),
            Err(BakeError::SizeMismatch(_))
        ));
    }

    #[test]
    fn test_composite_files() {
        let dir = tempfile::tempdir().unwrap();
        let spec = DecalSpec {
            mix_node: "Mix".to_string(),
            decal_shader: "Ink".to_string(),
            base_output: dir.path().join("base.png"),
            decal_output: dir.path().join("decal.png"),
            mask_output: dir.path().join("mask.png"),
        };
        solid(10, 20, 30, 255).save(&spec.base_output).unwrap();
        solid(250, 240, 230, 255).save(&spec.decal_output).unwrap();
        solid(255, 255, 255, 255).save(&spec.mask_output).unwrap();

        let output = dir.path().join("final.png");
        composite_decal_files(&spec, &output).unwrap();
        let result = image::open(&output).unwrap().to_rgba8();
        assert_eq!(result.get_pixel(1, 1), &Rgba([250, 240, 230, 255]));
    }
}
