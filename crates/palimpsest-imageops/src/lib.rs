//! Palimpsest ImageOps - pure image-space helpers
//!
//! Deterministic pixel operations the pipeline composes around the opaque
//! transform: decode/encode, bounded downscaling, normalized-bbox cropping,
//! structural similarity, and patch compositing. No suspension points, no
//! shared state; every function takes inputs and returns a fresh value.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use palimpsest_atlas::BBox;
use std::io::Cursor;

/// Raster side length both inputs are normalized to before comparison.
const SIMILARITY_RASTER: u32 = 64;

/// Image helper errors
#[derive(Debug, thiserror::Error)]
pub enum ImageOpsError {
    /// Bytes did not decode as an image
    #[error("image decode failed: {0}")]
    Decode(#[source] image::ImageError),

    /// Encoding to the output format failed
    #[error("image encode failed: {0}")]
    Encode(#[source] image::ImageError),
}

/// Decode encoded image bytes
///
/// # Errors
/// [`ImageOpsError::Decode`] when the bytes are not a supported image.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ImageOpsError> {
    image::load_from_memory(bytes).map_err(ImageOpsError::Decode)
}

/// Encode an image as PNG
///
/// # Errors
/// [`ImageOpsError::Encode`] on encoder failure.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ImageOpsError> {
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(ImageOpsError::Encode)?;
    Ok(out.into_inner())
}

/// Downscale so the long edge is at most `max_dim`, preserving aspect ratio
///
/// Images already within bounds are returned unchanged. Deterministic:
/// the same input always yields the same raster.
#[must_use]
pub fn downscale(image: &DynamicImage, max_dim: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    if w.max(h) <= max_dim || max_dim == 0 {
        return image.clone();
    }
    image.resize(max_dim, max_dim, FilterType::Lanczos3)
}

/// Crop by normalized bounding box
///
/// The 0-1000 coordinate space maps to pixels through the image's actual
/// dimensions; a valid bbox always yields a non-empty crop.
#[must_use]
pub fn crop(image: &DynamicImage, bbox: &BBox) -> DynamicImage {
    let (w, h) = image.dimensions();
    let rect = bbox.to_pixel_rect(w, h);
    image.crop_imm(rect.x, rect.y, rect.width, rect.height)
}

/// Structural similarity between two images, in `[0, 1]`
///
/// Both inputs are grayscaled and resampled to a common raster, then scored
/// with the global SSIM statistic (luminance, contrast, structure). Identical
/// content scores ~1.0 regardless of input resolution.
#[must_use]
pub fn similarity(a: &DynamicImage, b: &DynamicImage) -> f64 {
    let la = image::imageops::resize(
        &a.to_luma8(),
        SIMILARITY_RASTER,
        SIMILARITY_RASTER,
        FilterType::Triangle,
    );
    let lb = image::imageops::resize(
        &b.to_luma8(),
        SIMILARITY_RASTER,
        SIMILARITY_RASTER,
        FilterType::Triangle,
    );

    let n = f64::from(SIMILARITY_RASTER * SIMILARITY_RASTER);
    let pa: Vec<f64> = la.pixels().map(|p| f64::from(p.0[0])).collect();
    let pb: Vec<f64> = lb.pixels().map(|p| f64::from(p.0[0])).collect();

    let mean_a = pa.iter().sum::<f64>() / n;
    let mean_b = pb.iter().sum::<f64>() / n;

    let mut var_a = 0.0;
    let mut var_b = 0.0;
    let mut cov = 0.0;
    for (&x, &y) in pa.iter().zip(&pb) {
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
        cov += (x - mean_a) * (y - mean_b);
    }
    var_a /= n;
    var_b /= n;
    cov /= n;

    // Standard SSIM stabilization constants for 8-bit dynamic range.
    let c1 = (0.01_f64 * 255.0).powi(2);
    let c2 = (0.03_f64 * 255.0).powi(2);

    let ssim = ((2.0 * mean_a * mean_b + c1) * (2.0 * cov + c2))
        / ((mean_a.powi(2) + mean_b.powi(2) + c1) * (var_a + var_b + c2));

    ssim.clamp(0.0, 1.0)
}

/// Composite a corrected patch back into the base image at `bbox`
///
/// The patch is resampled to the bbox's pixel rectangle, so refiners that
/// return a slightly different raster still land exactly in place.
#[must_use]
pub fn composite(base: &DynamicImage, patch: &DynamicImage, bbox: &BBox) -> DynamicImage {
    let (w, h) = base.dimensions();
    let rect = bbox.to_pixel_rect(w, h);

    let fitted = patch.resize_exact(rect.width, rect.height, FilterType::Lanczos3);
    let mut out = base.to_rgba8();
    image::imageops::replace(&mut out, &fitted.to_rgba8(), i64::from(rect.x), i64::from(rect.y));
    DynamicImage::ImageRgba8(out)
}
