//! Still-image thumbnail pipeline using the `image` crate
//!
//! Sources are decoded in-process, scaled down to fit a square bound while
//! preserving aspect ratio, and re-encoded as JPEG. Formats the codec set
//! cannot decode are passed through as a verbatim copy.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageError, ImageReader};
use std::fs;
use std::io::Write;
use std::path::Path;

/// What [`generate_image_thumbnail`] wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageThumbnail {
    /// Scaled and re-encoded JPEG
    Encoded,
    /// No decoder for the format; original bytes copied as-is
    CopiedOriginal,
}

/// Write a thumbnail of `source` to `dest`, bounded to `max_dim` pixels on
/// its long edge and encoded at `quality`.
///
/// Errors mean the source is unreadable or corrupt.
pub fn generate_image_thumbnail(
    source: &Path,
    dest: &Path,
    max_dim: u32,
    quality: u8,
) -> Result<ImageThumbnail> {
    let decoded = ImageReader::open(source)
        .with_context(|| format!("Failed to open {}", source.display()))?
        .with_guessed_format()
        .with_context(|| format!("Failed to sniff format of {}", source.display()))?
        .decode();

    write_thumbnail(source, dest, decoded, max_dim, quality)
}

/// Encode a decoded source, or fall back to copying it when no decoder
/// exists for its format.
fn write_thumbnail(
    source: &Path,
    dest: &Path,
    decoded: Result<DynamicImage, ImageError>,
    max_dim: u32,
    quality: u8,
) -> Result<ImageThumbnail> {
    match decoded {
        Ok(img) => {
            let data = encode_jpeg(&resize_image(img, max_dim), quality)?;
            write_atomically(dest, &data)?;
            Ok(ImageThumbnail::Encoded)
        }
        Err(ImageError::Unsupported(_)) => {
            let data = fs::read(source)
                .with_context(|| format!("Failed to read {}", source.display()))?;
            write_atomically(dest, &data)?;
            Ok(ImageThumbnail::CopiedOriginal)
        }
        Err(e) => {
            Err(e).with_context(|| format!("Failed to decode image {}", source.display()))
        }
    }
}

/// Resize image to fit within `max_dim` on both axes while preserving aspect ratio
fn resize_image(img: DynamicImage, max_dim: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let max_existing = width.max(height);

    // Never upscale
    if max_existing <= max_dim {
        return img;
    }

    let ratio = max_dim as f64 / max_existing as f64;
    let new_width = ((width as f64 * ratio).round() as u32).max(1);
    let new_height = ((height as f64 * ratio).round() as u32).max(1);

    img.resize_exact(new_width, new_height, image::imageops::FilterType::Lanczos3)
}

/// Encode image as baseline RGB JPEG at the given quality
fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    img.to_rgb8()
        .write_with_encoder(encoder)
        .context("Failed to encode JPEG")?;
    Ok(buffer)
}

/// Readers only ever see a missing file or a complete one
fn write_atomically(dest: &Path, data: &[u8]) -> Result<()> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(data)?;
    tmp.persist(dest)
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    Ok(())
}
