//! Raster decoding and encoding between files/bytes and [`PixelBuffer`].

use crate::buffer::PixelBuffer;
use crate::error::{PreprocessError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use std::path::Path;

/// JPEG quality used when the caller does not pick one
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Extensions accepted when scanning a directory for input images
pub const SUPPORTED_INPUT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Output formats the encoder can write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Pick a format from a file extension (case-insensitive, without the dot)
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            other => Err(PreprocessError::Encode(format!(
                "unsupported output format: {:?}",
                other
            ))),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            PreprocessError::Encode(format!(
                "cannot infer output format for {}",
                path.display()
            ))
        })?;
        Self::from_extension(ext)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Decode PNG/JPEG/BMP/TIFF bytes, coercing to `desired_channels` (1, 3 or 4)
pub fn decode(bytes: &[u8], desired_channels: u8) -> Result<PixelBuffer> {
    if !matches!(desired_channels, 1 | 3 | 4) {
        return Err(PreprocessError::Config(format!(
            "desired channel count must be 1, 3 or 4, got {}",
            desired_channels
        )));
    }

    let img = image::load_from_memory(bytes)
        .map_err(|e| PreprocessError::Decode(format!("unrecognized image data: {}", e)))?;
    from_dynamic(img, desired_channels)
}

/// Convert a decoded `image` crate value into a buffer with the given channel count
pub fn from_dynamic(img: DynamicImage, desired_channels: u8) -> Result<PixelBuffer> {
    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(PreprocessError::Decode(format!(
            "image has zero dimensions ({}x{})",
            width, height
        )));
    }

    let data = match desired_channels {
        1 => img.into_luma8().into_raw(),
        3 => img.into_rgb8().into_raw(),
        4 => img.into_rgba8().into_raw(),
        other => {
            return Err(PreprocessError::Config(format!(
                "desired channel count must be 1, 3 or 4, got {}",
                other
            )))
        }
    };
    PixelBuffer::from_raw(width, height, desired_channels, data)
}

/// Encode a buffer. `quality` only applies to JPEG and defaults to 95.
pub fn encode(buffer: &PixelBuffer, format: ImageFormat, quality: Option<u8>) -> Result<Vec<u8>> {
    let (width, height) = buffer.dimensions();
    let mut out = Vec::new();

    match format {
        ImageFormat::Png => {
            let color = match buffer.channels() {
                1 => ExtendedColorType::L8,
                3 => ExtendedColorType::Rgb8,
                _ => ExtendedColorType::Rgba8,
            };
            PngEncoder::new(&mut out)
                .write_image(buffer.data(), width, height, color)
                .map_err(|e| PreprocessError::Encode(format!("PNG encoding failed: {}", e)))?;
        }
        ImageFormat::Jpeg => {
            let quality = quality.unwrap_or(DEFAULT_JPEG_QUALITY);
            if !(1..=100).contains(&quality) {
                return Err(PreprocessError::Config(format!(
                    "JPEG quality must be between 1 and 100, got {}",
                    quality
                )));
            }

            // JPEG has no alpha channel
            let (data, color) = match buffer.channels() {
                1 => (buffer.data().to_vec(), ExtendedColorType::L8),
                3 => (buffer.data().to_vec(), ExtendedColorType::Rgb8),
                _ => (strip_alpha(buffer), ExtendedColorType::Rgb8),
            };
            JpegEncoder::new_with_quality(&mut out, quality)
                .write_image(&data, width, height, color)
                .map_err(|e| PreprocessError::Encode(format!("JPEG encoding failed: {}", e)))?;
        }
    }

    Ok(out)
}

fn strip_alpha(buffer: &PixelBuffer) -> Vec<u8> {
    buffer
        .data()
        .chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect()
}

/// Read and decode an image file. Missing or unreadable files are decode errors.
pub fn load(path: impl AsRef<Path>, desired_channels: u8) -> Result<PixelBuffer> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        PreprocessError::Decode(format!("failed to read {}: {}", path.display(), e))
    })?;
    let buffer = decode(&bytes, desired_channels).map_err(|e| match e {
        PreprocessError::Decode(msg) => {
            PreprocessError::Decode(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })?;

    tracing::debug!(
        path = %path.display(),
        width = buffer.width(),
        height = buffer.height(),
        channels = buffer.channels(),
        "Image loaded"
    );
    Ok(buffer)
}

/// Encode and write a buffer, choosing the format from the file extension
pub fn save(path: impl AsRef<Path>, buffer: &PixelBuffer) -> Result<()> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path)?;
    let bytes = encode(buffer, format, None)?;
    std::fs::write(path, bytes).map_err(|e| {
        PreprocessError::Encode(format!("failed to write {}: {}", path.display(), e))
    })?;

    tracing::debug!(path = %path.display(), format = ?format, "Image saved");
    Ok(())
}

/// Whether a path has one of the raster extensions we know how to decode
pub fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            SUPPORTED_INPUT_EXTENSIONS.contains(&e.as_str())
        })
        .unwrap_or(false)
}
