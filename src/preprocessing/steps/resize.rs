use crate::buffer::PixelBuffer;
use crate::config::PipelineConfig;
use crate::error::{PreprocessError, Result};

/// Resize according to the pipeline config.
///
/// Both targets set: exact bilinear resize. One target set: scale to it,
/// preserving aspect ratio. Neither: scale by `scale_factor` unless it is 1.
pub fn apply(image: &PixelBuffer, config: &PipelineConfig) -> Result<PixelBuffer> {
    match (config.target_width, config.target_height) {
        (w, h) if w > 0 && h > 0 => resize_bilinear(image, w, h),
        (w, _) if w > 0 => scale_to_width(image, w),
        (_, h) if h > 0 => scale_to_height(image, h),
        _ if config.scale_factor != 1.0 => scale(image, config.scale_factor),
        _ => Ok(image.clone()),
    }
}

fn check_target(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(PreprocessError::Config(format!(
            "resize target must be positive, got {}x{}",
            width, height
        )));
    }
    Ok(())
}

/// Nearest-neighbor resize
pub fn resize_nearest(image: &PixelBuffer, width: u32, height: u32) -> Result<PixelBuffer> {
    check_target(width, height)?;

    let (src_w, src_h) = image.dimensions();
    let x_ratio = src_w as f64 / width as f64;
    let y_ratio = src_h as f64 / height as f64;

    PixelBuffer::from_fn(width, height, image.channels(), |x, y, c| {
        let sx = ((x as f64 * x_ratio) as u32).min(src_w - 1);
        let sy = ((y as f64 * y_ratio) as u32).min(src_h - 1);
        image.get(sx, sy, c)
    })
}

/// Bilinear resize.
///
/// Source coordinates are `dst * (src - 1) / dst_size`, so the last source
/// row/column is approached but never sampled past.
pub fn resize_bilinear(image: &PixelBuffer, width: u32, height: u32) -> Result<PixelBuffer> {
    check_target(width, height)?;

    let (src_w, src_h) = image.dimensions();
    let x_ratio = (src_w - 1) as f64 / width as f64;
    let y_ratio = (src_h - 1) as f64 / height as f64;

    PixelBuffer::from_fn(width, height, image.channels(), |x, y, c| {
        let sx = x as f64 * x_ratio;
        let sy = y as f64 * y_ratio;

        let x1 = sx.floor() as u32;
        let y1 = sy.floor() as u32;
        let x2 = (x1 + 1).min(src_w - 1);
        let y2 = (y1 + 1).min(src_h - 1);
        let dx = sx - x1 as f64;
        let dy = sy - y1 as f64;

        let p11 = image.get(x1, y1, c) as f64;
        let p21 = image.get(x2, y1, c) as f64;
        let p12 = image.get(x1, y2, c) as f64;
        let p22 = image.get(x2, y2, c) as f64;

        let value = p11 * (1.0 - dx) * (1.0 - dy)
            + p21 * dx * (1.0 - dy)
            + p12 * (1.0 - dx) * dy
            + p22 * dx * dy;
        value.round().clamp(0.0, 255.0) as u8
    })
}

fn scaled_dim(dim: u32, factor: f64) -> Result<u32> {
    let scaled = (dim as f64 * factor).floor();
    if !scaled.is_finite() || scaled < 1.0 || scaled > u32::MAX as f64 {
        return Err(PreprocessError::Config(format!(
            "scaling dimension {} by {} gives an invalid size",
            dim, factor
        )));
    }
    Ok(scaled as u32)
}

/// Scale both dimensions by `factor` (bilinear)
pub fn scale(image: &PixelBuffer, factor: f32) -> Result<PixelBuffer> {
    let factor = factor as f64;
    let width = scaled_dim(image.width(), factor)?;
    let height = scaled_dim(image.height(), factor)?;
    resize_bilinear(image, width, height)
}

/// Scale to `width`, preserving aspect ratio
pub fn scale_to_width(image: &PixelBuffer, width: u32) -> Result<PixelBuffer> {
    check_target(width, image.height())?;
    let factor = width as f64 / image.width() as f64;
    let height = scaled_dim(image.height(), factor)?;
    resize_bilinear(image, width, height)
}

/// Scale to `height`, preserving aspect ratio
pub fn scale_to_height(image: &PixelBuffer, height: u32) -> Result<PixelBuffer> {
    check_target(image.width(), height)?;
    let factor = height as f64 / image.height() as f64;
    let width = scaled_dim(image.width(), factor)?;
    resize_bilinear(image, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, 1, |x, y, _| (x * 10 + y) as u8).unwrap()
    }

    #[test]
    fn test_nearest_picks_floor_source() {
        let img = ramp(4, 1);
        let result = resize_nearest(&img, 8, 1).unwrap();
        assert_eq!(result.data(), &[0, 0, 10, 10, 20, 20, 30, 30]);

        let down = resize_nearest(&img, 2, 1).unwrap();
        assert_eq!(down.data(), &[0, 20]);
    }

    #[test]
    fn test_bilinear_interpolates() {
        let img = PixelBuffer::from_raw(2, 1, 1, vec![0, 100]).unwrap();
        // x_ratio = 1/4: samples at 0, 0.25, 0.5, 0.75
        let result = resize_bilinear(&img, 4, 1).unwrap();
        assert_eq!(result.data(), &[0, 25, 50, 75]);
    }

    #[test]
    fn test_bilinear_constant_image_stays_constant() {
        let img = PixelBuffer::filled(7, 5, 3, 42).unwrap();
        let result = resize_bilinear(&img, 13, 11).unwrap();
        assert_eq!(result.dimensions(), (13, 11));
        assert_eq!(result.channels(), 3);
        assert!(result.data().iter().all(|&v| v == 42));
    }

    #[test]
    fn test_zero_target_is_config_error() {
        let img = ramp(10, 10);
        assert!(matches!(
            resize_bilinear(&img, 0, 10),
            Err(PreprocessError::Config(_))
        ));
        assert!(matches!(
            resize_nearest(&img, 10, 0),
            Err(PreprocessError::Config(_))
        ));
    }

    #[test]
    fn test_scale_floors_dimensions() {
        let img = ramp(10, 7);
        let result = scale(&img, 0.5).unwrap();
        assert_eq!(result.dimensions(), (5, 3));

        assert!(matches!(scale(&img, 0.05), Err(PreprocessError::Config(_))));
        assert!(matches!(scale(&img, -1.0), Err(PreprocessError::Config(_))));
    }

    #[test]
    fn test_scale_to_width_preserves_aspect() {
        let img = ramp(200, 100);
        assert_eq!(scale_to_width(&img, 50).unwrap().dimensions(), (50, 25));
        assert_eq!(scale_to_height(&img, 50).unwrap().dimensions(), (100, 50));
    }

    #[test]
    fn test_apply_uses_config_precedence() {
        let img = ramp(40, 20);
        let mut config = PipelineConfig {
            target_width: 20,
            target_height: 20,
            scale_factor: 3.0,
            ..PipelineConfig::default()
        };
        assert_eq!(apply(&img, &config).unwrap().dimensions(), (20, 20));

        config.target_height = 0;
        assert_eq!(apply(&img, &config).unwrap().dimensions(), (20, 10));

        config.target_width = 0;
        assert_eq!(apply(&img, &config).unwrap().dimensions(), (120, 60));

        config.scale_factor = 1.0;
        assert_eq!(apply(&img, &config).unwrap(), img);
    }
}
