use crate::buffer::PixelBuffer;
use crate::config::{AdaptiveMethod, PipelineConfig};
use crate::error::{PreprocessError, Result};

use super::convolve::{convolve_channel, gaussian_kernel, odd_size};
use super::grayscale::to_grayscale_luminance;

/// Binarize as configured. Returns the image and, for the global method, the
/// Otsu threshold that was applied.
pub fn apply(image: &PixelBuffer, config: &PipelineConfig) -> Result<(PixelBuffer, Option<u8>)> {
    if config.use_adaptive_threshold {
        let binary = match config.adaptive_method {
            AdaptiveMethod::Mean => {
                threshold_adaptive_mean(image, config.adaptive_block_size, config.adaptive_c)?
            }
            AdaptiveMethod::Gaussian => {
                threshold_adaptive_gaussian(image, config.adaptive_block_size, config.adaptive_c)?
            }
        };
        Ok((binary, None))
    } else {
        let gray = ensure_gray(image)?;
        let threshold = calculate_otsu_threshold(&gray)?;
        Ok((threshold_binary(&gray, threshold)?, Some(threshold)))
    }
}

fn ensure_gray(image: &PixelBuffer) -> Result<PixelBuffer> {
    if image.channels() == 1 {
        Ok(image.clone())
    } else {
        to_grayscale_luminance(image)
    }
}

/// Otsu's method over a 256-bin histogram.
///
/// Returns the first value of the bright class, so `pixel >= threshold`
/// separates the two populations. The lowest maximizing split wins. An image
/// with a single gray level returns 0.
pub fn calculate_otsu_threshold(image: &PixelBuffer) -> Result<u8> {
    let gray = ensure_gray(image)?;

    let mut histogram = [0u64; 256];
    for v in gray.data() {
        histogram[*v as usize] += 1;
    }

    let total = gray.pixel_count() as f64;
    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(value, &count)| value as f64 * count as f64)
        .sum();

    let mut sum_background = 0.0f64;
    let mut weight_background = 0.0f64;
    let mut max_variance = 0.0f64;
    let mut best_split: Option<usize> = None;

    for (t, &count) in histogram.iter().enumerate() {
        weight_background += count as f64;
        if weight_background == 0.0 {
            continue;
        }
        let weight_foreground = total - weight_background;
        if weight_foreground == 0.0 {
            break;
        }

        sum_background += t as f64 * count as f64;
        let mean_background = sum_background / weight_background;
        let mean_foreground = (sum_all - sum_background) / weight_foreground;

        let between = weight_background
            * weight_foreground
            * (mean_background - mean_foreground).powi(2);
        if between > max_variance {
            max_variance = between;
            best_split = Some(t);
        }
    }

    Ok(best_split.map(|t| (t + 1).min(255) as u8).unwrap_or(0))
}

/// Truncated mean of all gray values
pub fn calculate_mean_threshold(image: &PixelBuffer) -> Result<u8> {
    let gray = ensure_gray(image)?;
    let sum: u64 = gray.data().iter().map(|&v| v as u64).sum();
    Ok((sum / gray.pixel_count() as u64) as u8)
}

/// Global binarization at the Otsu threshold
pub fn threshold_otsu(image: &PixelBuffer) -> Result<PixelBuffer> {
    let gray = ensure_gray(image)?;
    let threshold = calculate_otsu_threshold(&gray)?;
    threshold_binary(&gray, threshold)
}

/// `pixel >= threshold` becomes white, everything else black
pub fn threshold_binary(image: &PixelBuffer, threshold: u8) -> Result<PixelBuffer> {
    let gray = ensure_gray(image)?;
    Ok(gray.map_channel(0, |v| if v >= threshold { 255 } else { 0 }))
}

pub fn threshold_binary_inverted(image: &PixelBuffer, threshold: u8) -> Result<PixelBuffer> {
    let gray = ensure_gray(image)?;
    Ok(gray.map_channel(0, |v| if v >= threshold { 0 } else { 255 }))
}

fn check_block(block_size: u32) -> Result<u32> {
    if block_size == 0 {
        return Err(PreprocessError::Config(
            "adaptive block size must be positive".to_string(),
        ));
    }
    Ok(odd_size(block_size))
}

/// White where a pixel reaches its local threshold, `local - c`
fn binarize_against(gray: &PixelBuffer, local: &[i32], c: i32) -> Result<PixelBuffer> {
    let width = gray.width() as usize;
    let (w, h) = gray.dimensions();
    PixelBuffer::from_fn(w, h, 1, |x, y, _| {
        let threshold = (local[y as usize * width + x as usize] - c).clamp(0, 255);
        if gray.get(x, y, 0) as i32 >= threshold {
            255
        } else {
            0
        }
    })
}

/// Local mean over an edge-clamped `block_size`×`block_size` window, minus `c`
pub fn threshold_adaptive_mean(image: &PixelBuffer, block_size: u32, c: i32) -> Result<PixelBuffer> {
    let size = check_block(block_size)?;
    let gray = ensure_gray(image)?;

    let ones = vec![1.0; size as usize];
    let area = (size * size) as f64;
    let means: Vec<i32> = convolve_channel(&gray, 0, &ones)
        .into_iter()
        .map(|sum| (sum / area).floor() as i32)
        .collect();

    binarize_against(&gray, &means, c)
}

/// Gaussian-weighted local mean (σ = block/6, truncated), minus `c`
pub fn threshold_adaptive_gaussian(
    image: &PixelBuffer,
    block_size: u32,
    c: i32,
) -> Result<PixelBuffer> {
    let size = check_block(block_size)?;
    let gray = ensure_gray(image)?;

    let kernel = gaussian_kernel(size as f64 / 6.0, size)?;
    let means: Vec<i32> = convolve_channel(&gray, 0, &kernel)
        .into_iter()
        .map(|weighted| weighted.floor() as i32)
        .collect();

    binarize_against(&gray, &means, c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_line() -> PixelBuffer {
        // Dark text on light background
        let mut img = PixelBuffer::filled(50, 20, 1, 240).unwrap();
        for x in 10..40 {
            img.set(x, 10, 0, 20);
        }
        img
    }

    fn assert_binary(img: &PixelBuffer) {
        for &v in img.data() {
            assert!(v == 0 || v == 255, "Expected binary pixel, got {}", v);
        }
    }

    #[test]
    fn test_otsu_splits_bimodal_histogram() {
        let img = PixelBuffer::from_fn(20, 20, 1, |x, _, _| if x < 10 { 50 } else { 200 }).unwrap();
        let threshold = calculate_otsu_threshold(&img).unwrap();
        assert!(threshold > 50 && threshold < 200, "got {}", threshold);

        let binary = threshold_otsu(&img).unwrap();
        assert_eq!(binary.get(0, 0, 0), 0);
        assert_eq!(binary.get(19, 0, 0), 255);
    }

    #[test]
    fn test_otsu_on_uniform_image() {
        let white = PixelBuffer::filled(50, 50, 1, 255).unwrap();
        let threshold = calculate_otsu_threshold(&white).unwrap();
        assert!(threshold == 0 || threshold == 255);
        assert!(threshold_otsu(&white).unwrap().data().iter().all(|&v| v == 255));
    }

    #[test]
    fn test_otsu_reduces_color_input() {
        let img = PixelBuffer::from_fn(10, 10, 3, |x, _, _| if x < 5 { 30 } else { 220 }).unwrap();
        let binary = threshold_otsu(&img).unwrap();
        assert_eq!(binary.channels(), 1);
        assert_eq!(binary.get(0, 0, 0), 0);
        assert_eq!(binary.get(9, 9, 0), 255);
    }

    #[test]
    fn test_threshold_binarizes_gradient() {
        let img = PixelBuffer::from_fn(50, 50, 1, |x, _, _| (x as u8 * 5).min(255)).unwrap();
        assert_binary(&threshold_otsu(&img).unwrap());
        assert_binary(&threshold_adaptive_mean(&img, 11, 2).unwrap());
        assert_binary(&threshold_adaptive_gaussian(&img, 11, 2).unwrap());
    }

    #[test]
    fn test_binary_and_inverted() {
        let img = PixelBuffer::from_raw(3, 1, 1, vec![10, 100, 200]).unwrap();
        assert_eq!(threshold_binary(&img, 100).unwrap().data(), &[0, 255, 255]);
        assert_eq!(
            threshold_binary_inverted(&img, 100).unwrap().data(),
            &[255, 0, 0]
        );
    }

    #[test]
    fn test_mean_threshold() {
        let img = PixelBuffer::from_raw(4, 1, 1, vec![0, 100, 200, 255]).unwrap();
        assert_eq!(calculate_mean_threshold(&img).unwrap(), 138);
    }

    #[test]
    fn test_adaptive_handles_text_pattern() {
        for result in [
            threshold_adaptive_mean(&text_line(), 11, 2).unwrap(),
            threshold_adaptive_gaussian(&text_line(), 11, 2).unwrap(),
        ] {
            // Text pixels should be black, background white
            assert_eq!(result.get(25, 10, 0), 0);
            assert_eq!(result.get(25, 5, 0), 255);
            assert_eq!(result.get(0, 0, 0), 255);
        }
    }

    #[test]
    fn test_adaptive_keeps_uniform_region_white() {
        let img = PixelBuffer::filled(20, 20, 1, 128).unwrap();
        for result in [
            threshold_adaptive_mean(&img, 11, 0).unwrap(),
            threshold_adaptive_gaussian(&img, 11, 0).unwrap(),
        ] {
            assert!(result.data().iter().all(|&v| v == 255));
        }
    }

    #[test]
    fn test_adaptive_rejects_zero_block() {
        assert!(matches!(
            threshold_adaptive_mean(&text_line(), 0, 2),
            Err(PreprocessError::Config(_))
        ));
    }

    #[test]
    fn test_apply_reports_otsu_threshold() {
        let img = PixelBuffer::from_fn(20, 20, 1, |x, _, _| if x < 10 { 50 } else { 200 }).unwrap();
        let config = PipelineConfig::default();
        let (binary, threshold) = apply(&img, &config).unwrap();
        assert!(threshold.is_some());
        assert_binary(&binary);

        let adaptive = PipelineConfig {
            use_adaptive_threshold: true,
            ..PipelineConfig::default()
        };
        let (_, threshold) = apply(&img, &adaptive).unwrap();
        assert_eq!(threshold, None);
    }
}
