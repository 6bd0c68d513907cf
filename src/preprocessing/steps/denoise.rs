use crate::buffer::PixelBuffer;
use crate::config::PipelineConfig;
use crate::error::{PreprocessError, Result};
use image::{ImageBuffer, Luma, Pixel, Rgb, Rgba};

use super::convolve::{convolve, gaussian_kernel, odd_size};

/// Apply the configured median filter to reduce noise
/// Median filter preserves edges better than Gaussian blur
pub fn apply(image: &PixelBuffer, config: &PipelineConfig) -> Result<PixelBuffer> {
    median_filter(image, config.median_filter_size)
}

/// Per-channel median over a `kernel_size`×`kernel_size` edge-clamped window.
/// Even sizes are bumped to the next odd size.
pub fn median_filter(image: &PixelBuffer, kernel_size: u32) -> Result<PixelBuffer> {
    let radius = odd_size(kernel_size) / 2;
    if radius == 0 {
        return Ok(image.clone());
    }

    let (width, height) = image.dimensions();
    let raw = image.data().to_vec();
    let filtered = match image.channels() {
        1 => median_of::<Luma<u8>>(width, height, raw, radius)?,
        3 => median_of::<Rgb<u8>>(width, height, raw, radius)?,
        _ => median_of::<Rgba<u8>>(width, height, raw, radius)?,
    };
    PixelBuffer::from_raw(width, height, image.channels(), filtered)
}

fn median_of<P>(width: u32, height: u32, raw: Vec<u8>, radius: u32) -> Result<Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let img: ImageBuffer<P, Vec<u8>> = ImageBuffer::from_raw(width, height, raw).ok_or_else(|| {
        PreprocessError::Config(format!("buffer does not fit a {}x{} image", width, height))
    })?;
    Ok(imageproc::filter::median_filter(&img, radius, radius).into_raw())
}

pub fn median_filter_3x3(image: &PixelBuffer) -> Result<PixelBuffer> {
    median_filter(image, 3)
}

pub fn median_filter_5x5(image: &PixelBuffer) -> Result<PixelBuffer> {
    median_filter(image, 5)
}

/// Gaussian blur with edge clamping.
///
/// A `kernel_size` of 0 sizes the kernel to `ceil(6σ)`, rounded up to odd.
pub fn gaussian_blur(image: &PixelBuffer, sigma: f32, kernel_size: u32) -> Result<PixelBuffer> {
    let size = if kernel_size == 0 {
        odd_size((6.0 * sigma.max(0.0)).ceil() as u32)
    } else {
        odd_size(kernel_size)
    };
    let kernel = gaussian_kernel(sigma as f64, size)?;
    convolve(image, &kernel, 1.0)
}

pub fn gaussian_blur_3x3(image: &PixelBuffer) -> Result<PixelBuffer> {
    gaussian_blur(image, 0.8, 3)
}

pub fn gaussian_blur_5x5(image: &PixelBuffer) -> Result<PixelBuffer> {
    gaussian_blur(image, 1.4, 5)
}

pub fn gaussian_blur_strong(image: &PixelBuffer) -> Result<PixelBuffer> {
    gaussian_blur(image, 3.0, 15)
}

/// Uniform-weight blur, same boundary policy as the other filters
pub fn box_blur(image: &PixelBuffer, kernel_size: u32) -> Result<PixelBuffer> {
    let size = odd_size(kernel_size);
    let ones = vec![1.0; size as usize];
    convolve(image, &ones, 1.0 / (size as f64 * size as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denoise_reduces_salt_pepper_noise() {
        // Create image with salt-and-pepper noise pattern
        let mut img = PixelBuffer::filled(10, 10, 1, 128).unwrap();
        img.set(5, 5, 0, 0); // "pepper" noise
        img.set(6, 5, 0, 255); // "salt" noise

        let result = median_filter_3x3(&img).unwrap();

        // Isolated noise pixels are replaced by the surrounding value
        assert!(result.data().iter().all(|&v| v == 128));
        assert!(calculate_variance(&result) <= calculate_variance(&img));
    }

    #[test]
    fn test_median_filters_each_channel() {
        for channels in [3u8, 4] {
            let base = [10u8, 20, 30, 255];
            let mut img =
                PixelBuffer::from_fn(7, 5, channels, |_, _, c| base[c]).unwrap();
            img.pixel_mut(3, 2).copy_from_slice(&[255, 0, 255, 0][..channels as usize]);

            let result = median_filter_5x5(&img).unwrap();
            assert_eq!(result.channels(), channels);
            assert_eq!(result.pixel(3, 2), &base[..channels as usize]);
        }
    }

    #[test]
    fn test_median_clamps_at_edges() {
        // Corner pixel's clamped 3x3 window: four copies of 200, then 10s
        let img = PixelBuffer::from_raw(3, 3, 1, vec![200, 10, 10, 10, 10, 10, 10, 10, 10])
            .unwrap();
        let result = median_filter(&img, 3).unwrap();
        assert_eq!(result.get(0, 0, 0), 10);

        let img = PixelBuffer::from_raw(3, 3, 1, vec![200, 200, 10, 200, 10, 10, 10, 10, 10])
            .unwrap();
        let result = median_filter(&img, 3).unwrap();
        // window at (0,0): 200 x 8 of 9 samples, 10 at the (1,1) position
        assert_eq!(result.get(0, 0, 0), 200);
    }

    #[test]
    fn test_median_even_size_is_bumped() {
        let img = PixelBuffer::from_fn(9, 9, 3, |x, y, c| ((x * 31 + y * 17) as u8).wrapping_add(c as u8))
            .unwrap();
        assert_eq!(median_filter(&img, 4).unwrap(), median_filter(&img, 5).unwrap());
        assert_eq!(median_filter(&img, 0).unwrap(), img);
    }

    #[test]
    fn test_gaussian_preserves_constant_image() {
        let img = PixelBuffer::filled(12, 8, 3, 77).unwrap();
        for result in [
            gaussian_blur_3x3(&img).unwrap(),
            gaussian_blur_5x5(&img).unwrap(),
            gaussian_blur(&img, 1.2, 0).unwrap(),
        ] {
            assert!(result.data().iter().all(|&v| v == 77));
        }
    }

    #[test]
    fn test_gaussian_smooths_impulse() {
        let mut img = PixelBuffer::filled(9, 9, 1, 0).unwrap();
        img.set(4, 4, 0, 255);
        let result = gaussian_blur(&img, 1.0, 0).unwrap();

        let center = result.get(4, 4, 0);
        assert!(center < 255 && center > 0);
        assert!(result.get(3, 4, 0) > 0);
        assert_eq!(result.get(3, 4, 0), result.get(5, 4, 0));
        assert_eq!(result.get(4, 3, 0), result.get(4, 5, 0));
    }

    #[test]
    fn test_gaussian_rejects_zero_sigma() {
        let img = PixelBuffer::filled(4, 4, 1, 0).unwrap();
        assert!(matches!(
            gaussian_blur(&img, 0.0, 0),
            Err(PreprocessError::Config(_))
        ));
    }

    #[test]
    fn test_box_blur_averages_window() {
        let mut img = PixelBuffer::filled(5, 5, 1, 0).unwrap();
        img.set(2, 2, 0, 90);
        let result = box_blur(&img, 3).unwrap();
        assert_eq!(result.get(2, 2, 0), 10);
        assert_eq!(result.get(1, 1, 0), 10);
        assert_eq!(result.get(0, 0, 0), 0);
    }

    fn calculate_variance(img: &PixelBuffer) -> f64 {
        let pixels: Vec<f64> = img.data().iter().map(|&p| p as f64).collect();
        let mean = pixels.iter().sum::<f64>() / pixels.len() as f64;
        pixels.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / pixels.len() as f64
    }
}
