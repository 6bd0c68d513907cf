//! Edge-clamped separable convolution shared by the blur and adaptive
//! threshold steps.

use crate::buffer::PixelBuffer;
use crate::error::{PreprocessError, Result};

/// Round an even window size up to the next odd one; 0 becomes 1
pub fn odd_size(size: u32) -> u32 {
    if size % 2 == 0 {
        size + 1
    } else {
        size
    }
}

/// Normalized 1-D Gaussian weights of length `size` (must be odd).
///
/// The outer product of this kernel with itself equals the normalized 2-D
/// kernel `exp(-(x² + y²) / 2σ²)`.
pub fn gaussian_kernel(sigma: f64, size: u32) -> Result<Vec<f64>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(PreprocessError::Config(format!(
            "gaussian sigma must be positive, got {}",
            sigma
        )));
    }
    let half = (size / 2) as i64;
    let weights: Vec<f64> = (-half..=half)
        .map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    Ok(weights.into_iter().map(|w| w / sum).collect())
}

/// Convolve one channel with `kernel` along rows and then columns.
///
/// Samples outside the image repeat the nearest edge pixel. Returns one
/// unrounded value per pixel in row-major order.
pub fn convolve_channel(image: &PixelBuffer, channel: usize, kernel: &[f64]) -> Vec<f64> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let half = (kernel.len() / 2) as i64;

    let mut horizontal = vec![0.0f64; w * h];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = x as i64 + k as i64 - half;
                acc += weight * image.get_clamped(sx, y as i64, channel) as f64;
            }
            horizontal[y as usize * w + x as usize] = acc;
        }
    }

    let mut out = vec![0.0f64; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = (y as i64 + k as i64 - half).clamp(0, h as i64 - 1) as usize;
                acc += weight * horizontal[sy * w + x];
            }
            out[y * w + x] = acc;
        }
    }
    out
}

/// Convolve every channel and round the results back to bytes
pub fn convolve(image: &PixelBuffer, kernel: &[f64], scale: f64) -> Result<PixelBuffer> {
    let channels = image.channels() as usize;
    let planes: Vec<Vec<f64>> = (0..channels)
        .map(|c| convolve_channel(image, c, kernel))
        .collect();

    let width = image.width() as usize;
    let (w, h) = image.dimensions();
    PixelBuffer::from_fn(w, h, image.channels(), |x, y, c| {
        let value = planes[c][y as usize * width + x as usize] * scale;
        value.round().clamp(0.0, 255.0) as u8
    })
}
