use crate::buffer::PixelBuffer;
use crate::config::PipelineConfig;
use crate::error::{PreprocessError, Result};

/// Contrast enhancement as configured: global histogram equalization or
/// percentile stretching
pub fn apply(image: &PixelBuffer, config: &PipelineConfig) -> Result<PixelBuffer> {
    if config.use_histogram_equalization {
        Ok(histogram_equalization(image))
    } else {
        normalize_percentile(image, config.percentile_low, config.percentile_high)
    }
}

/// Default contrast normalization (min-max stretch)
pub fn normalize_contrast(image: &PixelBuffer) -> PixelBuffer {
    normalize_min_max(image)
}

/// Stretch each channel so its darkest value maps to 0 and brightest to 255.
/// Constant channels pass through unchanged.
pub fn normalize_min_max(image: &PixelBuffer) -> PixelBuffer {
    let mut out = image.clone();
    for c in 0..image.channels() as usize {
        let (min_val, max_val) = find_min_max(image, c);
        out = stretch_channel(&out, c, min_val, max_val);
    }
    out
}

/// Stretch each channel between two percentile ranks, clamping values outside.
///
/// Ranks are `floor(n * p / 100)` into the sorted channel values, clamped to
/// the valid index range.
pub fn normalize_percentile(image: &PixelBuffer, low: f32, high: f32) -> Result<PixelBuffer> {
    if !low.is_finite() || !high.is_finite() {
        return Err(PreprocessError::Config(format!(
            "percentiles must be finite, got [{}, {}]",
            low, high
        )));
    }

    let n = image.pixel_count();
    let mut out = image.clone();
    for c in 0..image.channels() as usize {
        let histogram = channel_histogram(image, c);
        let low_val = value_at_rank(&histogram, percentile_rank(n, low));
        let high_val = value_at_rank(&histogram, percentile_rank(n, high));
        out = stretch_channel(&out, c, low_val, high_val);
    }
    Ok(out)
}

/// Per-channel global histogram equalization
pub fn histogram_equalization(image: &PixelBuffer) -> PixelBuffer {
    let mut out = image.clone();
    for c in 0..image.channels() as usize {
        let lut = equalization_lut(&channel_histogram(image, c), image.pixel_count());
        out = out.map_channel(c, |v| lut[v as usize]);
    }
    out
}

/// Equalize each `tile_size`×`tile_size` block with its own histogram.
///
/// Tiles do not overlap and are not blended, so block boundaries can show.
pub fn adaptive_histogram_equalization(image: &PixelBuffer, tile_size: u32) -> Result<PixelBuffer> {
    if tile_size == 0 {
        return Err(PreprocessError::Config(
            "tile size must be positive".to_string(),
        ));
    }

    let (width, height) = image.dimensions();
    let mut out = image.clone();

    for c in 0..image.channels() as usize {
        for tile_y in (0..height).step_by(tile_size as usize) {
            for tile_x in (0..width).step_by(tile_size as usize) {
                let end_x = (tile_x + tile_size).min(width);
                let end_y = (tile_y + tile_size).min(height);

                let mut histogram = [0u64; 256];
                for y in tile_y..end_y {
                    for x in tile_x..end_x {
                        histogram[image.get(x, y, c) as usize] += 1;
                    }
                }
                let tile_pixels = ((end_x - tile_x) * (end_y - tile_y)) as usize;
                let lut = equalization_lut(&histogram, tile_pixels);

                for y in tile_y..end_y {
                    for x in tile_x..end_x {
                        out.set(x, y, c, lut[image.get(x, y, c) as usize]);
                    }
                }
            }
        }
    }

    Ok(out)
}

fn find_min_max(image: &PixelBuffer, channel: usize) -> (u8, u8) {
    image
        .channel_values(channel)
        .fold((255u8, 0u8), |(min, max), v| (min.min(v), max.max(v)))
}

fn channel_histogram(image: &PixelBuffer, channel: usize) -> [u64; 256] {
    let mut histogram = [0u64; 256];
    for v in image.channel_values(channel) {
        histogram[v as usize] += 1;
    }
    histogram
}

fn percentile_rank(n: usize, percentile: f32) -> usize {
    let rank = (n as f64 * percentile as f64 / 100.0).floor();
    rank.clamp(0.0, (n - 1) as f64) as usize
}

/// The value at position `rank` of the sorted samples the histogram counts
fn value_at_rank(histogram: &[u64; 256], rank: usize) -> u8 {
    let mut seen = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen > rank as u64 {
            return value as u8;
        }
    }
    255
}

/// Linear remap of `[low, high]` to `[0, 255]`; a degenerate range is a no-op
fn stretch_channel(image: &PixelBuffer, channel: usize, low: u8, high: u8) -> PixelBuffer {
    if high <= low {
        return image.clone();
    }
    let range = (high - low) as f64;
    image.map_channel(channel, |v| {
        let stretched = (v as f64 - low as f64) * 255.0 / range;
        stretched.round().clamp(0.0, 255.0) as u8
    })
}

fn equalization_lut(histogram: &[u64; 256], total: usize) -> [u8; 256] {
    let mut lut = [0u8; 256];
    let mut cumulative = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        cumulative += count;
        let scaled = cumulative as f64 / total as f64 * 255.0;
        lut[value] = scaled.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(width: u32, height: u32, values: Vec<u8>) -> PixelBuffer {
        PixelBuffer::from_raw(width, height, 1, values).unwrap()
    }

    #[test]
    fn test_normalize_stretches_histogram() {
        // Create a low-contrast image (values 50-200)
        let img = PixelBuffer::from_fn(10, 10, 1, |x, _, _| 50 + (x as u8 * 15).min(150)).unwrap();

        let result = normalize_min_max(&img);
        let (min, max) = find_min_max(&result, 0);

        // After normalization, min should be 0 and max should be 255
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn test_normalize_handles_uniform_image() {
        // Uniform image (all same value)
        let img = PixelBuffer::filled(10, 10, 3, 128).unwrap();

        // Should return unchanged (no division by zero)
        assert_eq!(normalize_min_max(&img), img);
        assert_eq!(normalize_percentile(&img, 2.0, 98.0).unwrap(), img);
    }

    #[test]
    fn test_min_max_is_per_channel() {
        let img = PixelBuffer::from_raw(2, 1, 3, vec![10, 0, 7, 20, 255, 7]).unwrap();
        let result = normalize_min_max(&img);
        assert_eq!(result.data(), &[0, 0, 7, 255, 255, 7]);
    }

    #[test]
    fn test_percentile_clips_outliers() {
        // 100 pixels: one 0, ninety-eight 100..=197, one 255
        let mut values: Vec<u8> = (0..98).map(|i| 100 + i as u8).collect();
        values.insert(0, 0);
        values.push(255);
        let img = gray(10, 10, values);

        // rank floor(100*1/100)=1 -> 100, rank floor(100*99/100)=99 -> 255
        let result = normalize_percentile(&img, 1.0, 99.0).unwrap();
        assert_eq!(result.get(0, 0, 0), 0);
        assert_eq!(result.get(1, 0, 0), 0);
        assert_eq!(result.get(9, 9, 0), 255);

        // rank 2 -> 101, rank 98 -> 197: both tails clamp
        let result = normalize_percentile(&img, 2.0, 98.0).unwrap();
        assert_eq!(result.get(1, 0, 0), 0);
        assert_eq!(result.get(2, 0, 0), 0);
        assert_eq!(result.get(8, 9, 0), 255);
        assert_eq!(result.get(9, 9, 0), 255);
    }

    #[test]
    fn test_percentile_rank_is_clamped() {
        assert_eq!(percentile_rank(10, 100.0), 9);
        assert_eq!(percentile_rank(10, 0.0), 0);
        assert_eq!(percentile_rank(10, 55.0), 5);
    }

    #[test]
    fn test_histogram_equalization_spreads_values() {
        let img = gray(4, 1, vec![10, 10, 20, 30]);
        let result = histogram_equalization(&img);
        // CDF: 2/4, 3/4, 4/4 of 255
        assert_eq!(result.data(), &[128, 128, 191, 255]);
    }

    #[test]
    fn test_adaptive_equalization_uses_local_tiles() {
        // Two 2x2 tiles with different ranges end up equalized independently
        let img = gray(4, 2, vec![10, 20, 200, 210, 10, 20, 200, 210]);
        let result = adaptive_histogram_equalization(&img, 2).unwrap();
        assert_eq!(result.data(), &[128, 255, 128, 255, 128, 255, 128, 255]);
    }

    #[test]
    fn test_adaptive_equalization_clips_edge_tiles() {
        let img = PixelBuffer::from_fn(5, 3, 1, |x, y, _| (x * 40 + y * 3) as u8).unwrap();
        let result = adaptive_histogram_equalization(&img, 4).unwrap();
        assert_eq!(result.dimensions(), (5, 3));
        // right edge tile is a 1x3 column; its brightest pixel maps to 255
        assert_eq!(result.get(4, 2, 0), 255);
    }

    #[test]
    fn test_adaptive_equalization_rejects_zero_tile() {
        let img = gray(2, 2, vec![0, 1, 2, 3]);
        assert!(matches!(
            adaptive_histogram_equalization(&img, 0),
            Err(PreprocessError::Config(_))
        ));
    }
}
