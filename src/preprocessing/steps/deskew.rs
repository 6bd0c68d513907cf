//! Skew estimation and rotation.
//!
//! Angles are in degrees. An image produced by `rotate_image(page, θ, ..)` is
//! estimated as skewed by `θ`, and `deskew(image, θ)` rotates it back.

use crate::buffer::PixelBuffer;
use crate::config::SkewMethod;
use crate::error::{PreprocessError, Result};

use super::grayscale::to_grayscale_luminance;
use super::threshold::threshold_otsu;

/// Resolution of the angle search
pub const ANGLE_STEP: f32 = 0.5;
/// Rotations smaller than this return the input untouched
pub const MIN_ROTATION: f32 = 0.01;
/// Search half-range used by `deskew_auto`
pub const DEFAULT_MAX_ANGLE: f32 = 45.0;
/// Widest search range accepted, in degrees either side of level
pub const MAX_SEARCH_ANGLE: f32 = 90.0;
pub const WHITE: u8 = 255;

/// Edge threshold on the binarized image (neighbors differ by more than this)
const EDGE_DELTA: i32 = 128;

/// Estimate skew with the given method over `[-max_angle, max_angle]`
pub fn estimate(image: &PixelBuffer, method: SkewMethod, max_angle: f32) -> Result<f32> {
    match method {
        SkewMethod::Projection => estimate_skew_angle_projection(image, -max_angle, max_angle),
        SkewMethod::Hough => estimate_skew_angle_hough(image, -max_angle, max_angle),
    }
}

/// Default estimator (projection profile)
pub fn estimate_skew_angle(image: &PixelBuffer, min_angle: f32, max_angle: f32) -> Result<f32> {
    estimate_skew_angle_projection(image, min_angle, max_angle)
}

/// Candidate angles from `min` to `max` inclusive, in `ANGLE_STEP` increments
fn candidate_angles(min_angle: f32, max_angle: f32) -> Result<Vec<f32>> {
    if !min_angle.is_finite() || !max_angle.is_finite() || min_angle > max_angle {
        return Err(PreprocessError::Config(format!(
            "invalid skew search range [{}, {}]",
            min_angle, max_angle
        )));
    }
    if min_angle < -MAX_SEARCH_ANGLE || max_angle > MAX_SEARCH_ANGLE {
        return Err(PreprocessError::Config(format!(
            "skew search range [{}, {}] exceeds ±{} degrees",
            min_angle, max_angle, MAX_SEARCH_ANGLE
        )));
    }
    let steps = ((max_angle - min_angle) / ANGLE_STEP + 1e-4).floor() as usize;
    Ok((0..=steps)
        .map(|i| min_angle + i as f32 * ANGLE_STEP)
        .collect())
}

fn binarize(image: &PixelBuffer) -> Result<PixelBuffer> {
    if image.channels() == 1 {
        threshold_otsu(image)
    } else {
        threshold_otsu(&to_grayscale_luminance(image)?)
    }
}

/// Detect skew angle using projection profile variance.
///
/// Every ink pixel is mapped to the row it would occupy if the image were
/// rotated back by the candidate angle about its center. The candidate whose
/// row histogram has the highest variance (sharpest text lines) wins; ties
/// keep the earliest candidate. A page with no ink reports 0.
pub fn estimate_skew_angle_projection(
    image: &PixelBuffer,
    min_angle: f32,
    max_angle: f32,
) -> Result<f32> {
    let candidates = candidate_angles(min_angle, max_angle)?;
    let binary = binarize(image)?;
    let (width, height) = binary.dimensions();
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;

    // Ink pixels relative to the center
    let mut ink = Vec::new();
    for y in 0..height {
        for x in 0..width {
            if binary.get(x, y, 0) == 0 {
                ink.push((x as f64 - cx, y as f64 - cy));
            }
        }
    }

    let mut row_counts = vec![0u32; height as usize];
    let mut best_angle = 0.0f32;
    let mut best_variance = 0.0f64;

    for angle in candidates {
        let (sin_a, cos_a) = (angle as f64).to_radians().sin_cos();
        row_counts.fill(0);

        for &(dx, dy) in &ink {
            let row = (dy * cos_a - dx * sin_a + cy).floor();
            if row >= 0.0 && row < height as f64 {
                row_counts[row as usize] += 1;
            }
        }

        let variance = variance(&row_counts);
        if variance > best_variance {
            best_variance = variance;
            best_angle = angle;
        }
    }

    tracing::debug!(
        angle = best_angle,
        ink_pixels = ink.len(),
        "Projection skew estimate"
    );
    Ok(best_angle)
}

fn variance(counts: &[u32]) -> f64 {
    let n = counts.len() as f64;
    let mean = counts.iter().map(|&c| c as f64).sum::<f64>() / n;
    counts
        .iter()
        .map(|&c| (c as f64 - mean).powi(2))
        .sum::<f64>()
        / n
}

/// Detect skew angle with a Hough accumulator over binarized edges.
///
/// Edge pixels vote for `rho = y·cosθ − x·sinθ` at every candidate angle; the
/// angle of the single most-voted (angle, rho) cell wins, scanning angles in
/// ascending order and keeping the first maximum.
pub fn estimate_skew_angle_hough(image: &PixelBuffer, min_angle: f32, max_angle: f32) -> Result<f32> {
    let candidates = candidate_angles(min_angle, max_angle)?;
    let binary = binarize(image)?;
    let (width, height) = binary.dimensions();

    let mut edges = Vec::new();
    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let current = binary.get(x, y, 0) as i32;
            let right = binary.get(x + 1, y, 0) as i32;
            let bottom = binary.get(x, y + 1, 0) as i32;
            if (current - right).abs() > EDGE_DELTA || (current - bottom).abs() > EDGE_DELTA {
                edges.push((x as f64, y as f64));
            }
        }
    }

    let max_rho = ((width as f64).hypot(height as f64)).ceil() as i64;
    let mut accumulator = vec![0u32; (2 * max_rho + 1) as usize];
    let mut best_angle = 0.0f32;
    let mut max_votes = 0u32;

    for angle in candidates {
        let (sin_a, cos_a) = (angle as f64).to_radians().sin_cos();
        accumulator.fill(0);

        for &(x, y) in &edges {
            let rho = (y * cos_a - x * sin_a).round() as i64 + max_rho;
            accumulator[rho as usize] += 1;
        }

        for &votes in &accumulator {
            if votes > max_votes {
                max_votes = votes;
                best_angle = angle;
            }
        }
    }

    tracing::debug!(
        angle = best_angle,
        edge_pixels = edges.len(),
        votes = max_votes,
        "Hough skew estimate"
    );
    Ok(best_angle)
}

/// Rotate by `angle_degrees` (positive = clockwise on screen).
///
/// The output grows to the bounding box of the rotated corners; uncovered
/// pixels get `background`. Each output pixel's corner coordinate is mapped
/// back into the source and rounded to the nearest source pixel.
pub fn rotate_image(image: &PixelBuffer, angle_degrees: f32, background: u8) -> Result<PixelBuffer> {
    if !angle_degrees.is_finite() {
        return Err(PreprocessError::Config(format!(
            "rotation angle must be finite, got {}",
            angle_degrees
        )));
    }
    if angle_degrees.abs() < MIN_ROTATION {
        return Ok(image.clone());
    }

    let (sin_a, cos_a) = (angle_degrees as f64).to_radians().sin_cos();
    let (old_w, old_h) = image.dimensions();
    let (w, h) = (old_w as f64, old_h as f64);

    let (mut min_x, mut max_x, mut min_y, mut max_y) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for (cx, cy) in [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)] {
        let nx = cx * cos_a - cy * sin_a;
        let ny = cx * sin_a + cy * cos_a;
        min_x = min_x.min(nx);
        max_x = max_x.max(nx);
        min_y = min_y.min(ny);
        max_y = max_y.max(ny);
    }

    let new_w = ((max_x - min_x + 0.5) as u32).max(1);
    let new_h = ((max_y - min_y + 0.5) as u32).max(1);
    let (offset_x, offset_y) = (-min_x, -min_y);

    let mut rotated = PixelBuffer::filled(new_w, new_h, image.channels(), background)?;

    for y in 0..new_h {
        for x in 0..new_w {
            let rx = x as f64 - offset_x;
            let ry = y as f64 - offset_y;
            // Round half up, truncating toward zero
            let src_x = (rx * cos_a + ry * sin_a + 0.5) as i64;
            let src_y = (-rx * sin_a + ry * cos_a + 0.5) as i64;

            if (0..old_w as i64).contains(&src_x) && (0..old_h as i64).contains(&src_y) {
                let src = image.pixel(src_x as u32, src_y as u32);
                rotated.pixel_mut(x, y).copy_from_slice(src);
            }
        }
    }

    Ok(rotated)
}

/// Undo a detected skew by rotating the opposite way on a white background
pub fn deskew(image: &PixelBuffer, angle_degrees: f32) -> Result<PixelBuffer> {
    rotate_image(image, -angle_degrees, WHITE)
}

/// Estimate over ±45° and correct in one go
pub fn deskew_auto(image: &PixelBuffer) -> Result<PixelBuffer> {
    let angle = estimate_skew_angle(image, -DEFAULT_MAX_ANGLE, DEFAULT_MAX_ANGLE)?;
    deskew(image, angle)
}
