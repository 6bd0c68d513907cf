use crate::buffer::PixelBuffer;
use crate::config::GrayscaleMethod;
use crate::error::Result;

/// Reduce color input to one channel; gray input is returned as-is
pub fn to_grayscale(image: &PixelBuffer, method: GrayscaleMethod) -> Result<PixelBuffer> {
    if image.channels() == 1 {
        return Ok(image.clone());
    }

    let reduce: fn(&[u8]) -> u8 = match method {
        GrayscaleMethod::Luminance => luminance,
        GrayscaleMethod::Average => average,
    };

    let (width, height) = image.dimensions();
    PixelBuffer::from_fn(width, height, 1, |x, y, _| reduce(image.pixel(x, y)))
}

pub fn to_grayscale_luminance(image: &PixelBuffer) -> Result<PixelBuffer> {
    to_grayscale(image, GrayscaleMethod::Luminance)
}

pub fn to_grayscale_average(image: &PixelBuffer) -> Result<PixelBuffer> {
    to_grayscale(image, GrayscaleMethod::Average)
}

/// Alpha (4th channel) is ignored
fn luminance(px: &[u8]) -> u8 {
    let value = 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64;
    value.round().clamp(0.0, 255.0) as u8
}

fn average(px: &[u8]) -> u8 {
    ((px[0] as u32 + px[1] as u32 + px[2] as u32) / 3) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(pixels: &[[u8; 3]]) -> PixelBuffer {
        let data = pixels.iter().flatten().copied().collect();
        PixelBuffer::from_raw(pixels.len() as u32, 1, 3, data).unwrap()
    }

    #[test]
    fn test_luminance_weights() {
        let img = rgb(&[[255, 0, 0], [0, 255, 0], [0, 0, 255], [10, 20, 30]]);
        let gray = to_grayscale_luminance(&img).unwrap();

        assert_eq!(gray.channels(), 1);
        // 76.245, 149.685, 29.07, 18.15
        assert_eq!(gray.data(), &[76, 150, 29, 18]);
    }

    #[test]
    fn test_average_uses_integer_division() {
        let img = rgb(&[[255, 0, 0], [1, 1, 2], [255, 255, 255]]);
        let gray = to_grayscale_average(&img).unwrap();
        assert_eq!(gray.data(), &[85, 1, 255]);
    }

    #[test]
    fn test_rgba_ignores_alpha() {
        let img = PixelBuffer::from_raw(1, 1, 4, vec![100, 100, 100, 0]).unwrap();
        let gray = to_grayscale_luminance(&img).unwrap();
        assert_eq!(gray.data(), &[100]);
    }

    #[test]
    fn test_grayscale_is_idempotent() {
        let img = PixelBuffer::from_fn(13, 7, 3, |x, y, c| (x * 19 + y * 5 + c as u32 * 70) as u8)
            .unwrap();
        let once = to_grayscale_luminance(&img).unwrap();
        let twice = to_grayscale_luminance(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_grayscale_preserves_dimensions() {
        let img = PixelBuffer::new(100, 50, 3).unwrap();
        let result = to_grayscale_luminance(&img).unwrap();
        assert_eq!(result.width(), 100);
        assert_eq!(result.height(), 50);
    }
}
