//! Owned pixel storage shared by every preprocessing stage.

use crate::error::{PreprocessError, Result};

/// Row-major, channel-interleaved 8-bit image.
///
/// The buffer always satisfies `data.len() == width * height * channels`, with
/// `width > 0`, `height > 0` and `channels` one of 1 (gray), 3 (RGB) or
/// 4 (RGBA). Stages never write into their input; they build a new buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Create a zero-filled buffer
    pub fn new(width: u32, height: u32, channels: u8) -> Result<Self> {
        Self::filled(width, height, channels, 0)
    }

    /// Create a buffer with every sample set to `value`
    pub fn filled(width: u32, height: u32, channels: u8, value: u8) -> Result<Self> {
        let len = checked_len(width, height, channels)?;
        Ok(Self {
            width,
            height,
            channels,
            data: vec![value; len],
        })
    }

    /// Wrap existing sample data, validating its length
    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        let len = checked_len(width, height, channels)?;
        if data.len() != len {
            return Err(PreprocessError::Config(format!(
                "buffer of {} bytes does not match {}x{}x{} ({} bytes)",
                data.len(),
                width,
                height,
                channels,
                len
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Build a buffer by evaluating `f(x, y, channel)` for every sample
    pub fn from_fn<F>(width: u32, height: u32, channels: u8, mut f: F) -> Result<Self>
    where
        F: FnMut(u32, u32, usize) -> u8,
    {
        let len = checked_len(width, height, channels)?;
        let mut data = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels as usize {
                    data.push(f(x, y, c));
                }
            }
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of pixels (not samples)
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({}, {}) out of bounds for {}x{} buffer",
            x,
            y,
            self.width,
            self.height
        );
        (y as usize * self.width as usize + x as usize) * self.channels as usize
    }

    /// All channel values of the pixel at `(x, y)`
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let start = self.offset(x, y);
        &self.data[start..start + self.channels as usize]
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let start = self.offset(x, y);
        let channels = self.channels as usize;
        &mut self.data[start..start + channels]
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32, channel: usize) -> u8 {
        self.pixel(x, y)[channel]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, channel: usize, value: u8) {
        self.pixel_mut(x, y)[channel] = value;
    }

    /// Sample with coordinates clamped to the image edge
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64, channel: usize) -> u8 {
        let cx = x.clamp(0, self.width as i64 - 1) as u32;
        let cy = y.clamp(0, self.height as i64 - 1) as u32;
        self.get(cx, cy, channel)
    }

    /// Iterate over the values of one channel in row-major order
    pub fn channel_values(&self, channel: usize) -> impl Iterator<Item = u8> + '_ {
        assert!(channel < self.channels as usize);
        self.data
            .iter()
            .skip(channel)
            .step_by(self.channels as usize)
            .copied()
    }

    /// Apply `f` to every sample of `channel`, leaving other channels as they are
    pub fn map_channel<F>(&self, channel: usize, mut f: F) -> PixelBuffer
    where
        F: FnMut(u8) -> u8,
    {
        let mut out = self.clone();
        let channels = self.channels as usize;
        for value in out.data.iter_mut().skip(channel).step_by(channels) {
            *value = f(*value);
        }
        out
    }

    /// A same-sized buffer with one channel taken from this one
    pub fn extract_channel(&self, channel: usize) -> PixelBuffer {
        PixelBuffer {
            width: self.width,
            height: self.height,
            channels: 1,
            data: self.channel_values(channel).collect(),
        }
    }
}

fn checked_len(width: u32, height: u32, channels: u8) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(PreprocessError::Config(format!(
            "image dimensions must be positive, got {}x{}",
            width, height
        )));
    }
    if !matches!(channels, 1 | 3 | 4) {
        return Err(PreprocessError::Config(format!(
            "unsupported channel count {} (expected 1, 3 or 4)",
            channels
        )));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(channels as usize))
        .ok_or_else(|| {
            PreprocessError::Config(format!(
                "image {}x{}x{} is too large",
                width, height, channels
            ))
        })
}
