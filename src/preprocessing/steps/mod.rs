//! Individual preprocessing steps

pub mod convolve;
pub mod denoise;
pub mod deskew;
pub mod grayscale;
pub mod normalize;
pub mod resize;
pub mod threshold;
