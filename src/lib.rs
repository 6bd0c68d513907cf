//! Image preprocessing that turns scanned or photographed documents into
//! clean, deskewed, binarized images for text recognition.

pub mod buffer;
pub mod codec;
pub mod config;
pub mod error;
pub mod preprocessing;

pub use buffer::PixelBuffer;
pub use config::PipelineConfig;
pub use error::{PreprocessError, Result};
pub use preprocessing::{Pipeline, PipelineResult, Preset};
