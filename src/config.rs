use crate::error::{PreprocessError, Result};
use crate::preprocessing::steps::deskew::MAX_SEARCH_ANGLE;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How color pixels are reduced to a single channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrayscaleMethod {
    /// ITU-R BT.601 weights (0.299, 0.587, 0.114)
    #[default]
    Luminance,
    /// Plain average of R, G and B
    Average,
}

/// Skew estimator used by the deskew stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkewMethod {
    #[default]
    Projection,
    Hough,
}

/// Local threshold weighting used when adaptive thresholding is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptiveMethod {
    #[default]
    Mean,
    Gaussian,
}

/// Parameters for every pipeline stage.
///
/// Unknown fields are rejected and missing fields fall back to
/// [`PipelineConfig::default`], so a JSON file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub grayscale_method: GrayscaleMethod,

    pub enable_deskewing: bool,
    /// Half-width of the skew search range, in degrees
    pub max_skew_angle: f32,
    pub skew_method: SkewMethod,

    pub enable_noise_reduction: bool,
    /// Median window size; even values are bumped to the next odd size
    pub median_filter_size: u32,

    pub enable_contrast_enhancement: bool,
    /// Global histogram equalization instead of percentile stretching
    pub use_histogram_equalization: bool,
    pub percentile_low: f32,
    pub percentile_high: f32,

    pub enable_resizing: bool,
    /// 0 = unset
    pub target_width: u32,
    /// 0 = unset
    pub target_height: u32,
    pub scale_factor: f32,

    pub enable_thresholding: bool,
    /// Adaptive local threshold instead of global Otsu
    pub use_adaptive_threshold: bool,
    pub adaptive_method: AdaptiveMethod,
    pub adaptive_block_size: u32,
    pub adaptive_c: i32,

    pub save_intermediate_steps: bool,
    pub output_prefix: String,
    /// Format of written results: "png" or "jpg"
    pub output_extension: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grayscale_method: GrayscaleMethod::Luminance,
            enable_deskewing: true,
            max_skew_angle: 45.0,
            skew_method: SkewMethod::Projection,
            enable_noise_reduction: true,
            median_filter_size: 3,
            enable_contrast_enhancement: true,
            use_histogram_equalization: false,
            percentile_low: 2.0,
            percentile_high: 98.0,
            enable_resizing: false,
            target_width: 0,
            target_height: 0,
            scale_factor: 1.0,
            enable_thresholding: true,
            use_adaptive_threshold: false,
            adaptive_method: AdaptiveMethod::Mean,
            adaptive_block_size: 11,
            adaptive_c: 2,
            save_intermediate_steps: false,
            output_prefix: "processed".to_string(),
            output_extension: "png".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Tuned for invoices: moderate skew, no denoising, aggressive contrast
    pub fn invoice() -> Self {
        Self {
            enable_deskewing: true,
            max_skew_angle: 30.0,
            enable_noise_reduction: false,
            median_filter_size: 3,
            enable_contrast_enhancement: true,
            use_histogram_equalization: false,
            percentile_low: 1.0,
            percentile_high: 99.0,
            enable_resizing: false,
            enable_thresholding: true,
            use_adaptive_threshold: false,
            output_prefix: "invoice_processed".to_string(),
            ..Self::default()
        }
    }

    /// General documents: wider skew search and light median denoising
    pub fn document() -> Self {
        Self {
            enable_deskewing: true,
            max_skew_angle: 45.0,
            enable_noise_reduction: true,
            median_filter_size: 3,
            enable_contrast_enhancement: true,
            use_histogram_equalization: false,
            percentile_low: 2.0,
            percentile_high: 98.0,
            enable_resizing: false,
            enable_thresholding: true,
            use_adaptive_threshold: false,
            output_prefix: "document_processed".to_string(),
            ..Self::default()
        }
    }

    /// Load a JSON config file; absent fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            PreprocessError::Config(format!("invalid config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations no stage can honor
    pub fn validate(&self) -> Result<()> {
        if !self.max_skew_angle.is_finite()
            || !(0.0..=MAX_SEARCH_ANGLE).contains(&self.max_skew_angle)
        {
            return Err(PreprocessError::Config(format!(
                "max_skew_angle must be between 0 and {}, got {}",
                MAX_SEARCH_ANGLE, self.max_skew_angle
            )));
        }

        let in_range = |p: f32| p.is_finite() && (0.0..=100.0).contains(&p);
        if !in_range(self.percentile_low)
            || !in_range(self.percentile_high)
            || self.percentile_low >= self.percentile_high
        {
            return Err(PreprocessError::Config(format!(
                "percentile bounds must satisfy 0 <= low < high <= 100, got [{}, {}]",
                self.percentile_low, self.percentile_high
            )));
        }

        if self.enable_resizing && (!self.scale_factor.is_finite() || self.scale_factor <= 0.0) {
            return Err(PreprocessError::Config(format!(
                "scale_factor must be positive, got {}",
                self.scale_factor
            )));
        }

        if self.adaptive_block_size == 0 {
            return Err(PreprocessError::Config(
                "adaptive_block_size must be positive".to_string(),
            ));
        }

        crate::codec::ImageFormat::from_extension(&self.output_extension)
            .map_err(|_| {
                PreprocessError::Config(format!(
                    "output_extension must be png, jpg or jpeg, got {:?}",
                    self.output_extension
                ))
            })?;

        Ok(())
    }
}
