use crate::buffer::PixelBuffer;
use crate::config::PipelineConfig;
use crate::error::{PreprocessError, Result};
use serde::Serialize;
use std::time::Instant;

use super::diagnostics::{Diagnostics, Snapshot};
use super::steps;

/// Snapshot and timing names, numbered in execution order
pub mod stage {
    pub const ORIGINAL: &str = "00_original";
    pub const GRAYSCALE: &str = "01_grayscale";
    pub const DESKEWED: &str = "02_deskewed";
    pub const NOISE_REDUCED: &str = "03_noise_reduced";
    pub const CONTRAST_ENHANCED: &str = "04_contrast_enhanced";
    pub const RESIZED: &str = "05_resized";
    pub const THRESHOLDED: &str = "06_thresholded";
    /// Timing-only entry for the skew search
    pub const SKEW_ESTIMATION: &str = "skew_estimation";
}

/// Detected skew at or below this many degrees is left alone
pub const MIN_DESKEW_ANGLE: f32 = 0.5;

/// Named parameter sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Library defaults
    #[default]
    Default,
    /// Invoices: skew up to 30°, no denoising, contrast [1, 99]
    Invoice,
    /// General documents: skew up to 45°, 3x3 median, contrast [2, 98]
    Document,
}

impl Preset {
    /// Parse from a CLI string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "default" => Some(Self::Default),
            "invoice" => Some(Self::Invoice),
            "document" => Some(Self::Document),
            _ => None,
        }
    }

    /// Get the preset name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Invoice => "invoice",
            Self::Document => "document",
        }
    }

    pub fn config(&self) -> PipelineConfig {
        match self {
            Self::Default => PipelineConfig::default(),
            Self::Invoice => PipelineConfig::invoice(),
            Self::Document => PipelineConfig::document(),
        }
    }
}

/// Timing information for a single preprocessing step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Outcome of one pipeline run.
///
/// Serializes to the diagnostic fields only; images are never written to JSON.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// Processed image, `None` when the run failed
    #[serde(skip)]
    pub final_image: Option<PixelBuffer>,
    /// Stage snapshots in execution order (serialized as their names)
    #[serde(serialize_with = "snapshot_names")]
    pub intermediate_steps: Vec<Snapshot>,
    /// Degrees; 0 when deskewing is disabled
    pub detected_skew_angle: f32,
    /// Global threshold applied by the Otsu stage; 0 when it did not run
    pub otsu_threshold: u8,
    pub success: bool,
    /// Empty on success
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    /// Total processing time in milliseconds
    pub total_time_ms: u64,
    /// Individual step timings
    pub steps: Vec<StepTiming>,
}

#[allow(clippy::ptr_arg)]
fn snapshot_names<S>(snapshots: &Vec<Snapshot>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(snapshots.iter().map(|s| s.name.as_str()))
}

impl PipelineResult {
    /// A failed result carrying no image
    pub fn failure(error: &PreprocessError) -> Self {
        Self {
            final_image: None,
            intermediate_steps: Vec::new(),
            detected_skew_angle: 0.0,
            otsu_threshold: 0,
            success: false,
            error_message: error.to_string(),
            error_code: Some(error.root().code()),
            total_time_ms: 0,
            steps: Vec::new(),
        }
    }

    /// The processed image, only if the run succeeded
    pub fn image(&self) -> Option<&PixelBuffer> {
        self.final_image.as_ref().filter(|_| self.success)
    }

    /// Log the outcome at info level (warn on failure)
    pub fn log_summary(&self) {
        if !self.success {
            tracing::warn!(
                error = %self.error_message,
                code = self.error_code.unwrap_or("UNKNOWN"),
                "Pipeline failed"
            );
            return;
        }

        let (width, height, channels) = self
            .final_image
            .as_ref()
            .map(|img| (img.width(), img.height(), img.channels()))
            .unwrap_or_default();

        tracing::info!(
            skew_angle = self.detected_skew_angle,
            otsu_threshold = self.otsu_threshold,
            width,
            height,
            channels,
            snapshots = self.intermediate_steps.len(),
            total_ms = self.total_time_ms,
            "Pipeline completed"
        );
        for step in &self.steps {
            tracing::debug!(step = %step.name, time_ms = step.time_ms, "Step timing");
        }
    }
}

/// Per-run bookkeeping threaded through the stages
struct RunState<'a> {
    diagnostics: &'a mut Diagnostics,
    timings: Vec<StepTiming>,
    detected_skew_angle: f32,
    otsu_threshold: u8,
}

/// Fixed-order preprocessing pipeline:
/// grayscale, deskew, noise reduction, contrast, resize, threshold.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn from_preset(preset: Preset) -> Self {
        Self::new(preset.config())
    }

    pub fn invoice() -> Self {
        Self::from_preset(Preset::Invoice)
    }

    pub fn document() -> Self {
        Self::from_preset(Preset::Document)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every enabled stage, collecting snapshots if the config asks for them
    pub fn process(&self, image: &PixelBuffer) -> PipelineResult {
        let mut diagnostics = Diagnostics::new(self.config.save_intermediate_steps);
        let mut result = self.process_with(image, &mut diagnostics);
        result.intermediate_steps = diagnostics.into_snapshots();
        result
    }

    /// Run every enabled stage, reporting snapshots to `diagnostics`.
    ///
    /// Never returns an error: a failing stage yields `success == false` with
    /// no image.
    pub fn process_with(&self, image: &PixelBuffer, diagnostics: &mut Diagnostics) -> PipelineResult {
        let start = Instant::now();
        let mut state = RunState {
            diagnostics,
            timings: Vec::new(),
            detected_skew_angle: 0.0,
            otsu_threshold: 0,
        };

        let outcome = self
            .config
            .validate()
            .and_then(|_| self.run_stages(image, &mut state));
        let total_time_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(final_image) => PipelineResult {
                final_image: Some(final_image),
                intermediate_steps: Vec::new(),
                detected_skew_angle: state.detected_skew_angle,
                otsu_threshold: state.otsu_threshold,
                success: true,
                error_message: String::new(),
                error_code: None,
                total_time_ms,
                steps: state.timings,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Preprocessing aborted");
                PipelineResult {
                    detected_skew_angle: state.detected_skew_angle,
                    total_time_ms,
                    steps: state.timings,
                    ..PipelineResult::failure(&e)
                }
            }
        }
    }

    fn run_stages(&self, image: &PixelBuffer, state: &mut RunState<'_>) -> Result<PixelBuffer> {
        let config = &self.config;
        state.diagnostics.record(stage::ORIGINAL, image);

        let mut img = if image.channels() > 1 {
            self.run_step(stage::GRAYSCALE, image, state, |i| {
                steps::grayscale::to_grayscale(i, config.grayscale_method)
            })?
        } else {
            image.clone()
        };

        if config.enable_deskewing {
            let angle = self.time_step(stage::SKEW_ESTIMATION, state, || {
                steps::deskew::estimate(&img, config.skew_method, config.max_skew_angle)
            })?;
            state.detected_skew_angle = angle;

            if angle.abs() > MIN_DESKEW_ANGLE {
                img = self.run_step(stage::DESKEWED, &img, state, |i| steps::deskew::deskew(i, angle))?;
            } else {
                tracing::debug!(angle, "Skew below correction threshold, not rotating");
            }
        }

        if config.enable_noise_reduction {
            img = self.run_step(stage::NOISE_REDUCED, &img, state, |i| {
                steps::denoise::apply(i, config)
            })?;
        }

        if config.enable_contrast_enhancement {
            img = self.run_step(stage::CONTRAST_ENHANCED, &img, state, |i| {
                steps::normalize::apply(i, config)
            })?;
        }

        if config.enable_resizing {
            img = self.run_step(stage::RESIZED, &img, state, |i| steps::resize::apply(i, config))?;
        }

        if config.enable_thresholding {
            let (binary, threshold) = self.time_step(stage::THRESHOLDED, state, || {
                steps::threshold::apply(&img, config)
            })?;
            if let Some(threshold) = threshold {
                state.otsu_threshold = threshold;
            }
            state.diagnostics.record(stage::THRESHOLDED, &binary);
            img = binary;
        }

        Ok(img)
    }

    /// Time a stage, attaching its name to any error it raises
    fn time_step<T, F>(&self, name: &str, state: &mut RunState<'_>, step_fn: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let step_start = Instant::now();
        let result = step_fn().map_err(|e| PreprocessError::in_stage(name, e))?;
        let time_ms = step_start.elapsed().as_millis() as u64;
        tracing::debug!(step = name, time_ms, "Step finished");
        state.timings.push(StepTiming {
            name: name.to_string(),
            time_ms,
        });
        Ok(result)
    }

    fn run_step<F>(
        &self,
        name: &str,
        img: &PixelBuffer,
        state: &mut RunState<'_>,
        step_fn: F,
    ) -> Result<PixelBuffer>
    where
        F: FnOnce(&PixelBuffer) -> Result<PixelBuffer>,
    {
        let result = self.time_step(name, state, || step_fn(img))?;
        state.diagnostics.record(name, &result);
        Ok(result)
    }
}
