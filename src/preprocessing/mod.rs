//! Document preprocessing for OCR
//!
//! Stage functions live in [`steps`]; [`Pipeline`] runs them in a fixed order
//! and [`batch`] fans runs out over many files.

pub mod batch;
pub mod diagnostics;
pub mod pipeline;
pub mod steps;

pub use batch::{process_batch, process_directory, process_files, save_pipeline_result, BatchItem};
pub use diagnostics::{Diagnostics, Snapshot};
pub use pipeline::{stage, Pipeline, PipelineResult, Preset, StepTiming};
