//! Multi-file processing on the tokio blocking pool.
//!
//! At most [`concurrency_limit`] files are in flight at once. Modes that write
//! results to disk drop the decoded images as soon as they are saved.

use crate::codec;
use crate::config::PipelineConfig;
use crate::error::{PreprocessError, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::pipeline::{Pipeline, PipelineResult};

/// Files are decoded as RGB; the grayscale stage reduces them
pub const INPUT_CHANNELS: u8 = 3;

/// One input file and what became of it
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub path: PathBuf,
    /// Where the processed image was written, if it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Snapshot files written next to the output
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub snapshot_paths: Vec<PathBuf>,
    #[serde(flatten)]
    pub result: PipelineResult,
}

/// Load and process a single file. Load failures become a failed result.
pub fn process_file(path: &Path, pipeline: &Pipeline) -> PipelineResult {
    match codec::load(path, INPUT_CHANNELS) {
        Ok(image) => pipeline.process(&image),
        Err(e) => {
            let mut result = PipelineResult::failure(&e);
            result.error_message = format!("Failed to load image: {} - {}", path.display(), e);
            result
        }
    }
}

/// Files processed at once: one per available core
pub fn concurrency_limit() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Run `job` for every path on the blocking pool, at most `concurrency_limit()`
/// at a time, keeping input order
async fn fan_out<F>(paths: Vec<PathBuf>, job: F) -> Vec<BatchItem>
where
    F: Fn(PathBuf) -> BatchItem + Send + Sync + 'static,
{
    let job = Arc::new(job);
    stream::iter(paths)
        .map(|path| {
            let job = Arc::clone(&job);
            async move {
                let task_path = path.clone();
                match tokio::task::spawn_blocking(move || job(task_path)).await {
                    Ok(item) => item,
                    Err(e) => {
                        let err = PreprocessError::Io(std::io::Error::other(format!(
                            "processing task failed: {}",
                            e
                        )));
                        BatchItem {
                            path,
                            output_path: None,
                            snapshot_paths: Vec::new(),
                            result: PipelineResult::failure(&err),
                        }
                    }
                }
            }
        })
        .buffered(concurrency_limit())
        .collect::<Vec<_>>()
        .await
}

fn log_item(item: &BatchItem) {
    if item.result.success {
        tracing::info!(
            path = %item.path.display(),
            skew_angle = item.result.detected_skew_angle,
            time_ms = item.result.total_time_ms,
            "Processed"
        );
    } else {
        tracing::warn!(
            path = %item.path.display(),
            error = %item.result.error_message,
            "Failed to process"
        );
    }
}

/// Process every path with one config. Each file succeeds or fails on its
/// own; the returned items are in input order and keep their images.
pub async fn process_batch(paths: Vec<PathBuf>, config: PipelineConfig) -> Vec<BatchItem> {
    let pipeline = Pipeline::new(config);
    tracing::info!(files = paths.len(), "Starting batch");

    let items = fan_out(paths, move |path| BatchItem {
        result: process_file(&path, &pipeline),
        output_path: None,
        snapshot_paths: Vec::new(),
        path,
    })
    .await;

    items.iter().for_each(log_item);
    items
}

/// `{prefix}_{stem}.{ext}` for an input file
pub fn output_file_name(input: &Path, config: &PipelineConfig) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    format!("{}_{}.{}", config.output_prefix, stem, config.output_extension)
}

/// Write the final image and, if enabled, every snapshot as
/// `{output_stem}_{stage}{ext}` next to it. Returns the snapshot paths.
pub fn save_pipeline_result(
    result: &PipelineResult,
    output_path: &Path,
    config: &PipelineConfig,
) -> Result<Vec<PathBuf>> {
    let image = result.image().ok_or_else(|| {
        PreprocessError::Encode(format!(
            "cannot save failed pipeline result to {}: {}",
            output_path.display(),
            result.error_message
        ))
    })?;
    codec::save(output_path, image)?;

    let mut written = Vec::new();
    if config.save_intermediate_steps && !result.intermediate_steps.is_empty() {
        let stem = output_path
            .file_stem()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
        let extension = output_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let dir = output_path.parent().unwrap_or_else(|| Path::new(""));

        for snapshot in &result.intermediate_steps {
            let step_path = dir.join(format!("{}_{}{}", stem, snapshot.name, extension));
            codec::save(&step_path, &snapshot.image)?;
            written.push(step_path);
        }
    }

    Ok(written)
}

/// Raster files directly inside `dir`, sorted by name
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && codec::is_supported_input(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Process `paths` and write each success into `output_dir` as soon as it
/// finishes. Saved results keep their diagnostics but not their images.
///
/// Only creating the output directory can fail the call; per-file problems,
/// save errors included, are reported in the returned items.
pub async fn process_files(
    paths: Vec<PathBuf>,
    output_dir: impl AsRef<Path>,
    config: PipelineConfig,
) -> Result<Vec<BatchItem>> {
    let output_dir = output_dir.as_ref().to_path_buf();
    tokio::fs::create_dir_all(&output_dir).await?;

    let pipeline = Pipeline::new(config.clone());
    let items = fan_out(paths, move |path| {
        let mut result = process_file(&path, &pipeline);
        let mut output_path = None;
        let mut snapshot_paths = Vec::new();

        if result.success {
            let target = output_dir.join(output_file_name(&path, &config));
            match save_pipeline_result(&result, &target, &config) {
                Ok(written) => {
                    output_path = Some(target);
                    snapshot_paths = written;
                    result.final_image = None;
                    result.intermediate_steps.clear();
                }
                Err(e) => result = PipelineResult::failure(&e),
            }
        }

        BatchItem {
            path,
            output_path,
            snapshot_paths,
            result,
        }
    })
    .await;

    items.iter().for_each(log_item);
    Ok(items)
}

/// Process every image in `input_dir` and write results into `output_dir`.
///
/// Only listing the input or creating the output directory can fail the
/// call; per-file problems are reported in the returned items.
pub async fn process_directory(
    input_dir: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: PipelineConfig,
) -> Result<Vec<BatchItem>> {
    let input_dir = input_dir.as_ref();
    let output_dir = output_dir.as_ref();

    let paths = list_images(input_dir)?;
    tracing::info!(
        input = %input_dir.display(),
        output = %output_dir.display(),
        files = paths.len(),
        "Processing directory"
    );

    process_files(paths, output_dir, config).await
}
