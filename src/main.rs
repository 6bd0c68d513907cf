use anyhow::Context;
use clap::Parser;
use scanprep::preprocessing::batch::{self, BatchItem};
use scanprep::{PipelineConfig, Preset};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "scanprep")]
#[command(about = "Clean up scanned documents for OCR: deskew, denoise, binarize")]
#[command(version)]
pub struct Args {
    /// Image files to process (ignored when --input-dir is given)
    pub inputs: Vec<PathBuf>,

    /// Process every supported image in this directory
    #[arg(long, env = "SCANPREP_INPUT_DIR")]
    pub input_dir: Option<PathBuf>,

    /// Where processed images are written
    #[arg(long, env = "SCANPREP_OUTPUT_DIR", default_value = "processed")]
    pub output_dir: PathBuf,

    /// Parameter preset (default, invoice, document)
    #[arg(long, env = "SCANPREP_PRESET", default_value = "default")]
    pub preset: String,

    /// JSON config file; replaces the preset
    #[arg(long, env = "SCANPREP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write every intermediate stage image
    #[arg(long)]
    pub save_intermediate: bool,

    /// Prefix for output file names
    #[arg(long)]
    pub output_prefix: Option<String>,

    /// Output format (png, jpg)
    #[arg(long)]
    pub output_format: Option<String>,

    /// Write per-file diagnostics as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

fn build_config(args: &Args) -> anyhow::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Preset::from_str(&args.preset)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown preset {:?} (expected default, invoice or document)",
                    args.preset
                )
            })?
            .config(),
    };

    if args.save_intermediate {
        config.save_intermediate_steps = true;
    }
    if let Some(prefix) = &args.output_prefix {
        config.output_prefix = prefix.clone();
    }
    if let Some(format) = &args.output_format {
        config.output_extension = format.to_ascii_lowercase();
    }

    config.validate()?;
    Ok(config)
}

/// Process explicit files, writing each success into the output directory
async fn run_files(args: &Args, config: PipelineConfig) -> anyhow::Result<Vec<BatchItem>> {
    if args.inputs.is_empty() {
        anyhow::bail!("no input files given (pass paths or --input-dir)");
    }
    batch::process_files(args.inputs.clone(), &args.output_dir, config)
        .await
        .with_context(|| format!("creating {}", args.output_dir.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting scanprep v{}", env!("CARGO_PKG_VERSION"));

    let config = build_config(&args)?;

    let items = match &args.input_dir {
        Some(dir) => batch::process_directory(dir, &args.output_dir, config).await?,
        None => run_files(&args, config).await?,
    };

    for item in &items {
        if let Some(output) = &item.output_path {
            tracing::info!("{} -> {}", item.path.display(), output.display());
        }
    }

    if let Some(report) = &args.report {
        let json = serde_json::to_string_pretty(&items)?;
        std::fs::write(report, json)
            .with_context(|| format!("writing report {}", report.display()))?;
        tracing::info!("Report written to {}", report.display());
    }

    let failed = items.iter().filter(|item| !item.result.success).count();
    tracing::info!(
        processed = items.len() - failed,
        failed,
        "Done"
    );

    if failed > 0 {
        anyhow::bail!("{} of {} files failed", failed, items.len());
    }
    Ok(())
}
