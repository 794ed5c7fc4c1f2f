use std::path::PathBuf;

use anyhow::ensure;
use clap::Parser;
use ffmpeg_common::FfmpegIo;
use inference_common::batch::{self, FailurePolicy};
use inference_common::config::PipelineConfig;
use inference_common::imgsz::InferenceSize;
use ort_common::{normalize_device, YoloDetectorFactory};
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
#[command(about = "Detect and annotate people in video files")]
pub struct Args {
    /// Video file, or directory whose .mp4/.mov/.avi/.mkv files are processed in name order.
    #[arg(long, short, default_value = "assets")]
    input: PathBuf,
    /// Output directory, or output file when the input is a single video.
    #[arg(long, short, default_value = "outputs")]
    output: PathBuf,
    /// Yolov8 onnx model file to use.
    #[arg(long, short, default_value = "_models/yolov8n.onnx")]
    model: String,
    /// Minimum detection confidence, 0..=1.
    #[arg(long, default_value_t = 0.25)]
    conf: f32,
    /// Inference size as `N` or `H,W`; defaults to each video's native size.
    /// Rounded up to a multiple of 32 either way.
    #[arg(long)]
    imgsz: Option<InferenceSize>,
    /// `auto`, `cpu`, `cuda` or `cuda:N`.
    #[arg(long, default_value = "auto")]
    device: String,
    /// Model class to detect.
    #[arg(long, default_value = "person")]
    target_class: String,
    /// What to do when one video of a batch fails: `abort` or `continue`.
    #[arg(long, default_value = "abort")]
    on_error: FailurePolicy,
    /// Hide the per-video progress bar.
    #[arg(long, short, action, default_value = "false")]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "warn,ffmpeg_ort=info,inference_common=info,ort_common=info,ffmpeg_common=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    ensure!(
        (0.0..=1.0).contains(&args.conf),
        "--conf must be within 0..=1, got {}",
        args.conf
    );

    let config = PipelineConfig {
        model: args.model,
        target_class: args.target_class,
        confidence_threshold: args.conf,
        inference_size: args.imgsz,
        device: normalize_device(&args.device),
        failure_policy: args.on_error,
        show_progress: !args.quiet,
    };
    log::info!(
        "Detecting {:?} with {} on {} (conf {}, on error: {})",
        config.target_class,
        config.model,
        config.device,
        config.confidence_threshold,
        config.failure_policy,
    );

    let io = FfmpegIo::new()?;
    let factory = YoloDetectorFactory::new();

    let _span = tracing::info_span!("batch", input = %args.input.display()).entered();
    let report = batch::run(&io, &factory, &args.input, &args.output, &config)?;
    log::info!(
        "Processed {} videos. Metrics: {:?}{}",
        report.outcome.metrics.len(),
        report.files.json,
        report
            .files
            .csv
            .as_ref()
            .map(|csv| format!(", {csv:?}"))
            .unwrap_or_default(),
    );
    Ok(())
}
