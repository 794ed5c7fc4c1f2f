//! Batch driver: one run per video, then a single metrics export.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

pub use crate::config::FailurePolicy;
use crate::config::PipelineConfig;
use crate::detector::DetectorFactory;
use crate::draw::Annotator;
use crate::error::PipelineError;
use crate::media::VideoIo;
use crate::metrics::{write_metrics_files, MetricsFiles, VideoMetrics};
use crate::pipeline::process_video;

/// Recognized video file extensions, compared case-insensitively.
pub const VIDEO_EXTENSIONS: [&str; 4] = ["avi", "mkv", "mov", "mp4"];

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Top-level video files of `dir`, ordered by file name.
pub fn list_videos(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| format!("failed to list {dir:?}"))?;
    let mut videos = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {dir:?}"))?;
        let path = entry.path();
        if path.is_file() && is_video_file(&path) {
            videos.push(path);
        }
    }
    videos.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(videos)
}

/// A video that failed while the batch kept going.
#[derive(Debug)]
pub struct VideoFailure {
    pub input: PathBuf,
    pub error: anyhow::Error,
}

/// Metrics of completed videos, in processing order, plus isolated failures.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub metrics: Vec<VideoMetrics>,
    pub failures: Vec<VideoFailure>,
}

impl BatchOutcome {
    pub fn attempted(&self) -> usize {
        self.metrics.len() + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Processes every video of `input_dir` into `output_dir` under the same file name.
///
/// Fails with [`PipelineError::EmptyBatch`] before touching the filesystem when the
/// directory holds no videos. Under [`FailurePolicy::Abort`] the first failing video
/// stops the batch; under [`FailurePolicy::Continue`] it is recorded and skipped.
pub fn process_directory<Io, F>(
    io: &Io,
    factory: &F,
    annotator: &Annotator,
    input_dir: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
) -> anyhow::Result<BatchOutcome>
where
    Io: VideoIo,
    F: DetectorFactory,
{
    let videos = list_videos(input_dir)?;
    if videos.is_empty() {
        return Err(PipelineError::EmptyBatch {
            dir: input_dir.to_path_buf(),
            extensions: VIDEO_EXTENSIONS.to_vec(),
        }
        .into());
    }
    log::info!("Found {} videos in {input_dir:?}", videos.len());
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {output_dir:?}"))?;

    let mut outcome = BatchOutcome::default();
    for (idx, input) in videos.iter().enumerate() {
        log::info!("[{}/{}] {input:?}", idx + 1, videos.len());
        // list_videos only yields paths with a file name
        let Some(file_name) = input.file_name() else {
            continue;
        };
        let output = output_dir.join(file_name);
        match process_video(io, factory, annotator, input, &output, config) {
            Ok(metrics) => outcome.metrics.push(metrics),
            Err(err) => match config.failure_policy {
                FailurePolicy::Abort => {
                    return Err(err.context(format!("batch aborted at {input:?}")));
                }
                FailurePolicy::Continue => {
                    log::error!("Skipping {input:?}: {err:#}");
                    outcome.failures.push(VideoFailure {
                        input: input.clone(),
                        error: err,
                    });
                }
            },
        }
    }
    Ok(outcome)
}

/// Output video path for single-file mode.
///
/// An existing directory, or a path without extension, receives the input's file name;
/// anything else is taken verbatim.
pub fn resolve_single_output(input: &Path, output: &Path) -> PathBuf {
    if output.is_dir() || output.extension().is_none() {
        match input.file_name() {
            Some(name) => output.join(name),
            None => output.join("output.mp4"),
        }
    } else {
        output.to_path_buf()
    }
}

/// Directory receiving the videos and metrics of a directory batch.
pub fn resolve_output_dir(output: &Path) -> PathBuf {
    if output.extension().is_some() && !output.is_dir() {
        parent_or_cwd(output)
    } else {
        output.to_path_buf()
    }
}

fn parent_or_cwd(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Everything a finished batch produced.
#[derive(Debug)]
pub struct BatchReport {
    pub outcome: BatchOutcome,
    pub files: MetricsFiles,
}

/// Processes `input` (a single video or a directory of videos) and exports the metrics.
///
/// Metrics are written next to the output videos. With [`FailurePolicy::Continue`], a
/// batch that lost videos still exports the completed ones and then fails with
/// [`PipelineError::BatchFailed`].
pub fn run<Io, F>(
    io: &Io,
    factory: &F,
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> anyhow::Result<BatchReport>
where
    Io: VideoIo,
    F: DetectorFactory,
{
    if !input.exists() {
        return Err(PipelineError::InputNotFound {
            path: input.to_path_buf(),
        }
        .into());
    }
    let annotator = Annotator::new()?;

    let (outcome, metrics_dir) = if input.is_dir() {
        let output_dir = resolve_output_dir(output);
        let outcome = process_directory(io, factory, &annotator, input, &output_dir, config)?;
        (outcome, output_dir)
    } else {
        let output_path = resolve_single_output(input, output);
        let metrics_dir = parent_or_cwd(&output_path);
        let metrics = process_video(io, factory, &annotator, input, &output_path, config)?;
        let outcome = BatchOutcome {
            metrics: vec![metrics],
            failures: Vec::new(),
        };
        (outcome, metrics_dir)
    };

    let files = write_metrics_files(&outcome.metrics, &metrics_dir)?;
    if !outcome.is_success() {
        return Err(PipelineError::BatchFailed {
            dir: input.to_path_buf(),
            failed: outcome.failures.len(),
            total: outcome.attempted(),
        }
        .into());
    }
    log::info!(
        "Processed {} videos, metrics in {:?}",
        outcome.metrics.len(),
        files.json
    );
    Ok(BatchReport { outcome, files })
}
