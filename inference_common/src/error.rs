use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::RunPhase;

/// Failure kinds surfaced by the frame pipeline and batch driver.
///
/// None of these are retried: detection backends and codecs are deterministic for the
/// same input.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input video not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("failed to open video {}: {reason}", path.display())]
    UnopenableSource { path: PathBuf, reason: String },

    #[error("failed to create video writer for {}: {reason}", path.display())]
    UnopenableSink { path: PathBuf, reason: String },

    #[error("the loaded model {model} does not contain a '{class}' class")]
    NoMatchingTargetClass { model: String, class: String },

    #[error("no videos with extensions {extensions:?} found in {}", dir.display())]
    EmptyBatch {
        dir: PathBuf,
        extensions: Vec<&'static str>,
    },

    #[error("invalid run transition for {}: {from:?} -> {to:?}", path.display())]
    InvalidTransition {
        path: PathBuf,
        from: RunPhase,
        to: RunPhase,
    },

    #[error("{failed} of {total} videos failed in {}", dir.display())]
    BatchFailed {
        dir: PathBuf,
        failed: usize,
        total: usize,
    },
}
