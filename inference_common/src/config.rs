use std::fmt;
use std::str::FromStr;

use anyhow::bail;

use crate::detector::DetectorParams;
use crate::imgsz::InferenceSize;

/// What a batch does when one of its videos fails.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Propagate the first failure and skip the remaining videos.
    #[default]
    Abort,
    /// Log the failure, keep going, and export metrics for completed videos.
    Continue,
}

impl FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => bail!("unknown failure policy {other:?}, expected `abort` or `continue`"),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.write_str("abort"),
            Self::Continue => f.write_str("continue"),
        }
    }
}

/// Settings shared by every video of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub model: String,
    pub target_class: String,
    pub confidence_threshold: f32,
    /// Explicit inference size; the video's native size when `None`.
    pub inference_size: Option<InferenceSize>,
    /// Normalized device selector recorded in the metrics.
    pub device: String,
    pub failure_policy: FailurePolicy,
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: "_models/yolov8n.onnx".to_string(),
            target_class: "person".to_string(),
            confidence_threshold: 0.25,
            inference_size: None,
            device: "cpu".to_string(),
            failure_policy: FailurePolicy::default(),
            show_progress: true,
        }
    }
}

impl PipelineConfig {
    pub fn detector_params(&self, inference_size: InferenceSize) -> DetectorParams {
        DetectorParams {
            model: self.model.clone(),
            target_class: self.target_class.clone(),
            confidence_threshold: self.confidence_threshold,
            inference_size,
            device: self.device.clone(),
        }
    }
}
