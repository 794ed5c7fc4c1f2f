use image::RgbImage;

use crate::bbox::Detection;
use crate::imgsz::InferenceSize;

/// Everything a backend needs to build a detector for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorParams {
    /// Model identifier, usually a path to the weights.
    pub model: String,
    pub target_class: String,
    pub confidence_threshold: f32,
    /// Already aligned to the backend stride.
    pub inference_size: InferenceSize,
    /// Normalized device selector, e.g. `cpu` or `cuda:0`.
    pub device: String,
}

/// Finds instances of a single target class on a frame.
pub trait Detector {
    /// Detections of the target class scoring at least the confidence threshold.
    /// Returns an empty list, never an error, when nothing clears the threshold.
    fn detect(&mut self, frame: &RgbImage) -> anyhow::Result<Vec<Detection>>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, frame: &RgbImage) -> anyhow::Result<Vec<Detection>> {
        (**self).detect(frame)
    }
}

/// Builds detectors; fails with
/// [`PipelineError::NoMatchingTargetClass`](crate::PipelineError::NoMatchingTargetClass)
/// when the model has no class named `params.target_class`.
pub trait DetectorFactory {
    type Detector: Detector;

    fn create(&self, params: &DetectorParams) -> anyhow::Result<Self::Detector>;
}
