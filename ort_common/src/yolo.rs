//! YOLOv8 detector backed by an ONNX Runtime session.

use std::cmp::Ordering;

use anyhow::{Context, bail};
use image::RgbImage;
use inference_common::PipelineError;
use inference_common::bbox::{Bbox, Detection};
use inference_common::detector::{Detector, DetectorFactory, DetectorParams};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;

use crate::classes::{coco_names, find_class, parse_class_names};
use crate::device::Device;
use crate::preprocess::{letterbox, to_nchw};

/// Overlap above which the weaker of two boxes is suppressed.
pub const IOU_THRESHOLD: f32 = 0.7;
/// Upper bound on detections kept per frame.
pub const MAX_DETECTIONS: usize = 300;

/// A box in model input space, before it is mapped back to the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub bbox: Bbox,
    pub score: f32,
}

/// Builds one [`YoloDetector`] per video.
#[derive(Debug, Default, Clone, Copy)]
pub struct YoloDetectorFactory;

impl YoloDetectorFactory {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorFactory for YoloDetectorFactory {
    type Detector = YoloDetector;

    fn create(&self, params: &DetectorParams) -> anyhow::Result<YoloDetector> {
        let device = Device::parse(&params.device)?;
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers([device.execution_provider()])?
            .commit_from_file(&params.model)
            .with_context(|| format!("failed to load model {:?} on {}", params.model, params.device))?;
        log::debug!("{session:?}");

        let names = match session.metadata()?.custom("names")? {
            Some(raw) => parse_class_names(&raw)
                .with_context(|| format!("failed to read class names of {:?}", params.model))?,
            None => {
                log::warn!("{:?} has no class names metadata, assuming COCO labels", params.model);
                coco_names()
            }
        };
        let class_index = find_class(&names, &params.target_class).ok_or_else(|| {
            PipelineError::NoMatchingTargetClass {
                model: params.model.clone(),
                class: params.target_class.clone(),
            }
        })?;

        let requested = params.inference_size.height_width();
        let input_hw = match model_input_hw(&session) {
            Some(fixed) if fixed != requested => {
                log::warn!(
                    "{:?} has a fixed input of {}x{}, ignoring requested {}",
                    params.model,
                    fixed.0,
                    fixed.1,
                    params.inference_size,
                );
                fixed
            }
            Some(fixed) => fixed,
            None => requested,
        };

        log::info!(
            "Prepared ort {:?} session with model {:?}, class {:?} (#{class_index}), input {}x{}",
            device,
            params.model,
            names[class_index],
            input_hw.0,
            input_hw.1,
        );

        Ok(YoloDetector {
            session,
            class_index,
            class_label: names[class_index].clone(),
            confidence_threshold: params.confidence_threshold,
            input_hw,
        })
    }
}

/// Static `(height, width)` of an `[N, C, H, W]` model input, if it has one.
fn model_input_hw(session: &Session) -> Option<(u32, u32)> {
    let dims: &[i64] = session.inputs.first()?.input_type.tensor_shape()?;
    match *dims {
        [_, _, h, w] if h > 0 && w > 0 => Some((u32::try_from(h).ok()?, u32::try_from(w).ok()?)),
        _ => None,
    }
}

pub struct YoloDetector {
    session: Session,
    class_index: usize,
    class_label: String,
    confidence_threshold: f32,
    /// `(height, width)` fed to the model.
    input_hw: (u32, u32),
}

impl Detector for YoloDetector {
    fn detect(&mut self, frame: &RgbImage) -> anyhow::Result<Vec<Detection>> {
        let (height, width) = self.input_hw;
        let (canvas, lb) = letterbox(frame, height, width);
        let input = to_nchw(&canvas);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(&input)?])
            .context("YOLOv8 inference failed")?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("failed to extract YOLOv8 output tensor")?;
        let candidates =
            decode_predictions(shape, data, self.class_index, self.confidence_threshold)?;
        drop(outputs);

        let detections = non_max_suppression(candidates, IOU_THRESHOLD)
            .into_iter()
            .filter_map(|c| {
                let bbox = lb.restore(c.bbox);
                (bbox.width() > 0.0 && bbox.height() > 0.0)
                    .then(|| Detection::new(bbox, c.score, self.class_label.as_str()))
            })
            .collect();
        Ok(detections)
    }
}

/// Decodes a `[1, 4 + classes, anchors]` YOLOv8 output into candidates of one class.
///
/// An anchor counts only when `class_index` is its best-scoring class and the score
/// reaches `threshold`.
pub fn decode_predictions(
    dims: &[i64],
    data: &[f32],
    class_index: usize,
    threshold: f32,
) -> anyhow::Result<Vec<Candidate>> {
    let [1, rows, anchors] = *dims else {
        bail!("unexpected YOLOv8 output shape {dims:?}");
    };
    let (Ok(rows), Ok(anchors)) = (usize::try_from(rows), usize::try_from(anchors)) else {
        bail!("unexpected YOLOv8 output shape {dims:?}");
    };
    if rows <= 4 + class_index || rows.checked_mul(anchors) != Some(data.len()) {
        bail!(
            "YOLOv8 output shape {dims:?} does not cover class #{class_index} ({} values)",
            data.len()
        );
    }
    let at = |row: usize, anchor: usize| data[row * anchors + anchor];

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let score = at(4 + class_index, anchor);
        if score < threshold {
            continue;
        }
        let beaten = (4..rows).any(|row| row != 4 + class_index && at(row, anchor) > score);
        if beaten {
            continue;
        }
        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        candidates.push(Candidate {
            bbox: Bbox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
            score,
        });
    }
    Ok(candidates)
}

/// Greedy NMS: keeps the highest-scoring boxes, dropping any that overlap a kept box by
/// more than `iou_threshold`.
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() == MAX_DETECTIONS {
            break;
        }
        if kept.iter().all(|k| k.bbox.iou(&candidate.bbox) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lays anchors out row-major as the exporter does: `[cx.., cy.., w.., h.., cls0.., ..]`.
    fn output(anchors: &[[f32; 6]]) -> (Vec<i64>, Vec<f32>) {
        let n = anchors.len();
        let mut data = vec![0.0; 6 * n];
        for (i, anchor) in anchors.iter().enumerate() {
            for (row, value) in anchor.iter().enumerate() {
                data[row * n + i] = *value;
            }
        }
        (vec![1, 6, n as i64], data)
    }

    #[test]
    fn decodes_center_boxes_of_the_target_class() {
        let (dims, data) = output(&[
            [50.0, 40.0, 20.0, 10.0, 0.9, 0.1],
            [10.0, 10.0, 4.0, 4.0, 0.2, 0.1],
            [80.0, 80.0, 10.0, 10.0, 0.5, 0.8],
        ]);
        let candidates = decode_predictions(&dims, &data, 0, 0.25).unwrap();
        assert_eq!(
            candidates,
            [Candidate {
                bbox: Bbox::new(40.0, 35.0, 60.0, 45.0),
                score: 0.9,
            }]
        );
    }

    #[test]
    fn other_class_index_is_selectable() {
        let (dims, data) = output(&[[80.0, 80.0, 10.0, 10.0, 0.5, 0.8]]);
        let candidates = decode_predictions(&dims, &data, 1, 0.25).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].score, 0.8);
    }

    #[test]
    fn threshold_is_inclusive() {
        let (dims, data) = output(&[[5.0, 5.0, 2.0, 2.0, 0.25, 0.0]]);
        assert_eq!(decode_predictions(&dims, &data, 0, 0.25).unwrap().len(), 1);
        assert!(decode_predictions(&dims, &data, 0, 0.26).unwrap().is_empty());
    }

    #[test]
    fn rejects_unexpected_shapes() {
        assert!(decode_predictions(&[1, 6], &[0.0; 6], 0, 0.5).is_err());
        assert!(decode_predictions(&[1, 6, 2], &[0.0; 6], 0, 0.5).is_err());
        assert!(decode_predictions(&[1, 5, 1], &[0.0; 5], 1, 0.5).is_err());
    }

    #[test]
    fn nms_keeps_best_of_overlapping_boxes() {
        let candidates = vec![
            Candidate {
                bbox: Bbox::new(0.0, 0.0, 10.0, 10.0),
                score: 0.6,
            },
            Candidate {
                bbox: Bbox::new(0.5, 0.5, 10.5, 10.5),
                score: 0.9,
            },
            Candidate {
                bbox: Bbox::new(50.0, 50.0, 60.0, 60.0),
                score: 0.3,
            },
        ];
        let kept = non_max_suppression(candidates, IOU_THRESHOLD);
        let scores: Vec<_> = kept.iter().map(|c| c.score).collect();
        assert_eq!(scores, [0.9, 0.3]);
    }

    #[test]
    fn nms_keeps_partially_overlapping_boxes() {
        let candidates = vec![
            Candidate {
                bbox: Bbox::new(0.0, 0.0, 10.0, 10.0),
                score: 0.8,
            },
            Candidate {
                bbox: Bbox::new(5.0, 0.0, 15.0, 10.0),
                score: 0.7,
            },
        ];
        assert_eq!(non_max_suppression(candidates, IOU_THRESHOLD).len(), 2);
    }
}
