//! Per-video metrics and their batch export to `metrics.json` / `metrics.csv`.
//!
//! Floats are rounded to two decimals only when an [`ExportRecord`] is built; the
//! in-memory [`VideoMetrics`] keep full precision.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::imgsz::InferenceSize;

pub const METRICS_JSON: &str = "metrics.json";
pub const METRICS_CSV: &str = "metrics.csv";

/// Exported column names, in [`VideoMetrics`] field order.
pub const FIELDS: [&str; 11] = [
    "input_path",
    "output_path",
    "frames",
    "total_detections",
    "avg_detections_per_frame",
    "processing_fps",
    "duration_seconds",
    "model",
    "conf",
    "imgsz",
    "device",
];

/// Summary of one fully processed video. Built once, when the run finalizes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMetrics {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(rename = "frames")]
    pub frame_count: u64,
    pub total_detections: u64,
    pub avg_detections_per_frame: f64,
    pub processing_fps: f64,
    pub duration_seconds: f64,
    #[serde(rename = "model")]
    pub model_identifier: String,
    #[serde(rename = "conf")]
    pub confidence_threshold: f64,
    #[serde(rename = "imgsz")]
    pub inference_size: InferenceSize,
    pub device: String,
}

/// Counters accumulated while streaming one video.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub total_detections: u64,
    pub duration: Duration,
}

impl VideoMetrics {
    pub fn from_run(
        input_path: &Path,
        output_path: &Path,
        summary: RunSummary,
        config: &PipelineConfig,
        inference_size: InferenceSize,
    ) -> Self {
        let duration_seconds = summary.duration.as_secs_f64();
        Self {
            input_path: input_path.to_path_buf(),
            output_path: output_path.to_path_buf(),
            frame_count: summary.frames,
            total_detections: summary.total_detections,
            avg_detections_per_frame: average_detections(summary.total_detections, summary.frames),
            processing_fps: processing_fps(summary.frames, duration_seconds),
            duration_seconds,
            model_identifier: config.model.clone(),
            confidence_threshold: f64::from(config.confidence_threshold),
            inference_size,
            device: config.device.clone(),
        }
    }
}

/// 0 when no frames were processed.
pub fn average_detections(total_detections: u64, frames: u64) -> f64 {
    if frames == 0 {
        0.0
    } else {
        total_detections as f64 / frames as f64
    }
}

/// 0 when no time elapsed.
pub fn processing_fps(frames: u64, duration_seconds: f64) -> f64 {
    if duration_seconds > 0.0 {
        frames as f64 / duration_seconds
    } else {
        0.0
    }
}

/// Rounds to two decimal places, for export only. Exact ties go to the even
/// neighbour, so `0.125` becomes `0.12`.
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    (value * 100.0).round_ties_even() / 100.0
}

/// Export view of [`VideoMetrics`] with every float rounded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRecord<'a> {
    pub input_path: &'a Path,
    pub output_path: &'a Path,
    pub frames: u64,
    pub total_detections: u64,
    pub avg_detections_per_frame: f64,
    pub processing_fps: f64,
    pub duration_seconds: f64,
    pub model: &'a str,
    pub conf: f64,
    pub imgsz: InferenceSize,
    pub device: &'a str,
}

impl<'a> From<&'a VideoMetrics> for ExportRecord<'a> {
    fn from(m: &'a VideoMetrics) -> Self {
        Self {
            input_path: &m.input_path,
            output_path: &m.output_path,
            frames: m.frame_count,
            total_detections: m.total_detections,
            avg_detections_per_frame: round2(m.avg_detections_per_frame),
            processing_fps: round2(m.processing_fps),
            duration_seconds: round2(m.duration_seconds),
            model: &m.model_identifier,
            conf: round2(m.confidence_threshold),
            imgsz: m.inference_size,
            device: &m.device,
        }
    }
}

impl ExportRecord<'_> {
    /// CSV cells in [`FIELDS`] order. Numbers and `imgsz` use their JSON text so both
    /// exports carry identical values.
    pub fn csv_row(&self) -> anyhow::Result<[String; 11]> {
        Ok([
            path_cell(self.input_path)?,
            path_cell(self.output_path)?,
            self.frames.to_string(),
            self.total_detections.to_string(),
            serde_json::to_string(&self.avg_detections_per_frame)?,
            serde_json::to_string(&self.processing_fps)?,
            serde_json::to_string(&self.duration_seconds)?,
            self.model.to_string(),
            serde_json::to_string(&self.conf)?,
            serde_json::to_string(&self.imgsz)?,
            self.device.to_string(),
        ])
    }
}

fn path_cell(path: &Path) -> anyhow::Result<String> {
    path.to_str()
        .map(str::to_string)
        .with_context(|| format!("path is not valid UTF-8: {path:?}"))
}

pub fn export_records(metrics: &[VideoMetrics]) -> Vec<ExportRecord<'_>> {
    metrics.iter().map(ExportRecord::from).collect()
}

/// JSON array of export records, 2-space indented, non-ASCII kept verbatim.
pub fn to_json_string(metrics: &[VideoMetrics]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&export_records(metrics))?)
}

/// CSV with a header row, or `None` for an empty batch.
pub fn to_csv_string(metrics: &[VideoMetrics]) -> anyhow::Result<Option<String>> {
    if metrics.is_empty() {
        return Ok(None);
    }
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_csv_rows(&mut writer, metrics)?;
    let bytes = writer.into_inner().context("failed to flush csv buffer")?;
    Ok(Some(String::from_utf8(bytes)?))
}

fn write_csv_rows<W: Write>(writer: &mut csv::Writer<W>, metrics: &[VideoMetrics]) -> anyhow::Result<()> {
    writer.write_record(FIELDS)?;
    for record in export_records(metrics) {
        writer.write_record(record.csv_row()?)?;
    }
    writer.flush()?;
    Ok(())
}

/// Where a batch's metrics landed. `csv` is `None` for an empty batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsFiles {
    pub json: PathBuf,
    pub csv: Option<PathBuf>,
}

/// Writes `metrics.json` (always) and `metrics.csv` (non-empty batches) into `dir`.
/// An empty batch also removes any `metrics.csv` already in `dir`.
pub fn write_metrics_files(metrics: &[VideoMetrics], dir: &Path) -> anyhow::Result<MetricsFiles> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create metrics directory {dir:?}"))?;

    let json_path = dir.join(METRICS_JSON);
    let file = File::create(&json_path)
        .with_context(|| format!("failed to create {json_path:?}"))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &export_records(metrics))
        .with_context(|| format!("failed to write {json_path:?}"))?;
    writer.flush()?;
    log::info!("Wrote metrics for {} videos: {json_path:?}", metrics.len());

    let csv_path = dir.join(METRICS_CSV);
    if metrics.is_empty() {
        // Stale table from an earlier run.
        match fs::remove_file(&csv_path) {
            Ok(()) => log::info!("Removed stale {csv_path:?}"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("failed to remove stale {csv_path:?}"));
            }
        }
        return Ok(MetricsFiles {
            json: json_path,
            csv: None,
        });
    }

    let mut writer = csv::Writer::from_path(&csv_path)
        .with_context(|| format!("failed to create {csv_path:?}"))?;
    write_csv_rows(&mut writer, metrics).with_context(|| format!("failed to write {csv_path:?}"))?;
    log::info!("Wrote metrics table: {csv_path:?}");

    Ok(MetricsFiles {
        json: json_path,
        csv: Some(csv_path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig {
            model: "yolov8n.onnx".to_string(),
            confidence_threshold: 0.3,
            device: "cpu".to_string(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn averages_guard_against_zero_frames() {
        assert_eq!(average_detections(0, 0), 0.0);
        assert_eq!(average_detections(7, 0), 0.0);
        assert_eq!(average_detections(7, 2), 3.5);
    }

    #[test]
    fn fps_guards_against_zero_duration() {
        assert_eq!(processing_fps(10, 0.0), 0.0);
        assert_eq!(processing_fps(10, 2.0), 5.0);
    }

    #[test]
    fn round2_sends_exact_ties_to_even() {
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.625), 0.62);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(3.14159), 3.14);
        assert_eq!(round2(2.675_000_1), 2.68);
        assert_eq!(round2(-1.005_1), -1.01);
        assert_eq!(round2(10.0), 10.0);
        assert!(round2(f64::NAN).is_nan());
    }

    fn sample() -> VideoMetrics {
        VideoMetrics::from_run(
            Path::new("in.mp4"),
            Path::new("out/in.mp4"),
            RunSummary {
                frames: 4,
                total_detections: 2,
                duration: Duration::from_secs(1),
            },
            &config(),
            InferenceSize::HeightWidth(384, 640),
        )
    }

    #[test]
    fn header_matches_serialized_record_keys() {
        let metrics = sample();
        let record = ExportRecord::from(&metrics);

        let value = serde_json::to_value(&record).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        let mut fields: Vec<_> = FIELDS.iter().map(|f| f.to_string()).collect();
        keys.sort();
        fields.sort();
        assert_eq!(keys, fields);

        let json = serde_json::to_string(&record).unwrap();
        let positions: Vec<_> = FIELDS
            .iter()
            .map(|f| json.find(&format!("\"{f}\":")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{json}");
    }

    #[test]
    fn empty_batch_removes_stale_csv() {
        let dir = tempfile::tempdir().unwrap();
        write_metrics_files(&[sample()], dir.path()).unwrap();
        assert!(dir.path().join(METRICS_CSV).exists());

        let files = write_metrics_files(&[], dir.path()).unwrap();
        assert_eq!(files.csv, None);
        assert!(!dir.path().join(METRICS_CSV).exists());
        assert_eq!(fs::read_to_string(&files.json).unwrap(), "[]");
    }

    #[test]
    fn from_run_keeps_full_precision() {
        let summary = RunSummary {
            frames: 3,
            total_detections: 1,
            duration: Duration::from_millis(700),
        };
        let m = VideoMetrics::from_run(
            Path::new("in.mp4"),
            Path::new("out/in.mp4"),
            summary,
            &config(),
            InferenceSize::Square(640),
        );
        assert_eq!(m.avg_detections_per_frame, 1.0 / 3.0);
        assert_eq!(m.processing_fps, 3.0 / 0.7);
        assert_eq!(m.confidence_threshold, f64::from(0.3f32));

        let export = ExportRecord::from(&m);
        assert_eq!(export.avg_detections_per_frame, 0.33);
        assert_eq!(export.processing_fps, 4.29);
        assert_eq!(export.duration_seconds, 0.7);
        assert_eq!(export.conf, 0.3);
        // Rounding never feeds back into the record.
        assert_eq!(m.avg_detections_per_frame, 1.0 / 3.0);
    }

    #[test]
    fn empty_batch_exports_empty_json_and_no_csv() {
        assert_eq!(to_json_string(&[]).unwrap(), "[]");
        assert_eq!(to_csv_string(&[]).unwrap(), None);
    }
}
