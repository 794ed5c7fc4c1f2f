//! In-memory media and detector backends for driving the pipeline without ffmpeg or a model.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::bail;
use image::{Rgb, RgbImage};
use inference_common::bbox::{Bbox, Detection};
use inference_common::config::PipelineConfig;
use inference_common::detector::{Detector, DetectorFactory, DetectorParams};
use inference_common::media::{FrameSink, FrameSource, VideoIo};
use inference_common::video_meta::VideoMetadata;
use inference_common::PipelineError;

/// Script for one fake video, keyed by file name.
#[derive(Debug, Clone)]
pub struct FakeVideo {
    pub metadata: VideoMetadata,
    pub frames: u64,
    /// Frame index whose read fails.
    pub fail_read_at: Option<u64>,
}

impl FakeVideo {
    pub fn new(width: u32, height: u32, frames: u64) -> Self {
        Self {
            metadata: VideoMetadata::new(width, height, 25.0, frames),
            frames,
            fail_read_at: None,
        }
    }

    pub fn failing_at(mut self, frame: u64) -> Self {
        self.fail_read_at = Some(frame);
        self
    }
}

/// What the fakes observed, shared between the backend and the test.
#[derive(Debug, Default)]
pub struct Events {
    pub opened_sources: Vec<PathBuf>,
    pub released_sources: usize,
    pub opened_sinks: Vec<PathBuf>,
    pub released_sinks: usize,
    pub finished_sinks: usize,
    pub frames_written: u64,
}

#[derive(Debug, Default)]
pub struct FakeIo {
    videos: HashMap<String, FakeVideo>,
    /// Sinks create their file, then fail before the header is written.
    broken_writer: bool,
    pub events: Rc<RefCell<Events>>,
}

impl FakeIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, file_name: &str, video: FakeVideo) -> Self {
        self.videos.insert(file_name.to_string(), video);
        self
    }

    pub fn with_broken_writer(mut self) -> Self {
        self.broken_writer = true;
        self
    }

    pub fn events(&self) -> std::cell::Ref<'_, Events> {
        self.events.borrow()
    }
}

pub struct FakeSource {
    metadata: VideoMetadata,
    remaining: u64,
    next_index: u64,
    fail_read_at: Option<u64>,
    events: Rc<RefCell<Events>>,
}

impl FrameSource for FakeSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn read_next(&mut self) -> anyhow::Result<Option<RgbImage>> {
        if self.fail_read_at == Some(self.next_index) {
            bail!("corrupt packet at frame {}", self.next_index);
        }
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        self.next_index += 1;
        Ok(Some(RgbImage::from_pixel(
            self.metadata.width,
            self.metadata.height,
            Rgb([90, 90, 90]),
        )))
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.events.borrow_mut().released_sources += 1;
    }
}

/// Writes one byte per frame so the output file visibly grows.
pub struct FakeSink {
    file: File,
    events: Rc<RefCell<Events>>,
}

impl FrameSink for FakeSink {
    fn write(&mut self, _frame: &RgbImage) -> anyhow::Result<()> {
        self.file.write_all(b"f")?;
        self.events.borrow_mut().frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.file.flush()?;
        self.events.borrow_mut().finished_sinks += 1;
        Ok(())
    }
}

impl Drop for FakeSink {
    fn drop(&mut self) {
        self.events.borrow_mut().released_sinks += 1;
    }
}

impl VideoIo for FakeIo {
    type Source = FakeSource;
    type Sink = FakeSink;

    fn open_source(&self, path: &Path) -> anyhow::Result<FakeSource> {
        if !path.exists() {
            return Err(PipelineError::InputNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(video) = self.videos.get(&name) else {
            return Err(PipelineError::UnopenableSource {
                path: path.to_path_buf(),
                reason: "unknown container".to_string(),
            }
            .into());
        };
        video.metadata.validate(path)?;
        self.events.borrow_mut().opened_sources.push(path.to_path_buf());
        Ok(FakeSource {
            metadata: video.metadata,
            remaining: video.frames,
            next_index: 0,
            fail_read_at: video.fail_read_at,
            events: Rc::clone(&self.events),
        })
    }

    fn open_sink(&self, path: &Path, _metadata: &VideoMetadata) -> anyhow::Result<FakeSink> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path).map_err(|err| PipelineError::UnopenableSink {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        if self.broken_writer {
            drop(file);
            return Err(PipelineError::UnopenableSink {
                path: path.to_path_buf(),
                reason: "write_header failed".to_string(),
            }
            .into());
        }
        self.events.borrow_mut().opened_sinks.push(path.to_path_buf());
        Ok(FakeSink {
            file,
            events: Rc::clone(&self.events),
        })
    }
}

/// Emits `per_frame` identical boxes on every frame.
pub struct FakeDetector {
    per_frame: usize,
    label: String,
}

impl Detector for FakeDetector {
    fn detect(&mut self, _frame: &RgbImage) -> anyhow::Result<Vec<Detection>> {
        Ok((0..self.per_frame)
            .map(|i| {
                let x = 2.0 + 6.0 * i as f32;
                Detection::new(Bbox::new(x, 10.0, x + 20.0, 40.0), 0.87, self.label.clone())
            })
            .collect())
    }
}

pub struct FakeFactory {
    classes: Vec<String>,
    per_frame: usize,
    pub seen: RefCell<Vec<DetectorParams>>,
}

impl FakeFactory {
    pub fn new(per_frame: usize) -> Self {
        Self::with_classes(&["person", "car"], per_frame)
    }

    pub fn with_classes(classes: &[&str], per_frame: usize) -> Self {
        Self {
            classes: classes.iter().map(|c| c.to_string()).collect(),
            per_frame,
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl DetectorFactory for FakeFactory {
    type Detector = FakeDetector;

    fn create(&self, params: &DetectorParams) -> anyhow::Result<FakeDetector> {
        self.seen.borrow_mut().push(params.clone());
        if !self.classes.contains(&params.target_class) {
            return Err(PipelineError::NoMatchingTargetClass {
                model: params.model.clone(),
                class: params.target_class.clone(),
            }
            .into());
        }
        Ok(FakeDetector {
            per_frame: self.per_frame,
            label: params.target_class.clone(),
        })
    }
}

pub fn quiet_config() -> PipelineConfig {
    PipelineConfig {
        model: "fake-yolo".to_string(),
        show_progress: false,
        ..PipelineConfig::default()
    }
}

/// Creates empty placeholder files so directory listing finds them.
pub fn touch(dir: &Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name), b"").unwrap();
    }
}
