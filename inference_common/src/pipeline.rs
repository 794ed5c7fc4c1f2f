//! Per-video frame loop: read, detect, annotate, write, strictly in presentation order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;

use crate::config::PipelineConfig;
use crate::detector::{Detector, DetectorFactory};
use crate::draw::Annotator;
use crate::error::PipelineError;
use crate::frame_times::{AggregatedTimes, FrameTimes};
use crate::imgsz::effective_inference_size;
use crate::media::{FrameSink, FrameSource, VideoIo};
use crate::metrics::{RunSummary, VideoMetrics};
use crate::progress::FrameProgress;

/// Lifecycle of one video run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Source and sink are open, no frame read yet.
    Opened,
    Streaming,
    /// Sink finished; metrics can be built.
    Finalized,
    Failed,
}

impl RunPhase {
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (RunPhase::Opened, RunPhase::Streaming)
                | (RunPhase::Streaming, RunPhase::Finalized)
                | (RunPhase::Opened | RunPhase::Streaming, RunPhase::Failed)
        )
    }
}

/// Removes a partially written output file unless the run committed it.
///
/// Create it before the sink opens: backends may leave a file behind even when opening
/// fails halfway.
#[derive(Debug)]
pub struct OutputGuard {
    path: PathBuf,
    committed: bool,
}

impl OutputGuard {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            committed: false,
        }
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => log::warn!("Removed partial output {:?}", self.path),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("Failed to remove partial output {:?}: {err}", self.path),
        }
    }
}

/// One video moving through the frame loop.
///
/// Owns the opened source and sink; both are released when the run is dropped, whatever
/// phase it ended in. The sink is declared before the output guard so the file handle is
/// closed before a failed run deletes the file.
pub struct VideoRun<S, K, D> {
    input: PathBuf,
    phase: RunPhase,
    source: S,
    sink: K,
    output: OutputGuard,
    detector: D,
    frame_index: u64,
    total_detections: u64,
    started: Option<Instant>,
    times: AggregatedTimes,
    progress: FrameProgress,
}

impl<S, K, D> VideoRun<S, K, D>
where
    S: FrameSource,
    K: FrameSink,
    D: Detector,
{
    pub fn new(
        input: &Path,
        output: OutputGuard,
        source: S,
        sink: K,
        detector: D,
        show_progress: bool,
    ) -> Self {
        let progress = FrameProgress::new(source.metadata().frame_count, show_progress);
        Self {
            input: input.to_path_buf(),
            phase: RunPhase::Opened,
            source,
            sink,
            output,
            detector,
            frame_index: 0,
            total_detections: 0,
            started: None,
            times: AggregatedTimes::default(),
            progress,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Frames fully processed so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    fn advance(&mut self, next: RunPhase) -> Result<(), PipelineError> {
        if !self.phase.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                path: self.input.clone(),
                from: self.phase,
                to: next,
            });
        }
        log::trace!("{:?}: {:?} -> {:?}", self.input, self.phase, next);
        self.phase = next;
        Ok(())
    }

    /// Enters streaming and starts the wall clock.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        self.advance(RunPhase::Streaming)?;
        self.started = Some(Instant::now());
        Ok(())
    }

    /// Pushes one frame through the pipeline. `Ok(false)` at end of stream.
    pub fn step(&mut self, annotator: &Annotator) -> anyhow::Result<bool> {
        if self.phase != RunPhase::Streaming {
            return Err(PipelineError::InvalidTransition {
                path: self.input.clone(),
                from: self.phase,
                to: RunPhase::Streaming,
            }
            .into());
        }
        let mut frame_times = FrameTimes::default();

        let start = Instant::now();
        let Some(frame) = self
            .source
            .read_next()
            .with_context(|| format!("failed to read frame {} of {:?}", self.frame_index, self.input))?
        else {
            return Ok(false);
        };
        frame_times.read = start.elapsed();

        let start = Instant::now();
        let detections = self
            .detector
            .detect(&frame)
            .with_context(|| format!("detection failed on frame {} of {:?}", self.frame_index, self.input))?;
        frame_times.detect = start.elapsed();
        self.total_detections += detections.len() as u64;

        let start = Instant::now();
        let annotated = annotator.annotate(&frame, &detections);
        frame_times.annotate = start.elapsed();

        let start = Instant::now();
        self.sink
            .write(&annotated)
            .with_context(|| format!("failed to write frame {} of {:?}", self.frame_index, self.input))?;
        frame_times.write = start.elapsed();

        self.frame_index += 1;
        self.progress.update(self.frame_index);
        log::debug!(
            "frame {}: {} detections in {:?} ({frame_times:?})",
            self.frame_index,
            detections.len(),
            frame_times.total(),
        );
        self.times.push(frame_times);
        Ok(true)
    }

    /// Finishes the sink and freezes the counters.
    pub fn finish(&mut self) -> anyhow::Result<RunSummary> {
        if !self.phase.can_transition_to(RunPhase::Finalized) {
            return Err(PipelineError::InvalidTransition {
                path: self.input.clone(),
                from: self.phase,
                to: RunPhase::Finalized,
            }
            .into());
        }
        self.sink
            .finish()
            .with_context(|| format!("failed to finalize output {:?}", self.output.path))?;
        let duration = self.started.map(|s| s.elapsed()).unwrap_or_default();
        self.advance(RunPhase::Finalized)?;
        self.output.commit();
        self.progress.finish();
        Ok(RunSummary {
            frames: self.frame_index,
            total_detections: self.total_detections,
            duration,
        })
    }

    fn fail(&mut self) {
        if self.advance(RunPhase::Failed).is_ok() {
            self.progress.abandon();
        }
    }

    /// Streams every frame to the sink and finalizes. On error the run is marked failed
    /// and nothing is committed.
    pub fn run(mut self, annotator: &Annotator) -> anyhow::Result<RunSummary> {
        let result = self.stream(annotator).and_then(|()| self.finish());
        if result.is_err() {
            self.fail();
        }
        self.log_times();
        result
    }

    fn stream(&mut self, annotator: &Annotator) -> anyhow::Result<()> {
        self.start()?;
        while self.step(annotator)? {}
        Ok(())
    }

    fn log_times(&self) {
        if self.times.is_empty() {
            return;
        }
        log::debug!(
            "Frame times over {} frames: avg {:?}, min {:?}, max {:?}",
            self.times.len(),
            self.times.avg(),
            self.times.min(),
            self.times.max(),
        );
    }
}

/// Runs one video end to end: open the source, build a detector sized for it, open the
/// sink, stream every frame and return the finalized metrics.
///
/// Source and sink are released on every exit path. Any failure from opening the sink
/// onward removes the partial output file and yields no metrics.
pub fn process_video<Io, F>(
    io: &Io,
    factory: &F,
    annotator: &Annotator,
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> anyhow::Result<VideoMetrics>
where
    Io: VideoIo,
    F: DetectorFactory,
{
    log::info!("Processing {input:?}");
    let source = io.open_source(input)?;
    let metadata = *source.metadata();
    log::info!(
        "{input:?}: {}x{} @ {:.2} fps, {} frames expected",
        metadata.width,
        metadata.height,
        metadata.fps,
        metadata.frame_count,
    );

    let inference_size = effective_inference_size(config.inference_size, &metadata);
    log::debug!("Inference size for {input:?}: {inference_size}");
    let detector = factory.create(&config.detector_params(inference_size))?;

    let guard = OutputGuard::new(output);
    let sink = io.open_sink(output, &metadata)?;
    let run = VideoRun::new(input, guard, source, sink, detector, config.show_progress);
    let summary = run.run(annotator)?;

    let metrics = VideoMetrics::from_run(input, output, summary, config, inference_size);
    log::info!(
        "Done: {:?} | frames={} | fps={:.2} | detections={}",
        metrics.output_path,
        metrics.frame_count,
        metrics.processing_fps,
        metrics.total_detections,
    );
    Ok(metrics)
}
