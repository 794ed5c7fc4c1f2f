//! Frame source and sink over ffmpeg: decode to RGB24, encode MPEG-4 Part 2.

extern crate ffmpeg_next as ffmpeg;

pub mod sink;
pub mod source;

use std::path::Path;

use inference_common::media::VideoIo;
use inference_common::video_meta::VideoMetadata;

pub use sink::FfmpegSink;
pub use source::FfmpegSource;

/// [`VideoIo`] backed by libav*.
#[derive(Debug, Clone, Copy)]
pub struct FfmpegIo {
    _initialized: (),
}

impl FfmpegIo {
    /// Initializes ffmpeg once for the process.
    pub fn new() -> anyhow::Result<Self> {
        ffmpeg::init()?;
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
        Ok(Self { _initialized: () })
    }
}

impl VideoIo for FfmpegIo {
    type Source = FfmpegSource;
    type Sink = FfmpegSink;

    fn open_source(&self, path: &Path) -> anyhow::Result<FfmpegSource> {
        FfmpegSource::open(path)
    }

    fn open_sink(&self, path: &Path, metadata: &VideoMetadata) -> anyhow::Result<FfmpegSink> {
        FfmpegSink::create(path, metadata)
    }
}
