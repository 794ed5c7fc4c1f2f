//! Sequential frame decode/encode boundaries.
//!
//! Implementations release their underlying handles on `Drop`, so a run that bails out
//! mid-stream still closes the source and the sink.

use std::path::Path;

use image::RgbImage;

use crate::video_meta::VideoMetadata;

/// Ordered frames of one video.
pub trait FrameSource {
    fn metadata(&self) -> &VideoMetadata;

    /// Next frame in presentation order, `None` at end of stream.
    fn read_next(&mut self) -> anyhow::Result<Option<RgbImage>>;
}

/// Encoded output accepting frames in presentation order.
pub trait FrameSink {
    fn write(&mut self, frame: &RgbImage) -> anyhow::Result<()>;

    /// Flushes pending packets and finalizes the container.
    fn finish(&mut self) -> anyhow::Result<()>;
}

/// Opens sources and sinks for a concrete media backend.
pub trait VideoIo {
    type Source: FrameSource;
    type Sink: FrameSink;

    /// Fails with [`PipelineError::InputNotFound`] for missing paths and
    /// [`PipelineError::UnopenableSource`] for unreadable containers or zero dimensions.
    ///
    /// [`PipelineError::InputNotFound`]: crate::PipelineError::InputNotFound
    /// [`PipelineError::UnopenableSource`]: crate::PipelineError::UnopenableSource
    fn open_source(&self, path: &Path) -> anyhow::Result<Self::Source>;

    /// Creates parent directories as needed; fails with
    /// [`PipelineError::UnopenableSink`](crate::PipelineError::UnopenableSink) when the
    /// backend rejects the configuration.
    fn open_sink(&self, path: &Path, metadata: &VideoMetadata) -> anyhow::Result<Self::Sink>;
}
