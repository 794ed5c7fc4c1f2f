use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Frame rate used for the output writer when the source does not report one.
pub const DEFAULT_WRITER_FPS: f64 = 30.0;

/// Static properties of an opened video stream.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    /// Nominal frame rate, 0 when unknown.
    pub fps: f64,
    /// Expected number of frames, 0 when unknown.
    pub frame_count: u64,
}

impl VideoMetadata {
    pub fn new(width: u32, height: u32, fps: f64, frame_count: u64) -> Self {
        Self {
            width,
            height,
            fps,
            frame_count,
        }
    }

    /// Rejects streams without usable dimensions.
    pub fn validate(&self, path: &Path) -> Result<(), PipelineError> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::UnopenableSource {
                path: path.to_path_buf(),
                reason: format!("invalid video dimensions {}x{}", self.width, self.height),
            });
        }
        Ok(())
    }

    /// Frame size as `(width, height)`.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn writer_fps(&self) -> f64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            DEFAULT_WRITER_FPS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_fps_falls_back_when_unknown() {
        assert_eq!(VideoMetadata::new(640, 480, 0.0, 0).writer_fps(), 30.0);
        assert_eq!(VideoMetadata::new(640, 480, f64::NAN, 0).writer_fps(), 30.0);
        assert_eq!(VideoMetadata::new(640, 480, 25.0, 10).writer_fps(), 25.0);
    }

    #[test]
    fn zero_dimensions_are_unopenable() {
        let err = VideoMetadata::new(0, 480, 25.0, 10)
            .validate(Path::new("clip.mp4"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnopenableSource { .. }));
        assert!(err.to_string().contains("clip.mp4"));

        VideoMetadata::new(1, 1, 0.0, 0)
            .validate(Path::new("clip.mp4"))
            .unwrap();
    }
}
