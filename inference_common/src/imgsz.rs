//! Inference size selection and stride alignment.
//!
//! The detection backend downsamples by a fixed stride, so every dimension fed to it is
//! rounded up to a multiple of [`STRIDE`] before the detector is built.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::video_meta::VideoMetadata;

pub const STRIDE: u32 = 32;

/// Spatial resolution at which frames are fed to the detector.
///
/// Serializes as a bare integer for square sizes and as `[height, width]` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InferenceSize {
    Square(u32),
    /// `(height, width)`
    HeightWidth(u32, u32),
}

impl InferenceSize {
    /// Native `(height, width)` of the source video.
    pub fn native(meta: &VideoMetadata) -> Self {
        Self::HeightWidth(meta.height, meta.width)
    }

    pub fn align_to_stride(self, stride: u32) -> Self {
        match self {
            Self::Square(side) => Self::Square(align_dim(side, stride)),
            Self::HeightWidth(h, w) => Self::HeightWidth(align_dim(h, stride), align_dim(w, stride)),
        }
    }

    /// `(height, width)` regardless of variant.
    pub fn height_width(self) -> (u32, u32) {
        match self {
            Self::Square(side) => (side, side),
            Self::HeightWidth(h, w) => (h, w),
        }
    }
}

impl fmt::Display for InferenceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Square(side) => write!(f, "{side}"),
            Self::HeightWidth(h, w) => write!(f, "{h},{w}"),
        }
    }
}

/// Accepts `640`, `480,640` or `480x640` (height first).
impl FromStr for InferenceSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_dim = |part: &str| -> anyhow::Result<u32> {
            let value: u32 = part
                .trim()
                .parse()
                .with_context(|| format!("invalid inference size dimension {part:?}"))?;
            if value == 0 {
                bail!("inference size dimensions must be positive");
            }
            Ok(value)
        };

        match s.split_once([',', 'x']) {
            Some((h, w)) => Ok(Self::HeightWidth(parse_dim(h)?, parse_dim(w)?)),
            None => Ok(Self::Square(parse_dim(s)?)),
        }
    }
}

/// Smallest multiple of `stride` that is `>= value`.
pub fn align_dim(value: u32, stride: u32) -> u32 {
    value.div_ceil(stride) * stride
}

/// Requested size (or the video's native size) aligned to [`STRIDE`].
pub fn effective_inference_size(
    requested: Option<InferenceSize>,
    meta: &VideoMetadata,
) -> InferenceSize {
    requested
        .unwrap_or_else(|| InferenceSize::native(meta))
        .align_to_stride(STRIDE)
}
