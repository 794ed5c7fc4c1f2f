use std::path::{Path, PathBuf};

use anyhow::Context;
use ffmpeg::format::{input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context as Scaler, flag::Flags};
use ffmpeg::util::frame::video::Video;
use ffmpeg::Rational;
use image::RgbImage;
use inference_common::media::FrameSource;
use inference_common::video_meta::VideoMetadata;
use inference_common::PipelineError;

/// Decodes the best video stream of a container into RGB frames, one at a time.
pub struct FfmpegSource {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    stream_index: usize,
    metadata: VideoMetadata,
    /// Created on the first frame, once the decoded pixel format is known.
    scaler: Option<Scaler>,
    decoded: Video,
    rgb: Video,
    eof_sent: bool,
}

fn unopenable(path: &Path, reason: impl ToString) -> PipelineError {
    PipelineError::UnopenableSource {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn rate_to_fps(rate: Rational) -> f64 {
    if rate.numerator() <= 0 || rate.denominator() <= 0 {
        0.0
    } else {
        f64::from(rate)
    }
}

impl FfmpegSource {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Err(PipelineError::InputNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }
        let ictx = input(&path).map_err(|err| unopenable(path, err))?;
        let stream = ictx
            .streams()
            .best(Type::Video)
            .ok_or_else(|| unopenable(path, "no video stream"))?;
        let stream_index = stream.index();
        let fps = rate_to_fps(stream.avg_frame_rate());
        let frame_count = u64::try_from(stream.frames()).unwrap_or(0);

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|err| unopenable(path, err))?;
        let decoder = context_decoder
            .decoder()
            .video()
            .map_err(|err| unopenable(path, err))?;

        let metadata = VideoMetadata::new(decoder.width(), decoder.height(), fps, frame_count);
        metadata.validate(path)?;
        log::debug!("Opened {path:?}: {metadata:?}");

        Ok(Self {
            path: path.to_path_buf(),
            input: ictx,
            decoder,
            stream_index,
            metadata,
            scaler: None,
            decoded: Video::empty(),
            rgb: Video::empty(),
            eof_sent: false,
        })
    }

    fn convert(&mut self) -> anyhow::Result<RgbImage> {
        let (width, height) = (self.decoded.width(), self.decoded.height());
        let scaler = match self.scaler.take() {
            Some(scaler) => scaler,
            None => Scaler::get(
                self.decoded.format(),
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                Flags::BILINEAR,
            )
            .with_context(|| format!("failed to create RGB scaler for {:?}", self.path))?,
        };
        let scaler = self.scaler.insert(scaler);
        scaler
            .run(&self.decoded, &mut self.rgb)
            .with_context(|| format!("failed to convert frame of {:?} to RGB", self.path))?;

        // Drop per-row padding.
        let stride = self.rgb.stride(0);
        let row_len = width as usize * 3;
        let plane = self.rgb.data(0);
        let mut packed = Vec::with_capacity(row_len * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            packed.extend_from_slice(&plane[start..start + row_len]);
        }
        RgbImage::from_raw(width, height, packed)
            .with_context(|| format!("decoded frame of {:?} has an invalid size", self.path))
    }
}

impl FrameSource for FfmpegSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn read_next(&mut self) -> anyhow::Result<Option<RgbImage>> {
        loop {
            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                return self.convert().map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == self.stream_index => {
                    self.decoder
                        .send_packet(&packet)
                        .with_context(|| format!("failed to decode packet of {:?}", self.path))?;
                }
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to read {:?}", self.path));
                }
            }
        }
    }
}
