use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use ffmpeg::format::{self, Pixel};
use ffmpeg::software::scaling::{context::Context as Scaler, flag::Flags};
use ffmpeg::util::frame::video::Video;
use ffmpeg::{codec, encoder, Rational};
use image::RgbImage;
use inference_common::media::FrameSink;
use inference_common::video_meta::VideoMetadata;
use inference_common::PipelineError;

const ENCODE_FORMAT: Pixel = Pixel::YUV420P;
/// Bits per pixel per frame, enough for MPEG-4 Part 2 to stay artifact-free on overlays.
const BITS_PER_PIXEL: f64 = 0.2;

/// Encodes RGB frames to an MPEG-4 Part 2 stream muxed by the output's extension.
pub struct FfmpegSink {
    path: PathBuf,
    output: format::context::Output,
    encoder: encoder::Video,
    scaler: Scaler,
    rgb: Video,
    yuv: Video,
    stream_index: usize,
    time_base: Rational,
    width: u32,
    height: u32,
    next_pts: i64,
    finished: bool,
}

fn unopenable(path: &Path, reason: impl ToString) -> PipelineError {
    PipelineError::UnopenableSink {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Frame rate as a rational MPEG-4 accepts (denominator below 2^16).
fn frame_rate(fps: f64) -> Rational {
    Rational::new((fps * 1000.0).round() as i32, 1000).reduce()
}

impl FfmpegSink {
    /// Opens the writer, creating parent directories. Unknown source fps falls back to
    /// [`VideoMetadata::writer_fps`].
    pub fn create(path: &Path, metadata: &VideoMetadata) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| unopenable(path, err))?;
        }
        let (width, height) = metadata.size();
        let rate = frame_rate(metadata.writer_fps());
        let time_base = rate.invert();

        let mut output = format::output(&path).map_err(|err| unopenable(path, err))?;
        let global_header = output
            .format()
            .flags()
            .contains(format::flag::Flags::GLOBAL_HEADER);

        let codec = encoder::find(codec::Id::MPEG4)
            .ok_or_else(|| unopenable(path, "MPEG-4 encoder not available"))?;
        let mut stream = output.add_stream(codec).map_err(|err| unopenable(path, err))?;
        let stream_index = stream.index();

        let mut builder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|err| unopenable(path, err))?;
        builder.set_width(width);
        builder.set_height(height);
        builder.set_format(ENCODE_FORMAT);
        builder.set_time_base(time_base);
        builder.set_frame_rate(Some(rate));
        builder.set_bit_rate(bit_rate(width, height, metadata.writer_fps()));
        if global_header {
            builder.set_flags(codec::flag::Flags::GLOBAL_HEADER);
        }
        let encoder = builder.open_as(codec).map_err(|err| unopenable(path, err))?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);

        output.write_header().map_err(|err| unopenable(path, err))?;

        let scaler = Scaler::get(
            Pixel::RGB24,
            width,
            height,
            ENCODE_FORMAT,
            width,
            height,
            Flags::BILINEAR,
        )
        .map_err(|err| unopenable(path, err))?;

        log::debug!(
            "Writing {path:?}: {width}x{height} @ {}/{} fps, mpeg4",
            rate.numerator(),
            rate.denominator()
        );
        Ok(Self {
            path: path.to_path_buf(),
            output,
            encoder,
            scaler,
            rgb: Video::new(Pixel::RGB24, width, height),
            yuv: Video::empty(),
            stream_index,
            time_base,
            width,
            height,
            next_pts: 0,
            finished: false,
        })
    }

    /// Writes every packet the encoder has ready.
    fn drain(&mut self) -> anyhow::Result<()> {
        let stream_time_base = self
            .output
            .stream(self.stream_index)
            .map(|s| s.time_base())
            .unwrap_or(self.time_base);
        let mut encoded = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(self.stream_index);
            encoded.rescale_ts(self.time_base, stream_time_base);
            encoded
                .write_interleaved(&mut self.output)
                .with_context(|| format!("failed to write packet to {:?}", self.path))?;
        }
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.finished = true;
        self.encoder.send_eof()?;
        self.drain()?;
        self.output
            .write_trailer()
            .with_context(|| format!("failed to write trailer of {:?}", self.path))?;
        Ok(())
    }
}

fn bit_rate(width: u32, height: u32, fps: f64) -> usize {
    (f64::from(width) * f64::from(height) * fps * BITS_PER_PIXEL) as usize
}

impl FrameSink for FfmpegSink {
    fn write(&mut self, frame: &RgbImage) -> anyhow::Result<()> {
        if self.finished {
            bail!("writer for {:?} is already finished", self.path);
        }
        if frame.dimensions() != (self.width, self.height) {
            bail!(
                "frame is {:?}, writer for {:?} expects {}x{}",
                frame.dimensions(),
                self.path,
                self.width,
                self.height
            );
        }

        let row_len = self.width as usize * 3;
        let stride = self.rgb.stride(0);
        let plane = self.rgb.data_mut(0);
        for (row, src) in frame.as_raw().chunks_exact(row_len).enumerate() {
            let start = row * stride;
            plane[start..start + row_len].copy_from_slice(src);
        }

        self.scaler
            .run(&self.rgb, &mut self.yuv)
            .context("RGB to YUV conversion failed")?;
        self.yuv.set_pts(Some(self.next_pts));
        self.next_pts += 1;
        self.encoder
            .send_frame(&self.yuv)
            .with_context(|| format!("failed to encode frame for {:?}", self.path))?;
        self.drain()
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.flush()?;
        log::debug!("Finalized {:?} with {} frames", self.path, self.next_pts);
        Ok(())
    }
}

impl Drop for FfmpegSink {
    /// Best effort: a sink dropped mid-stream still gets a trailer before the file closes.
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.flush() {
                log::debug!("Could not finalize {:?} on drop: {err:#}", self.path);
            }
        }
    }
}
