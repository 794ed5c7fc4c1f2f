//! Frame to tensor conversion.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use inference_common::bbox::Bbox;
use ndarray::Array4;

/// Fill value of the padded border, as in the ultralytics exporter.
pub const PAD_VALUE: u8 = 114;

/// Aspect-preserving resize parameters, needed to map boxes back to the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Letterbox {
    pub fn new(frame_width: u32, frame_height: u32, target_height: u32, target_width: u32) -> Self {
        let scale = (target_height as f32 / frame_height as f32)
            .min(target_width as f32 / frame_width as f32);
        let (resized_w, resized_h) = Self::resized(frame_width, frame_height, scale);
        Self {
            scale,
            pad_x: target_width.saturating_sub(resized_w) / 2,
            pad_y: target_height.saturating_sub(resized_h) / 2,
            frame_width,
            frame_height,
        }
    }

    fn resized(width: u32, height: u32, scale: f32) -> (u32, u32) {
        (
            ((width as f32 * scale).round() as u32).max(1),
            ((height as f32 * scale).round() as u32).max(1),
        )
    }

    pub fn resized_size(&self) -> (u32, u32) {
        Self::resized(self.frame_width, self.frame_height, self.scale)
    }

    /// Maps a box from model input space back to the frame, clamped to its bounds.
    pub fn restore(&self, bbox: Bbox) -> Bbox {
        let (px, py) = (self.pad_x as f32, self.pad_y as f32);
        let (fw, fh) = (self.frame_width as f32, self.frame_height as f32);
        Bbox::new(
            ((bbox.xmin - px) / self.scale).clamp(0.0, fw),
            ((bbox.ymin - py) / self.scale).clamp(0.0, fh),
            ((bbox.xmax - px) / self.scale).clamp(0.0, fw),
            ((bbox.ymax - py) / self.scale).clamp(0.0, fh),
        )
    }
}

/// Resizes `frame` into a `target_height x target_width` canvas, centered and padded.
pub fn letterbox(frame: &RgbImage, target_height: u32, target_width: u32) -> (RgbImage, Letterbox) {
    let lb = Letterbox::new(frame.width(), frame.height(), target_height, target_width);
    let (resized_w, resized_h) = lb.resized_size();
    let mut canvas = RgbImage::from_pixel(target_width, target_height, Rgb([PAD_VALUE; 3]));
    if (resized_w, resized_h) == frame.dimensions() {
        imageops::replace(&mut canvas, frame, lb.pad_x.into(), lb.pad_y.into());
    } else {
        let resized = imageops::resize(frame, resized_w, resized_h, FilterType::Triangle);
        imageops::replace(&mut canvas, &resized, lb.pad_x.into(), lb.pad_y.into());
    }
    (canvas, lb)
}

/// `[1, 3, H, W]` tensor with channels scaled to `0..=1`.
pub fn to_nchw(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut input = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for channel in 0..3 {
            input[[0, channel, y, x]] = f32::from(pixel[channel]) / 255.0;
        }
    }
    input
}
