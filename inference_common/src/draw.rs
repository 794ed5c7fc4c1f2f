//! Detection overlays: anti-aliased boxes plus a filled confidence label.
//!
//! Visual scale is picked per detection from a small set of size buckets. A continuous
//! scale would follow frame-to-frame noise in box size and flicker; buckets only change
//! when the subject distance genuinely changes.

use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use anyhow::Context;
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_antialiased_line_segment_mut, draw_filled_rect_mut, draw_text_mut, text_size,
};
use imageproc::pixelops::interpolate;
use imageproc::rect::Rect;

use crate::bbox::{Bbox, Detection};

pub const BOX_COLOR: Rgb<u8> = Rgb([113, 204, 46]);
pub const TEXT_COLOR: Rgb<u8> = Rgb([20, 20, 20]);

/// Pixel height of the label font at `text_scale == 1.0`.
const FONT_BASE_PX: f32 = 30.0;

const SMALL_BELOW: f32 = 60.0;
const MEDIUM_BELOW: f32 = 150.0;

static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Visual scale profile for a single detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawScale {
    pub text_scale: f32,
    pub text_thickness: u32,
    pub box_thickness: u32,
    pub padding: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleBucket {
    Small,
    Medium,
    Large,
}

impl ScaleBucket {
    /// Bucket for a box whose smaller side is `size_ref` pixels.
    pub fn for_size_ref(size_ref: f32) -> Self {
        if size_ref < SMALL_BELOW {
            Self::Small
        } else if size_ref < MEDIUM_BELOW {
            Self::Medium
        } else {
            Self::Large
        }
    }

    pub fn draw_scale(self) -> DrawScale {
        match self {
            Self::Small => DrawScale {
                text_scale: 0.40,
                text_thickness: 1,
                box_thickness: 1,
                padding: 2,
            },
            Self::Medium => DrawScale {
                text_scale: 0.55,
                text_thickness: 1,
                box_thickness: 2,
                padding: 4,
            },
            Self::Large => DrawScale {
                text_scale: 0.75,
                text_thickness: 2,
                box_thickness: 3,
                padding: 6,
            },
        }
    }
}

pub fn bucket_for_bbox(bbox: &Bbox) -> ScaleBucket {
    ScaleBucket::for_size_ref(bbox.size_ref())
}

/// Computed fresh for every detection on every frame, never smoothed across frames.
pub fn scale_for_bbox(bbox: &Bbox) -> DrawScale {
    bucket_for_bbox(bbox).draw_scale()
}

/// Rendered extent of a label: text box size plus the descender depth below the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextExtent {
    pub width: i32,
    pub height: i32,
    pub baseline: i32,
}

/// Label font, bundled with the crate so rendering never depends on system fonts.
#[derive(Debug, Clone)]
pub struct LabelFont {
    font: FontRef<'static>,
}

impl LabelFont {
    pub fn bundled() -> anyhow::Result<Self> {
        let font = FontRef::try_from_slice(BUNDLED_FONT).context("bundled label font is invalid")?;
        Ok(Self { font })
    }

    fn px_scale(text_scale: f32) -> PxScale {
        PxScale::from(text_scale * FONT_BASE_PX)
    }

    pub fn measure(&self, text: &str, text_scale: f32, thickness: u32) -> TextExtent {
        let scale = Self::px_scale(text_scale);
        let scaled = self.font.as_scaled(scale);
        let (width, _) = text_size(scale, &self.font, text);
        TextExtent {
            width: width as i32 + thickness.saturating_sub(1) as i32,
            height: scaled.ascent().ceil() as i32,
            baseline: (-scaled.descent()).ceil() as i32,
        }
    }

    /// Draws `text` with its baseline-left corner at `origin`.
    fn draw(&self, canvas: &mut RgbImage, text: &str, origin: (i32, i32), text_scale: f32, thickness: u32) {
        let scale = Self::px_scale(text_scale);
        let top = origin.1 - self.font.as_scaled(scale).ascent().round() as i32;
        // Faux bold: overstrike shifted one pixel per extra unit of thickness.
        for dx in 0..thickness.max(1) as i32 {
            draw_text_mut(canvas, TEXT_COLOR, origin.0 + dx, top, scale, &self.font, text);
        }
    }
}

/// Placement of a label background and the baseline origin of its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelLayout {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub text_origin: (i32, i32),
}

/// Places a label above the box's top-left corner `(x1, y1)`, pinned to `y = 0` when
/// there is no room above.
pub fn layout_label(x1: i32, y1: i32, extent: TextExtent, padding: i32) -> LabelLayout {
    let top = (y1 - extent.height - extent.baseline - 2 * padding).max(0);
    let right = x1 + extent.width + 2 * padding;
    let bottom = top + extent.height + extent.baseline + 2 * padding;
    LabelLayout {
        left: x1,
        top,
        right,
        bottom,
        text_origin: (x1 + padding, bottom - padding - extent.baseline / 2),
    }
}

/// Draws detection overlays on copies of frames.
#[derive(Debug, Clone)]
pub struct Annotator {
    font: LabelFont,
}

impl Annotator {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self::with_font(LabelFont::bundled()?))
    }

    pub fn with_font(font: LabelFont) -> Self {
        Self { font }
    }

    /// Returns an annotated copy; `frame` itself is left untouched.
    pub fn annotate(&self, frame: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut annotated = frame.clone();
        for detection in detections {
            self.draw_detection(&mut annotated, detection);
        }
        annotated
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &Detection) {
        let scale = scale_for_bbox(&detection.bbox);
        let corners = detection.bbox.pixel_corners();
        draw_box(canvas, corners, scale.box_thickness, BOX_COLOR);

        let label = detection.label();
        let extent = self.font.measure(&label, scale.text_scale, scale.text_thickness);
        let layout = layout_label(corners.0, corners.1, extent, scale.padding);

        // Corners are inclusive, like the outline.
        let background = Rect::at(layout.left, layout.top).of_size(
            (layout.right - layout.left + 1).max(1) as u32,
            (layout.bottom - layout.top + 1).max(1) as u32,
        );
        draw_filled_rect_mut(canvas, background, BOX_COLOR);
        self.font.draw(
            canvas,
            &label,
            layout.text_origin,
            scale.text_scale,
            scale.text_thickness,
        );
    }
}

/// Anti-aliased rectangle outline, `thickness` pixels wide and centered on the corners.
fn draw_box(canvas: &mut RgbImage, (x1, y1, x2, y2): (i32, i32, i32, i32), thickness: u32, color: Rgb<u8>) {
    let thickness = thickness.max(1) as i32;
    for offset in -(thickness / 2)..=((thickness - 1) / 2) {
        let (left, top, right, bottom) = (x1 - offset, y1 - offset, x2 + offset, y2 + offset);
        draw_segment(canvas, (left, top), (right, top), color);
        draw_segment(canvas, (left, bottom), (right, bottom), color);
        draw_segment(canvas, (left, top), (left, bottom), color);
        draw_segment(canvas, (right, top), (right, bottom), color);
    }
}

fn draw_segment(canvas: &mut RgbImage, start: (i32, i32), end: (i32, i32), color: Rgb<u8>) {
    if start == end {
        // Wu's algorithm divides by the segment length.
        let (x, y) = start;
        if x >= 0 && y >= 0 && (x as u32) < canvas.width() && (y as u32) < canvas.height() {
            canvas.put_pixel(x as u32, y as u32, color);
        }
        return;
    }
    draw_antialiased_line_segment_mut(canvas, start, end, color, interpolate);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Detection {
        Detection::new(Bbox::new(xmin, ymin, xmax, ymax), 0.9, "person")
    }

    #[test]
    fn bucket_thresholds() {
        assert_eq!(ScaleBucket::for_size_ref(1.0), ScaleBucket::Small);
        assert_eq!(ScaleBucket::for_size_ref(59.99), ScaleBucket::Small);
        assert_eq!(ScaleBucket::for_size_ref(60.0), ScaleBucket::Medium);
        assert_eq!(ScaleBucket::for_size_ref(149.99), ScaleBucket::Medium);
        assert_eq!(ScaleBucket::for_size_ref(150.0), ScaleBucket::Large);
        assert_eq!(ScaleBucket::for_size_ref(4000.0), ScaleBucket::Large);
    }

    #[test]
    fn small_and_large_boxes() {
        assert_eq!(
            bucket_for_bbox(&Bbox::new(10.0, 10.0, 40.0, 40.0)),
            ScaleBucket::Small
        );
        assert_eq!(
            bucket_for_bbox(&Bbox::new(0.0, 0.0, 200.0, 200.0)),
            ScaleBucket::Large
        );
        // Tall but narrow boxes are bucketed by their narrow side.
        assert_eq!(
            bucket_for_bbox(&Bbox::new(0.0, 0.0, 100.0, 900.0)),
            ScaleBucket::Medium
        );
    }

    #[test]
    fn bucket_profiles() {
        let small = ScaleBucket::Small.draw_scale();
        assert_eq!((small.text_thickness, small.box_thickness, small.padding), (1, 1, 2));
        let medium = ScaleBucket::Medium.draw_scale();
        assert_eq!((medium.text_thickness, medium.box_thickness, medium.padding), (1, 2, 4));
        let large = ScaleBucket::Large.draw_scale();
        assert_eq!((large.text_thickness, large.box_thickness, large.padding), (2, 3, 6));
        assert!(small.text_scale < medium.text_scale && medium.text_scale < large.text_scale);
    }

    #[test]
    fn label_sits_above_the_box() {
        let extent = TextExtent {
            width: 50,
            height: 12,
            baseline: 4,
        };
        let layout = layout_label(100, 100, extent, 4);
        assert_eq!(layout.top, 100 - 12 - 4 - 8);
        assert_eq!(layout.bottom, 100);
        assert_eq!(layout.right, 100 + 50 + 8);
        assert_eq!(layout.text_origin, (104, 100 - 4 - 2));
    }

    #[test]
    fn label_is_pinned_to_the_top_edge() {
        let extent = TextExtent {
            width: 50,
            height: 12,
            baseline: 4,
        };
        let layout = layout_label(10, 5, extent, 2);
        assert_eq!(layout.top, 0);
        assert_eq!(layout.bottom, 12 + 4 + 4);
    }

    #[test]
    fn measured_text_grows_with_scale() {
        let font = LabelFont::bundled().unwrap();
        let small = font.measure("person 0.50", 0.40, 1);
        let large = font.measure("person 0.50", 0.75, 2);
        assert!(small.width > 0 && small.height > 0);
        assert!(large.width > small.width);
        assert!(large.height > small.height);
        assert!(small.baseline >= 0);
    }

    #[test]
    fn annotate_leaves_input_untouched() {
        let annotator = Annotator::new().unwrap();
        let frame = RgbImage::from_pixel(320, 240, Rgb([0, 0, 0]));
        let annotated = annotator.annotate(&frame, &[det(40.0, 80.0, 200.0, 230.0)]);
        assert!(frame.pixels().all(|p| *p == Rgb([0, 0, 0])));
        assert_ne!(annotated, frame);
        assert_eq!(annotated.dimensions(), frame.dimensions());
    }

    #[test]
    fn annotate_without_detections_is_a_copy() {
        let annotator = Annotator::new().unwrap();
        let frame = RgbImage::from_pixel(64, 48, Rgb([7, 8, 9]));
        assert_eq!(annotator.annotate(&frame, &[]), frame);
    }

    #[test]
    fn box_outline_uses_box_color() {
        let annotator = Annotator::new().unwrap();
        let frame = RgbImage::from_pixel(320, 240, Rgb([0, 0, 0]));
        let annotated = annotator.annotate(&frame, &[det(50.0, 100.0, 150.0, 200.0)]);
        // Bottom edge midpoint: far from the label, exactly on the outline.
        assert_eq!(*annotated.get_pixel(100, 200), BOX_COLOR);
        // Box interior stays untouched.
        assert_eq!(*annotated.get_pixel(100, 150), Rgb([0, 0, 0]));
    }

    #[test]
    fn label_background_is_clamped_inside_the_frame() {
        let annotator = Annotator::new().unwrap();
        let frame = RgbImage::from_pixel(320, 240, Rgb([0, 0, 0]));
        let annotated = annotator.annotate(&frame, &[det(20.0, 0.0, 60.0, 40.0)]);
        // Background is pinned at y = 0 starting at the box's left edge.
        assert_eq!(*annotated.get_pixel(21, 0), BOX_COLOR);
    }

    #[test]
    fn boxes_touching_the_frame_edges_do_not_panic() {
        let annotator = Annotator::new().unwrap();
        let frame = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        let detections = [
            det(0.0, 0.0, 100.0, 100.0),
            det(90.0, 90.0, 99.9, 99.9),
            det(10.2, 10.2, 10.7, 10.9),
        ];
        let annotated = annotator.annotate(&frame, &detections);
        assert_eq!(annotated.dimensions(), (100, 100));
    }
}
