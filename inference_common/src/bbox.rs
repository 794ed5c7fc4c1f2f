use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates of the frame it was detected on.
///
/// Detectors guarantee finite coordinates with `xmin < xmax` and `ymin < ymax`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Intersection over union, 0 for disjoint or degenerate boxes.
    pub fn iou(&self, other: &Bbox) -> f32 {
        let ix = (self.xmax.min(other.xmax) - self.xmin.max(other.xmin)).max(0.0);
        let iy = (self.ymax.min(other.ymax) - self.ymin.max(other.ymin)).max(0.0);
        let inter = ix * iy;
        if inter <= 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// Smaller side of the box, each side clamped to at least one pixel.
    pub fn size_ref(&self) -> f32 {
        self.width().max(1.0).min(self.height().max(1.0))
    }

    /// Integer pixel corners `(x1, y1, x2, y2)`, truncated toward zero.
    pub fn pixel_corners(&self) -> (i32, i32, i32, i32) {
        (
            self.xmin as i32,
            self.ymin as i32,
            self.xmax as i32,
            self.ymax as i32,
        )
    }
}

/// A single detection of the target class on one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: Bbox,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    pub class_label: String,
}

impl Detection {
    pub fn new(bbox: Bbox, confidence: f32, class_label: impl Into<String>) -> Self {
        Self {
            bbox,
            confidence,
            class_label: class_label.into(),
        }
    }

    /// Overlay label, e.g. `person 0.87`.
    pub fn label(&self) -> String {
        format!("{} {:.2}", self.class_label, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_overlapping_boxes() {
        let a = Bbox::new(0.0, 0.0, 10.0, 10.0);
        let b = Bbox::new(5.0, 0.0, 15.0, 10.0);
        assert_eq!(a.iou(&a), 1.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&Bbox::new(20.0, 20.0, 30.0, 30.0)), 0.0);
    }

    #[test]
    fn size_ref_uses_smaller_side() {
        assert_eq!(Bbox::new(0.0, 0.0, 200.0, 80.0).size_ref(), 80.0);
        assert_eq!(Bbox::new(10.0, 10.0, 40.0, 400.0).size_ref(), 30.0);
    }

    #[test]
    fn size_ref_clamps_sub_pixel_sides() {
        assert_eq!(Bbox::new(5.0, 5.0, 5.2, 90.0).size_ref(), 1.0);
    }

    #[test]
    fn pixel_corners_truncate() {
        let bbox = Bbox::new(10.9, 20.5, 40.99, 60.01);
        assert_eq!(bbox.pixel_corners(), (10, 20, 40, 60));
    }

    #[test]
    fn label_formats_confidence_with_two_decimals() {
        let det = Detection::new(Bbox::new(0.0, 0.0, 1.0, 1.0), 0.8765, "person");
        assert_eq!(det.label(), "person 0.88");
        let det = Detection::new(Bbox::new(0.0, 0.0, 1.0, 1.0), 1.0, "person");
        assert_eq!(det.label(), "person 1.00");
    }
}
