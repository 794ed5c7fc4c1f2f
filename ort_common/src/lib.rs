//! YOLOv8 person detection on ONNX Runtime.

pub mod classes;
pub mod device;
pub mod preprocess;
pub mod yolo;

pub use classes::parse_class_names;
pub use device::normalize_device;
pub use yolo::{YoloDetector, YoloDetectorFactory};
