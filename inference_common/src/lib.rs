pub mod batch;
pub mod bbox;
pub mod config;
pub mod detector;
pub mod draw;
pub mod error;
pub mod frame_times;
pub mod imgsz;
pub mod media;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod video_meta;

pub use error::PipelineError;
