//! berrydoc-eye: strawberry disease detection
//!
//! Decodes uploaded and camera-captured images, runs the ONNX detector on a
//! blocking worker, projects its output into [`DetectionResult`] and draws
//! annotated copies of the input.

pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod processing;
mod utils;

pub use config::VisionConfig;
pub use error::{Result, VisionError};
pub use ingest::{CaptureKeys, IngestedImage};
pub use models::{Detector, LabelTable, RawDetection, RawDetections};
pub use processing::{DetectionAdapter, DetectionBox, DetectionResult, NONE_FOUND};
