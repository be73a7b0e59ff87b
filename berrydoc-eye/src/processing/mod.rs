//! Detection, projection and annotation

pub mod annotate;
pub mod detection;
pub mod font;
pub mod projection;

pub use annotate::annotate;
pub use detection::DetectionAdapter;
pub use projection::{project, project_at, DetectionBox, DetectionResult, NONE_FOUND};
