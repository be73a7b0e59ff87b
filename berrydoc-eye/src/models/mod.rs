//! Detection models and their contract

pub mod detector;
pub mod labels;
pub mod pool;
pub mod yolo;

pub use detector::{Detector, RawDetection, RawDetections};
pub use labels::{LabelTable, STRAWBERRY_CLASSES};
pub use pool::SessionPool;
pub use yolo::YoloModel;
