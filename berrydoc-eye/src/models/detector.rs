//! Detector contract shared by the ONNX model and test doubles

use crate::error::Result;
use crate::models::labels::LabelTable;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// One object as reported by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_index: usize,
    pub label: String,
    pub confidence: f32,
    /// Absolute pixel coordinates (x1, y1, x2, y2) in the source image
    pub bbox: [f32; 4],
}

/// Detector-native output for one image, in the model's own order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetections {
    pub entries: Vec<RawDetection>,
    /// (width, height) of the image the boxes refer to
    pub image_size: (u32, u32),
}

impl RawDetections {
    pub fn empty(image_size: (u32, u32)) -> Self {
        Self {
            entries: Vec::new(),
            image_size,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Object detector wrapping exactly one model invocation per call.
///
/// Implementations are blocking and may take hundreds of milliseconds; callers
/// run them on a blocking worker.
pub trait Detector: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Index -> label table bundled with the model
    fn labels(&self) -> &LabelTable;

    /// Run the model on a decoded image
    fn detect(&self, image: &DynamicImage) -> Result<RawDetections>;
}
