//! Configuration for berrydoc-eye

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Vision system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Path to the exported ONNX detection model
    pub model_path: PathBuf,
    /// Optional labels file overriding the table embedded in the model
    pub labels_path: Option<PathBuf>,
    /// Square model input size in pixels
    pub input_size: u32,
    /// Minimum class score for a proposal to be kept
    pub confidence_threshold: f32,
    /// IoU above which same-class boxes are suppressed
    pub iou_threshold: f32,
    /// Upper bound on boxes returned per image
    pub max_detections: usize,
    /// Number of ONNX sessions available for concurrent requests
    pub inference_workers: usize,
    /// Intra-op threads per ONNX session
    pub intra_threads: usize,
    /// Per-request budget for a detection call
    pub detection_timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model.onnx"),
            labels_path: None,
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
            inference_workers: 2,
            intra_threads: 2,
            detection_timeout_secs: 30,
        }
    }
}

impl VisionConfig {
    pub fn detection_timeout(&self) -> Duration {
        Duration::from_secs(self.detection_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err("Input size must be a positive multiple of 32".to_string());
        }

        if self.input_size > 4096 {
            return Err("Input size too large (max 4096)".to_string());
        }

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err("Confidence threshold must be within [0, 1]".to_string());
        }

        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err("IoU threshold must be within [0, 1]".to_string());
        }

        if self.max_detections == 0 {
            return Err("max_detections must be > 0".to_string());
        }

        if self.inference_workers == 0 || self.inference_workers > 64 {
            return Err("inference_workers must be between 1 and 64".to_string());
        }

        if self.intra_threads == 0 {
            return Err("intra_threads must be > 0".to_string());
        }

        if self.detection_timeout_secs == 0 {
            return Err("detection_timeout_secs must be > 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = VisionConfig::default();
        assert_eq!(config.model_path, PathBuf::from("model.onnx"));
        assert_eq!(config.input_size, 640);
        assert_eq!(config.confidence_threshold, 0.25);
        assert_eq!(config.iou_threshold, 0.7);
        assert_eq!(config.max_detections, 300);
        assert!(config.labels_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_input_size() {
        let mut config = VisionConfig::default();
        config.input_size = 0;
        assert!(config.validate().is_err());

        config.input_size = 641;
        assert!(config.validate().is_err());

        config.input_size = 8192;
        assert!(config.validate().is_err());

        config.input_size = 320;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_thresholds() {
        let mut config = VisionConfig::default();
        config.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        config.confidence_threshold = 0.5;
        config.iou_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_workers() {
        let mut config = VisionConfig::default();
        config.inference_workers = 0;
        assert!(config.validate().is_err());

        config.inference_workers = 65;
        assert!(config.validate().is_err());

        config.inference_workers = 1;
        config.detection_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_partial_json_uses_defaults() {
        let config: VisionConfig = serde_json::from_str(r#"{"model_path":"weights/best.onnx"}"#).unwrap();
        assert_eq!(config.model_path, PathBuf::from("weights/best.onnx"));
        assert_eq!(config.input_size, 640);
        assert_eq!(config.detection_timeout(), Duration::from_secs(30));
    }
}
