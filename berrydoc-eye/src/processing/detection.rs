//! Detection adapter: the only way request handlers reach the model

use crate::config::VisionConfig;
use crate::error::{Result, VisionError};
use crate::models::detector::{Detector, RawDetections};
use crate::models::yolo::YoloModel;
use crate::processing::annotate;
use image::{DynamicImage, RgbImage};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Holds the detector, if one loaded, and dispatches calls to blocking workers
#[derive(Clone)]
pub struct DetectionAdapter {
    detector: Option<Arc<dyn Detector>>,
    timeout: Duration,
}

impl DetectionAdapter {
    pub fn new(detector: Arc<dyn Detector>, timeout: Duration) -> Self {
        Self {
            detector: Some(detector),
            timeout,
        }
    }

    /// Adapter whose every call fails with [`VisionError::ModelUnavailable`]
    pub fn unavailable(timeout: Duration) -> Self {
        Self {
            detector: None,
            timeout,
        }
    }

    /// Load the ONNX model described by `config`.
    ///
    /// A load failure is logged here once and produces an unavailable adapter
    /// instead of an error, so the server still starts.
    pub fn from_config(config: &VisionConfig) -> Self {
        let timeout = config.detection_timeout();
        match YoloModel::load(config) {
            Ok(model) => {
                info!("Detection model ready: {:?}", config.model_path);
                Self::new(Arc::new(model), timeout)
            }
            Err(e) => {
                error!("Failed to load detection model {:?}: {}", config.model_path, e);
                Self::unavailable(timeout)
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.detector.is_some()
    }

    pub fn detector_name(&self) -> Option<&str> {
        self.detector.as_deref().map(|d| d.name())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one inference on a blocking worker, bounded by the adapter timeout
    pub async fn detect(&self, image: Arc<DynamicImage>) -> Result<RawDetections> {
        let detector = self.detector.clone().ok_or(VisionError::ModelUnavailable)?;

        let name = detector.name().to_string();
        let worker = tokio::task::spawn_blocking(move || detector.detect(&image));

        let raw = match tokio::time::timeout(self.timeout, worker).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_error)) => {
                error!("Detection worker failed: {}", join_error);
                return Err(VisionError::Processing(format!(
                    "Detection worker failed: {}",
                    join_error
                )));
            }
            Err(_) => {
                error!("Detection with {} timed out after {:?}", name, self.timeout);
                return Err(VisionError::Timeout(self.timeout));
            }
        };

        debug!("{} returned {} detections", name, raw.len());
        Ok(raw)
    }

    /// Copy of `image` with the detections drawn on it
    pub fn annotate(&self, image: &DynamicImage, raw: &RawDetections) -> RgbImage {
        annotate::annotate(image, raw)
    }
}

impl std::fmt::Debug for DetectionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionAdapter")
            .field("detector", &self.detector_name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
