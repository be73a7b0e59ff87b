//! Error types for berrydoc-eye

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Malformed image: {0}")]
    MalformedImage(String),

    #[error("Detection model is not available")]
    ModelUnavailable,

    #[error("Detection timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),
}

impl From<ort::Error> for VisionError {
    fn from(err: ort::Error) -> Self {
        VisionError::Ort(err.to_string())
    }
}

impl VisionError {
    /// True for errors caused by what the client sent rather than by the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, VisionError::MissingInput(_) | VisionError::MalformedImage(_))
    }
}

pub type Result<T> = std::result::Result<T, VisionError>;
