// Request-scoped errors and their HTTP mapping

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use berrydoc_eye::VisionError;
use berrydoc_llm::LLMError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::pages;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    MissingInput(String),

    #[error("{0}")]
    MalformedImage(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Detection model is not available")]
    ModelUnavailable,

    #[error("{0}")]
    Timeout(String),

    #[error("{0}")]
    UpstreamAssistant(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingInput(_) | ApiError::MalformedImage(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::UpstreamAssistant(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::MissingInput(_) => "MISSING_INPUT",
            ApiError::MalformedImage(_) => "MALFORMED_IMAGE",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::ModelUnavailable => "MODEL_UNAVAILABLE",
            ApiError::Timeout(_) => "TIMEOUT",
            ApiError::UpstreamAssistant(_) => "UPSTREAM_ASSISTANT_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Errors the caller caused; form flows send these back to the landing page
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ApiError::MissingInput(_) | ApiError::MalformedImage(_) | ApiError::PayloadTooLarge(_)
        )
    }

    /// Message safe to show to clients. Internal details only go to the log.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    fn log(&self) {
        match self {
            ApiError::MissingInput(m) | ApiError::MalformedImage(m) | ApiError::PayloadTooLarge(m) => {
                warn!("Rejected input: {}", m)
            }
            ApiError::ModelUnavailable => warn!("Detection requested but model is not loaded"),
            other => error!("Request failed: {}", other),
        }
    }

    /// HTML rendition for browser form flows
    pub fn into_html_response(self) -> Response {
        self.log();
        let status = self.status();
        (status, Html(pages::error_page(status, &self.public_message()))).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        let body = Json(ErrorResponse {
            error: self.public_message(),
            code: self.code().to_string(),
        });
        (self.status(), body).into_response()
    }
}

impl From<VisionError> for ApiError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::MissingInput(m) => ApiError::MissingInput(m),
            VisionError::MalformedImage(m) => ApiError::MalformedImage(m),
            VisionError::ModelUnavailable => ApiError::ModelUnavailable,
            VisionError::Timeout(d) => ApiError::Timeout(format!("Detection timed out after {:?}", d)),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<LLMError> for ApiError {
    fn from(err: LLMError) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else {
            ApiError::UpstreamAssistant(err.to_string())
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(format!("IO error: {}", err))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("Worker failed: {}", err))
    }
}
