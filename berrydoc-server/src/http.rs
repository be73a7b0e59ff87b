// HTTP routes for the detection pages, camera APIs and chatbot

use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartRejection, rejection::BytesRejection, DefaultBodyLimit, Multipart, State,
    },
    http::{header, StatusCode},
    middleware,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use berrydoc_eye::ingest::{decode_data_url, ingest_capture, ingest_upload};
use berrydoc_eye::processing::project;
use berrydoc_eye::{CaptureKeys, DetectionAdapter, DetectionBox, IngestedImage};
use berrydoc_llm::AssistantBridge;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::error::ApiError;
use crate::pages;
use crate::session::{session_middleware, MemorySessionStore, SessionContext, SessionSigner, SessionStore};
use crate::storage::{ResultStorage, RESULTS_ROUTE};

/// Shared handles for every request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub detection: DetectionAdapter,
    pub assistant: Arc<AssistantBridge>,
    pub sessions: Arc<dyn SessionStore>,
    pub signer: Arc<SessionSigner>,
    pub storage: Arc<ResultStorage>,
    pub capture_keys: Arc<CaptureKeys>,
}

impl AppState {
    /// Assemble state around an already-built detector and assistant.
    ///
    /// Creates the storage directories. Fails if no session secret is set.
    pub fn new(
        config: ServerConfig,
        detection: DetectionAdapter,
        assistant: AssistantBridge,
    ) -> Result<Self, ConfigError> {
        let secret = config
            .session
            .secret_key
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::ValidationError("session secret is not set".to_string()))?;
        let signer = SessionSigner::new(secret.as_bytes()).map_err(ConfigError::ValidationError)?;

        let storage = ResultStorage::new(&config.storage);
        storage
            .ensure_dirs()
            .map_err(|e| ConfigError::IoError(format!("Failed to create storage directories: {}", e)))?;

        Ok(Self {
            sessions: Arc::new(MemorySessionStore::new(config.session.capacity)),
            config: Arc::new(config),
            detection,
            assistant: Arc::new(assistant),
            signer: Arc::new(signer),
            storage: Arc::new(storage),
            capture_keys: Arc::new(CaptureKeys::new()),
        })
    }

    /// Load the model and build the Gemini bridge from configuration
    pub fn from_config(config: ServerConfig) -> Result<Self, ConfigError> {
        let detection = DetectionAdapter::from_config(&config.vision);
        let assistant = AssistantBridge::from_config(&config.assistant)
            .map_err(|e| ConfigError::ValidationError(format!("assistant: {}", e)))?;
        Self::new(config, detection, assistant)
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    model_loaded: bool,
}

#[derive(Debug, Deserialize)]
struct CaptureRequest {
    image: Option<String>,
}

#[derive(Debug, Serialize)]
struct RedirectResponse {
    redirect: String,
}

#[derive(Debug, Serialize)]
struct ContinuousResponse {
    result: String,
    detections: Vec<DetectionBox>,
}

#[derive(Debug, Deserialize)]
struct ChatbotRequest {
    message: Option<String>,
    disease: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatbotResponse {
    response: String,
    disease: String,
}

pub fn create_router(state: AppState) -> Router {
    let network = &state.config.network;
    let max_body_bytes = network.max_body_bytes;
    let enable_compression = network.enable_compression;
    let result_dir = state.storage.result_dir().to_path_buf();

    // Routes that read or write the per-user result slot
    let session_routes = Router::new()
        .route("/", get(index_handler))
        .route("/deteksi", post(deteksi_handler))
        .route("/detection", get(detection_handler))
        .route("/realtime", get(realtime_handler))
        .route("/realtime_detect", post(realtime_detect_handler))
        .layer(middleware::from_fn_with_state(state.clone(), session_middleware));

    let stateless_routes = Router::new()
        .route("/realtime_detect_continuous", post(realtime_detect_continuous_handler))
        .route("/chatbot", post(chatbot_handler))
        .route("/health", get(health_handler));

    let mut router = session_routes
        .merge(stateless_routes)
        .nest_service(RESULTS_ROUTE, ServeDir::new(result_dir))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if enable_compression {
        router = router.layer(CompressionLayer::new());
    }
    router
}

/// 302 to `location`
fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Body bytes, with the length-limit rejection kept as a JSON 413
fn body_bytes(body: Result<Bytes, BytesRejection>) -> Result<Bytes, ApiError> {
    body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge("Request body is too large".to_string())
        } else {
            ApiError::MissingInput(rejection.body_text())
        }
    })
}

fn parse_json<T: DeserializeOwned>(body: Result<Bytes, BytesRejection>) -> Result<T, ApiError> {
    let body = body_bytes(body)?;
    serde_json::from_slice(&body).map_err(|e| {
        warn!("Unparseable request body: {}", e);
        ApiError::MissingInput("Invalid request".to_string())
    })
}

fn required(value: Option<String>, what: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::MissingInput(format!("No {} provided", what)))
}

async fn index_handler() -> Html<String> {
    Html(pages::landing())
}

async fn realtime_handler() -> Html<String> {
    Html(pages::realtime())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.detection.is_available(),
    })
}

/// Form upload. Input problems send the browser back to the landing page.
async fn deteksi_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let outcome = match multipart {
        Ok(multipart) => process_upload(&state, &session, multipart).await,
        Err(e) => Err(ApiError::MissingInput(format!("Not a multipart upload: {}", e))),
    };

    match outcome {
        Ok(()) => found("/detection"),
        Err(e) if e.is_input_error() => {
            warn!("Upload rejected: {}", e);
            found("/")
        }
        Err(e) => e.into_html_response(),
    }
}

async fn process_upload(
    state: &AppState,
    session: &SessionContext,
    multipart: Multipart,
) -> Result<(), ApiError> {
    let (filename, bytes) = read_image_field(multipart).await?;
    if !state.detection.is_available() {
        return Err(ApiError::ModelUnavailable);
    }

    let data = bytes.clone();
    let ingested = tokio::task::spawn_blocking(move || ingest_upload(&filename, &data)).await??;
    state.storage.save_upload(&ingested.key, &bytes).await?;
    detect_and_store(state, session, ingested).await
}

/// Filename and bytes of the `image` part
async fn read_image_field(mut multipart: Multipart) -> Result<(String, Bytes), ApiError> {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::MissingInput(format!("Malformed multipart body: {}", e)))?
            .ok_or_else(|| ApiError::MissingInput("No image provided".to_string()))?;

        if field.name() != Some("image") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ApiError::PayloadTooLarge("Upload is too large".to_string())
            } else {
                ApiError::MissingInput(format!("Failed to read upload: {}", e))
            }
        })?;
        return Ok((filename, bytes));
    }
}

/// Inference, annotation and session write shared by both page flows
async fn detect_and_store(
    state: &AppState,
    session: &SessionContext,
    ingested: IngestedImage,
) -> Result<(), ApiError> {
    let IngestedImage { image, key } = ingested;
    let image = Arc::new(image);
    let raw = state.detection.detect(image.clone()).await?;

    let annotated = if raw.is_empty() {
        None
    } else {
        let adapter = state.detection.clone();
        let entries = raw.clone();
        let rendered = tokio::task::spawn_blocking(move || adapter.annotate(&image, &entries)).await?;
        Some(state.storage.save_annotated(&key, rendered).await?)
    };

    let result = project(&raw, key, annotated);
    info!(
        "Stored result for session {}: {} ({} detections)",
        session.id(),
        result.summary,
        result.detections.len()
    );
    session.put(result);
    Ok(())
}

async fn detection_handler(Extension(session): Extension<SessionContext>) -> Response {
    match session.take_or_none() {
        Some(result) => Html(pages::detail(&result)).into_response(),
        None => found("/"),
    }
}

/// Single camera capture; the client follows the returned redirect
async fn realtime_detect_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<RedirectResponse>, ApiError> {
    let request: CaptureRequest = parse_json(body)?;
    let data_url = required(request.image, "image")?;
    if !state.detection.is_available() {
        return Err(ApiError::ModelUnavailable);
    }

    let keys = state.capture_keys.clone();
    let ingested = tokio::task::spawn_blocking(move || ingest_capture(&data_url, &keys)).await??;
    state
        .storage
        .save_capture(&ingested.key, ingested.image.clone())
        .await?;
    detect_and_store(&state, &session, ingested).await?;

    Ok(Json(RedirectResponse {
        redirect: "/detection".to_string(),
    }))
}

/// Streaming frame: no files, no annotation, no session
async fn realtime_detect_continuous_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ContinuousResponse>, ApiError> {
    let request: CaptureRequest = parse_json(body)?;
    let data_url = required(request.image, "image")?;
    if !state.detection.is_available() {
        return Err(ApiError::ModelUnavailable);
    }

    let image = tokio::task::spawn_blocking(move || decode_data_url(&data_url)).await??;
    let raw = state.detection.detect(Arc::new(image)).await?;
    let result = project(&raw, "camera", None);

    Ok(Json(ContinuousResponse {
        result: result.summary,
        detections: result.detections,
    }))
}

async fn chatbot_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ChatbotResponse>, ApiError> {
    let request: ChatbotRequest = parse_json(body)?;
    let message = required(request.message, "message")?;
    let disease = required(request.disease, "disease")?;

    let response = state.assistant.ask(&disease, &message).await?;
    Ok(Json(ChatbotResponse { response, disease }))
}
