//! HTTP boundary for batch processing.
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | `POST` | `/api/v1/process-images` | `{"input_type": "local_folder" \| "google_drive", "path": "...", "api_key": "..."}` |
//! | `GET`  | `/health` | none |
//! | `GET`  | `/` | none |
//!
//! A missing source folder maps to `404`; every other pipeline failure maps
//! to `500` with the error's text in `detail`. CORS is fully permissive.

use crate::config::ReportConfig;
use crate::error::{ErrorKind, Img2ReportError};
use crate::pipeline::source::SourceDescriptor;
use crate::process::{process_images, BatchRequest};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::cors::CorsLayer;

/// Shared state for the web server.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: ReportConfig,
}

impl AppState {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }
}

/// Which kind of source `path` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    LocalFolder,
    GoogleDrive,
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub input_type: InputType,
    /// Folder path or share link.
    pub path: String,
    pub api_key: String,
}

impl ProcessRequest {
    pub fn into_batch(self) -> BatchRequest {
        let source = match self.input_type {
            InputType::LocalFolder => SourceDescriptor::LocalFolder {
                path: PathBuf::from(self.path),
            },
            InputType::GoogleDrive => SourceDescriptor::CloudLink { url: self.path },
        };
        BatchRequest {
            source,
            api_key: self.api_key,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub excel_path: String,
    pub pdf_path: String,
    pub message: String,
}

/// Error body, `{"detail": "..."}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Pipeline error rendered as a JSON response.
pub struct ApiError(Img2ReportError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Failure => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorBody {
                detail: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/v1/process-images", post(process))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = create_router(state);
    tracing::info!("Starting server at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn process(
    State(state): State<AppState>,
    Json(body): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let request = body.into_batch();
    let output = process_images(&request, &state.config).await.map_err(ApiError)?;
    Ok(Json(ProcessResponse {
        excel_path: output.report_path.display().to_string(),
        pdf_path: output.document_path.display().to_string(),
        message: output.message,
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Local::now().to_rfc3339(),
    }))
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Image Analysis API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "process_images": "POST /api/v1/process-images",
            "health": "GET /health",
        },
    }))
}
