//! HTTP surface: upload page, health probe and the `/upload` handler.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /` | HTML upload page |
//! | `GET /health` | `OK` |
//! | `POST /upload` | [`ExtractionResult`] JSON, or `{"error": …}` with 4xx/5xx |
//!
//! Client mistakes (no file, empty name, wrong extension) are 400s. Once the
//! upload is accepted the handler answers 200 even when extraction fails;
//! the body's `success` flag says how it went. Only I/O failures while
//! saving the upload produce a 500.

use crate::config::ServiceConfig;
use crate::error::ExtractError;
use crate::extract::extract_invoice;
use crate::output::ExtractionResult;
use crate::pipeline::cleanup::{remove_with_retry, sweep_stale_uploads, UPLOAD_PREFIX};
use crate::pipeline::model::InvoiceModel;
use crate::pipeline::validate::{allowed_file, file_extension};
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub model: Arc<dyn InvoiceModel>,
}

impl AppState {
    /// Prepare the upload directory and bundle the state.
    ///
    /// Creates `config.upload_dir` if needed and, when `sweep_on_start` is
    /// set, removes uploads a previous process failed to delete.
    pub async fn new(
        config: ServiceConfig,
        model: Arc<dyn InvoiceModel>,
    ) -> Result<Self, ExtractError> {
        tokio::fs::create_dir_all(&config.upload_dir).await?;
        if config.sweep_on_start {
            sweep_stale_uploads(&config.upload_dir).await?;
        }
        Ok(Self {
            config: Arc::new(config),
            model,
        })
    }
}

/// Errors the upload handler reports instead of an [`ExtractionResult`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No file part")]
    NoFilePart,

    #[error("No selected file")]
    NoSelectedFile,

    #[error("File type not allowed")]
    FileTypeNotAllowed,

    /// Malformed or oversized multipart body.
    #[error("{}", .0.body_text())]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoFilePart | ApiError::NoSelectedFile | ApiError::FileTypeNotAllowed => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Multipart(e) => e.status(),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Error processing upload: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind `config.host:config.port` and serve until Ctrl-C.
pub async fn serve(state: AppState) -> io::Result<()> {
    let addr = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  GET  /        - upload page");
    info!("  GET  /health  - liveness probe");
    info!("  POST /upload  - invoice extraction (multipart field 'file')");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Static upload page.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check
pub async fn health_check() -> &'static str {
    "OK"
}

/// Accept an invoice upload, extract it, clean up, answer with the result.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ExtractionResult>, ApiError> {
    let mut multipart = multipart.map_err(|_| ApiError::NoFilePart)?;

    let (filename, bytes) = loop {
        let Some(field) = multipart.next_field().await? else {
            return Err(ApiError::NoFilePart);
        };
        if field.name() != Some("file") {
            continue;
        }
        // A plain form value named `file` is not a file part.
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };
        if filename.is_empty() {
            return Err(ApiError::NoSelectedFile);
        }
        if !allowed_file(&filename) {
            return Err(ApiError::FileTypeNotAllowed);
        }
        let bytes = field.bytes().await?;
        break (filename, bytes);
    };

    let extension = file_extension(&filename).unwrap_or_default();
    let path = save_upload(&state.config.upload_dir, &extension, &bytes)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    info!(
        "File saved: {} ({:?}, {} bytes)",
        path.display(),
        filename,
        bytes.len()
    );

    let result = extract_invoice(state.model.as_ref(), &path, state.config.model_timeout()).await;

    let removed = remove_with_retry(
        &path,
        state.config.delete_attempts,
        state.config.delete_retry_delay(),
    )
    .await;
    if !removed {
        warn!("Upload {} left behind; it will be swept on next start", path.display());
    }

    Ok(Json(result))
}

/// Write `bytes` to a fresh, uniquely named file in `dir`.
///
/// The client's filename only contributes its extension, so concurrent
/// uploads of `invoice.jpg` never overwrite each other.
async fn save_upload(dir: &Path, extension: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    let path = tempfile::Builder::new()
        .prefix(UPLOAD_PREFIX)
        .suffix(&format!(".{extension}"))
        .tempfile_in(dir)?
        .into_temp_path()
        .keep()
        .map_err(|e| e.error)?;

    if let Err(e) = tokio::fs::write(&path, bytes).await {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(e);
    }
    Ok(path)
}
