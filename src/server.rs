//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/` | Health check and endpoint catalog |
//! | `POST`   | `/api/upload` | Upload a PDF (multipart field `pdf`) |
//! | `DELETE` | `/api/delete/{id}` | Delete an uploaded file |
//! | `POST`   | `/api/ask` | Ask a question against the live files |
//! | `GET`    | `/api/list-files` | List live files with remaining lifetimes |
//! | `GET`    | `/api/cleanup-status` | Ledger/registry snapshot |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Question is required" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `config_error`,
//! `build_error`, `upstream_error`, `internal` (all 500). Errors never crash
//! the process.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted; the browser frontend is
//! served from a different origin.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use uuid::Uuid;

use crate::coordinator::AppContext;
use crate::error::DocdropError;
use crate::models::Answer;

/// Build the application router around a shared context.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Leave headroom above the file-size cap so oversize uploads get our 400
    // instead of a generic 413.
    let body_limit = (ctx.config.storage.max_file_bytes as usize).saturating_add(1024 * 1024);

    Router::new()
        .route("/", get(handle_root))
        .route("/api/upload", post(handle_upload))
        .route("/api/delete/{id}", delete(handle_delete))
        .route("/api/ask", post(handle_ask))
        .route("/api/list-files", get(handle_list_files))
        .route("/api/cleanup-status", get(handle_cleanup_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(ctx)
}

/// Bind and serve until SIGINT, then shut the context down.
pub async fn run_server(ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let app = router(ctx.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("docdrop listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ctx.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

impl From<DocdropError> for AppError {
    fn from(err: DocdropError) -> Self {
        let (status, code) = match &err {
            DocdropError::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            DocdropError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            DocdropError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            DocdropError::Build(_) => (StatusCode::INTERNAL_SERVER_ERROR, "build_error"),
            DocdropError::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "upstream_error"),
            DocdropError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

// ============ Filename sanitization ============

/// Reduce an uploaded filename to a safe basename: strip any path
/// components, map whitespace to underscores, drop everything outside
/// `[A-Za-z0-9._-]`, and reject names that degenerate to nothing or to
/// dot-only strings.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let basename = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw);

    let cleaned: String = basename
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return None;
    }
    Some(cleaned)
}

fn has_allowed_extension(filename: &str, allowed: &[String]) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

// ============ GET / ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "message": "docdrop API is running",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "/api/upload",
            "ask": "/api/ask",
            "list_files": "/api/list-files",
            "delete_file": "/api/delete/{filename}",
            "cleanup_status": "/api/cleanup-status",
        },
    }))
}

// ============ POST /api/upload ============

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    filename: String,
    size: u64,
    /// Minutes until automatic deletion.
    auto_delete_in: u64,
}

async fn handle_upload(
    State(ctx): State<Arc<AppContext>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload: Option<(String, axum::body::Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() == Some("pdf") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("Failed to read upload: {}", e)))?;
            upload = Some((filename, bytes));
            break;
        }
    }

    let (raw_name, bytes) = upload.ok_or_else(|| bad_request("Missing 'pdf' file in request."))?;
    if raw_name.is_empty() {
        return Err(bad_request("No file selected"));
    }
    let filename = sanitize_filename(&raw_name).ok_or_else(|| bad_request("Invalid filename."))?;

    let storage = &ctx.config.storage;
    if !has_allowed_extension(&filename, &storage.allowed_extensions) {
        return Err(bad_request(
            "Invalid file format. Please upload a .pdf file.",
        ));
    }
    if bytes.len() as u64 > storage.max_file_bytes {
        return Err(bad_request(format!(
            "File too large. Maximum size is {}MB.",
            storage.max_file_bytes / (1024 * 1024)
        )));
    }

    let resource = ctx.upload(&filename, &bytes).await?;

    Ok(Json(UploadResponse {
        message: format!("PDF '{}' uploaded successfully.", filename),
        filename,
        size: resource.size,
        auto_delete_in: ctx.config.retention.file_ttl_secs / 60,
    }))
}

// ============ DELETE /api/delete/{id} ============

#[derive(Serialize)]
struct DeleteResponse {
    message: String,
}

async fn handle_delete(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let filename = sanitize_filename(&id).ok_or_else(|| not_found("File not found"))?;

    if !ctx.delete(&filename).await? {
        return Err(not_found("File not found"));
    }
    Ok(Json(DeleteResponse {
        message: format!("File '{}' deleted successfully.", filename),
    }))
}

// ============ POST /api/ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: Option<String>,
}

async fn handle_ask(
    State(ctx): State<Arc<AppContext>>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let Json(request) = body.map_err(|_| bad_request("Invalid JSON data"))?;
    let question = request
        .question
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| bad_request("Question is required"))?
        .to_string();

    // One derived index per query request.
    let session_id = Uuid::new_v4().to_string();

    let answer = ctx.query(&session_id, &question).await?;
    Ok(Json(answer))
}

// ============ GET /api/list-files ============

#[derive(Serialize)]
struct FileEntry {
    name: String,
    size: u64,
    /// Whole minutes until expiry; absent once expired.
    time_remaining: Option<i64>,
    upload_time: String,
}

#[derive(Serialize)]
struct ListFilesResponse {
    files: Vec<FileEntry>,
    total_files: usize,
    /// File TTL in minutes.
    cleanup_interval: u64,
}

async fn handle_list_files(State(ctx): State<Arc<AppContext>>) -> Json<ListFilesResponse> {
    let now = Utc::now();
    let mut files: Vec<FileEntry> = ctx
        .ledger
        .list()
        .into_iter()
        .map(|r| FileEntry {
            name: r.id.clone(),
            size: r.size,
            time_remaining: r.time_remaining(now).map(|d| d.num_minutes()),
            upload_time: r.acquired_at.to_rfc3339(),
        })
        .collect();
    files.sort_by(|a, b| a.name.cmp(&b.name));

    Json(ListFilesResponse {
        total_files: files.len(),
        files,
        cleanup_interval: ctx.config.retention.file_ttl_secs / 60,
    })
}

// ============ GET /api/cleanup-status ============

async fn handle_cleanup_status(
    State(ctx): State<Arc<AppContext>>,
) -> Json<crate::models::StatusSnapshot> {
    Json(ctx.status())
}
