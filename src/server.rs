//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/upload?filename=` | Ingest the raw request body |
//! | `GET`  | `/api/files` | List documents, newest first |
//! | `GET`  | `/api/files/{id}` | One document |
//! | `DELETE` | `/api/files/{id}` | Delete a document with its vectors and links |
//! | `GET`  | `/api/files/{id}/summary?mode=` | On-demand summary (not persisted) |
//! | `GET`  | `/api/files/{id}/similar?top_k=` | Nearest documents by centroid |
//! | `GET`  | `/api/files/{id}/duplicates` | Run detection, return stored links |
//! | `GET`  | `/api/tags/{tag}/files` | Documents whose tags contain `tag` |
//! | `GET`  | `/api/search?query=&top_k=` | Semantic search |
//! | `GET`  | `/api/search/keyword?word=&limit=` | Keyword search |
//! | `POST` | `/api/reindex` | Rebuild all vectors |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document not found: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `extraction_failed`
//! (422), `search_unavailable` (503), `internal` (500).

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use docsift_core::error::{PipelineError, SearchUnavailableError};
use docsift_core::pipeline::Upload;
use docsift_core::summary::SummaryMode;

use crate::config::Config;
use crate::extract::{content_type_for_path, MIME_OCTET};
use crate::ingest::{sanitize_filename, store_upload};
use crate::services::AppContext;

#[derive(Clone)]
pub struct AppState {
    pub ctx: AppContext,
    pub upload_dir: std::path::PathBuf,
    pub default_top_k: usize,
    pub keyword_limit: usize,
}

impl AppState {
    pub fn new(ctx: AppContext, config: &Config) -> Self {
        Self {
            ctx,
            upload_dir: config.storage.upload_dir.clone(),
            default_top_k: config.search.default_top_k,
            keyword_limit: config.search.keyword_limit,
        }
    }
}

/// Start the server on `[server].bind` and run until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let ctx = AppContext::from_config(config).await?;
    let app = router(AppState::new(ctx, config), config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "docsift server listening");
    println!("docsift server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/upload", post(handle_upload))
        .route("/api/files", get(handle_list))
        .route("/api/files/{id}", get(handle_get).delete(handle_delete))
        .route("/api/files/{id}/summary", get(handle_summary))
        .route("/api/files/{id}/similar", get(handle_similar))
        .route("/api/files/{id}/duplicates", get(handle_duplicates))
        .route("/api/tags/{tag}/files", get(handle_tag))
        .route("/api/search", get(handle_search))
        .route("/api/search/keyword", get(handle_keyword))
        .route("/api/reindex", post(handle_reindex))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
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

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(id) => not_found(format!("document not found: {}", id)),
            e @ PipelineError::Extraction { .. } => AppError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "extraction_failed",
                e.to_string(),
            ),
            PipelineError::Store(e) => {
                tracing::error!(error = %e, "request failed");
                AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", e.to_string())
            }
        }
    }
}

impl From<SearchUnavailableError> for AppError {
    fn from(err: SearchUnavailableError) -> Self {
        AppError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "search_unavailable",
            err.to_string(),
        )
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "request failed");
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
    }
}

// ============ Handlers ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct UploadParams {
    filename: Option<String>,
}

async fn handle_upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let filename = params
        .filename
        .map(|f| sanitize_filename(&f))
        .ok_or_else(|| bad_request("filename query parameter is required"))?;
    if body.is_empty() {
        return Err(bad_request("request body must not be empty"));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && !v.starts_with(MIME_OCTET))
        .map(str::to_string)
        .unwrap_or_else(|| content_type_for_path(std::path::Path::new(&filename)).to_string());

    let stored = store_upload(&state.upload_dir, &filename, &body).await?;
    let storage_path = stored.to_string_lossy();
    let report = state
        .ctx
        .pipeline
        .ingest(Upload {
            bytes: &body,
            filename: &filename,
            content_type: &content_type,
            storage_path: &storage_path,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(report)).into_response())
}

async fn handle_list(State(state): State<AppState>) -> Result<Response, AppError> {
    let docs = state.ctx.pipeline.list_documents().await?;
    Ok(Json(json!({ "files": docs })).into_response())
}

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let doc = state.ctx.pipeline.get_document(&id).await?;
    Ok(Json(doc).into_response())
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    if !state.ctx.pipeline.delete_document(&id).await? {
        return Err(not_found(format!("document not found: {}", id)));
    }
    Ok(Json(json!({ "deleted": id })).into_response())
}

#[derive(Deserialize)]
struct SummaryParams {
    mode: Option<String>,
}

async fn handle_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SummaryParams>,
) -> Result<Response, AppError> {
    let mode = match params.mode.as_deref() {
        Some(m) => m
            .parse::<SummaryMode>()
            .map_err(|e| bad_request(e.to_string()))?,
        None => SummaryMode::default(),
    };
    let summary = state.ctx.pipeline.summarize_document(&id, mode).await?;
    Ok(Json(summary).into_response())
}

#[derive(Deserialize)]
struct TopKParams {
    top_k: Option<usize>,
}

async fn handle_similar(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TopKParams>,
) -> Result<Response, AppError> {
    let top_k = params.top_k.unwrap_or(state.default_top_k);
    let similar = state.ctx.pipeline.similar_documents(&id, top_k).await?;
    Ok(Json(json!({ "document_id": id, "similar": similar })).into_response())
}

#[derive(Deserialize)]
struct DuplicatesParams {
    threshold: Option<f32>,
}

/// The per-request threshold, or the configured one.
fn resolve_threshold(requested: Option<f32>, configured: f32) -> Result<f32, AppError> {
    match requested {
        None => Ok(configured),
        Some(t) if (0.0..=1.0).contains(&t) => Ok(t),
        Some(t) => Err(bad_request(format!("threshold must be in [0, 1], got {}", t))),
    }
}

async fn handle_duplicates(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DuplicatesParams>,
) -> Result<Response, AppError> {
    let threshold = resolve_threshold(
        params.threshold,
        state.ctx.pipeline.settings().dedup.threshold,
    )?;
    let found = state.ctx.pipeline.find_duplicates_at(&id, threshold).await?;
    let links = state.ctx.pipeline.duplicate_links(&id).await?;
    let new_links = found.iter().filter(|m| m.newly_linked).count();
    Ok(Json(json!({
        "document_id": id,
        "threshold": threshold,
        "new_links": new_links,
        "duplicates": links,
    }))
    .into_response())
}

async fn handle_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Response, AppError> {
    let docs = state.ctx.pipeline.documents_by_tag(&tag).await?;
    Ok(Json(json!({ "tag": tag, "files": docs })).into_response())
}

#[derive(Deserialize)]
struct SearchParams {
    query: Option<String>,
    top_k: Option<usize>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, AppError> {
    let query = params.query.unwrap_or_default();
    if query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let top_k = params.top_k.unwrap_or(state.default_top_k);
    let hits = state.ctx.pipeline.search(&query, top_k).await?;
    Ok(Json(json!({ "query": query, "results": hits })).into_response())
}

#[derive(Deserialize)]
struct KeywordParams {
    word: Option<String>,
    limit: Option<usize>,
}

async fn handle_keyword(
    State(state): State<AppState>,
    Query(params): Query<KeywordParams>,
) -> Result<Response, AppError> {
    let word = params.word.unwrap_or_default();
    if word.trim().is_empty() {
        return Err(bad_request("word must not be empty"));
    }
    let limit = params.limit.unwrap_or(state.keyword_limit);
    let hits = state.ctx.pipeline.keyword_search(&word, limit).await?;
    Ok(Json(json!({ "word": word, "results": hits })).into_response())
}

async fn handle_reindex(State(state): State<AppState>) -> Result<Response, AppError> {
    let reports = state.ctx.pipeline.reindex_all().await?;
    Ok(Json(json!({ "reindexed": reports.len(), "reports": reports })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_errors_map_to_codes() {
        let err: AppError = PipelineError::NotFound("x".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "not_found");

        let err: AppError = PipelineError::Extraction {
            document_id: "x".into(),
            source: docsift_core::error::ExtractionError::Unreadable("bad".into()),
        }
        .into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, "extraction_failed");

        let err: AppError = SearchUnavailableError::new("embedder down").into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code, "search_unavailable");
    }

    #[test]
    fn test_threshold_override_bounds() {
        assert_eq!(resolve_threshold(None, 0.92).unwrap(), 0.92);
        assert_eq!(resolve_threshold(Some(0.5), 0.92).unwrap(), 0.5);
        assert_eq!(resolve_threshold(Some(1.0), 0.92).unwrap(), 1.0);
        let err = resolve_threshold(Some(1.5), 0.92).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(resolve_threshold(Some(f32::NAN), 0.92).is_err());
    }
}
