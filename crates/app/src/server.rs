use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pdf_rag_core::{
    is_pdf_name, sanitize_filename, ChatModel, Embedder, FileReport, IngestError,
    IngestionPipeline, RagCoordinator, RetrievalOptions, SearchError, VectorIndex,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub type SharedEmbedder = Arc<dyn Embedder + Send + Sync>;
pub type SharedIndex = Arc<dyn VectorIndex + Send + Sync>;
pub type SharedChat = Arc<dyn ChatModel + Send + Sync>;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub struct AppState {
    pub pipeline: IngestionPipeline<SharedEmbedder, SharedIndex>,
    pub coordinator: RagCoordinator<SharedEmbedder, SharedIndex, SharedChat>,
    pub upload_dir: PathBuf,
    pub retrieval: RetrievalOptions,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload_file))
        .route("/upload_pdfs", post(upload_pdfs))
        .route("/query", post(query))
        .route("/list_files", get(list_files))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<SearchError> for ApiError {
    fn from(error: SearchError) -> Self {
        match error {
            SearchError::Request(message) => Self::bad_request(message),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        Self::internal(error.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(error: axum::extract::multipart::MultipartError) -> Self {
        Self::bad_request(error.body_text())
    }
}

impl From<std::io::Error> for ApiError {
    fn from(error: std::io::Error) -> Self {
        Self::internal(error.to_string())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

struct UploadedFile {
    filename: String,
    bytes: Vec<u8>,
}

/// Collects every `file` field that carries a non-empty file name.
async fn read_file_fields(multipart: &mut Multipart) -> Result<Vec<UploadedFile>, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        if filename.trim().is_empty() {
            continue;
        }
        files.push(UploadedFile {
            filename,
            bytes: bytes.to_vec(),
        });
    }
    Ok(files)
}

async fn save_upload(upload_dir: &Path, file: &UploadedFile) -> Result<PathBuf, ApiError> {
    let filename = sanitize_filename(&file.filename)?;
    tokio::fs::create_dir_all(upload_dir).await?;
    let path = upload_dir.join(&filename);
    tokio::fs::write(&path, &file.bytes).await?;
    info!(filename = %filename, bytes = file.bytes.len(), "file uploaded");
    Ok(path)
}

#[derive(Debug, Serialize)]
struct SkippedUpload {
    filename: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    processed: Vec<FileReport>,
    skipped: Vec<SkippedUpload>,
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut files = read_file_fields(&mut multipart).await?;
    if files.is_empty() {
        return Err(ApiError::bad_request("No selected file"));
    }
    let file = files.swap_remove(0);
    if !is_pdf_name(&file.filename) {
        return Err(ApiError::bad_request("Only PDF files are accepted"));
    }

    let path = save_upload(&state.upload_dir, &file).await?;
    let report = state.pipeline.ingest_file(&path).await.map_err(|error| {
        warn!(path = %path.display(), error = %error, "error processing upload");
        ApiError::internal(error.to_string())
    })?;

    Ok(Json(json!({
        "success": format!("{} uploaded successfully", report.filename),
        "report": report,
    })))
}

async fn upload_pdfs(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let files = read_file_fields(&mut multipart).await?;

    let mut paths = Vec::new();
    for file in files.iter().filter(|file| is_pdf_name(&file.filename)) {
        paths.push(save_upload(&state.upload_dir, file).await?);
    }

    if paths.is_empty() {
        return Err(ApiError::bad_request("No valid PDF files uploaded."));
    }

    let report = state.pipeline.ingest_files(&paths).await;
    Ok(Json(UploadResponse {
        processed: report.files,
        skipped: report
            .skipped_files
            .into_iter()
            .map(|skipped| SkippedUpload {
                filename: skipped
                    .path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default(),
                reason: skipped.reason,
            })
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub answer: bool,
    #[serde(default)]
    pub min_similarity: Option<f64>,
}

#[derive(Debug, Serialize)]
struct QueryResult {
    filename: String,
    chunk_id: u32,
    text: String,
    similarity: f64,
}

async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::bad_request("Please enter a query."));
    }

    let options = RetrievalOptions {
        top_k: request.top_k.unwrap_or(state.retrieval.top_k),
        min_similarity: request
            .min_similarity
            .unwrap_or(state.retrieval.min_similarity),
    };

    if request.answer {
        let outcome = state.coordinator.answer(&request.query, options).await?;
        return Ok(Json(serde_json::to_value(outcome).map_err(SearchError::from)?));
    }

    let matches = state
        .coordinator
        .retrieve(&request.query, options.top_k)
        .await?;
    let results = matches
        .into_iter()
        .map(|found| QueryResult {
            similarity: (found.similarity_percent() * 100.0).round() / 100.0,
            filename: found.metadata.filename,
            chunk_id: found.metadata.chunk_id,
            text: found.metadata.text,
        })
        .collect::<Vec<_>>();

    Ok(Json(json!({
        "query": request.query,
        "query_results": results,
    })))
}

async fn list_files(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let filenames = state.coordinator.list_filenames().await?;
    Ok(Json(json!({ "filenames": filenames })))
}
