use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("no text found in {0}")]
    EmptyDocument(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no embeddings generated for {0}")]
    NoEmbeddings(String),

    #[error("extraction task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("store not available yet: {0}")]
    NotReady(String),
}

impl SearchError {
    pub(crate) fn backend(backend: &str, details: impl Into<String>) -> Self {
        Self::BackendResponse {
            backend: backend.to_string(),
            details: details.into(),
        }
    }
}

/// Passes successful responses through; otherwise reads the body into a
/// `BackendResponse` error so the provider's message is not lost.
pub(crate) async fn ensure_success(
    backend: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, SearchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let details = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", body.trim())
    };
    Err(SearchError::backend(backend, details))
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
