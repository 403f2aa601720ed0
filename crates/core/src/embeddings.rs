use crate::error::{ensure_success, SearchError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const BACKEND: &str = "openai";

#[async_trait]
pub trait Embedder {
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError>;
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;

        let response = ensure_success(BACKEND, response).await?;
        let payload: EmbeddingResponse = response.json().await?;
        first_embedding(payload)
    }
}

fn first_embedding(payload: EmbeddingResponse) -> Result<Vec<f32>, SearchError> {
    let embedding = payload
        .data
        .into_iter()
        .next()
        .map(|data| data.embedding)
        .ok_or_else(|| SearchError::backend(BACKEND, "embedding response had no data"))?;

    if embedding.is_empty() {
        return Err(SearchError::backend(BACKEND, "embedding vector was empty"));
    }

    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_embedding_is_taken_from_data() {
        let payload: EmbeddingResponse = serde_json::from_str(
            r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.5,-0.25]}],"model":"text-embedding-3-small"}"#,
        )
        .expect("payload should parse");

        assert_eq!(first_embedding(payload).unwrap(), vec![0.5, -0.25]);
    }

    #[test]
    fn empty_data_is_a_backend_error() {
        let payload: EmbeddingResponse =
            serde_json::from_str(r#"{"data":[]}"#).expect("payload should parse");

        assert!(matches!(
            first_embedding(payload),
            Err(SearchError::BackendResponse { .. })
        ));
    }

    #[test]
    fn request_body_names_model_and_input() {
        let body = serde_json::to_value(EmbeddingRequest {
            model: "text-embedding-3-small",
            input: "What are the two types of Trust?",
        })
        .unwrap();

        assert_eq!(body["model"], "text-embedding-3-small");
        assert_eq!(body["input"], "What are the two types of Trust?");
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let embedder = OpenAiEmbedder::new("key")
            .with_base_url("http://localhost:8080/v1/")
            .with_model("custom");

        assert_eq!(embedder.base_url, "http://localhost:8080/v1");
        assert_eq!(embedder.model(), "custom");
    }
}
