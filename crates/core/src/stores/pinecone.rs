use crate::error::ensure_success;
use crate::traits::VectorIndex;
use crate::{QueryMatch, SearchError, VectorRecord};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

pub const DEFAULT_INDEX_NAME: &str = "trusts-index";
pub const DEFAULT_CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
pub const DEFAULT_UPSERT_BATCH_SIZE: usize = 100;
pub const DEFAULT_METRIC: &str = "cosine";

const BACKEND: &str = "pinecone";
const API_VERSION: &str = "2024-07";

fn authorized(request: RequestBuilder, api_key: &str) -> RequestBuilder {
    request
        .header("Api-Key", api_key)
        .header("X-Pinecone-API-Version", API_VERSION)
}

/// Index hosts are reported without a scheme; accept both forms.
pub fn normalize_host(host: &str) -> Result<Url, SearchError> {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(SearchError::Request("index host is empty".to_string()));
    }
    if trimmed.contains("://") {
        Ok(Url::parse(trimmed)?)
    } else {
        Ok(Url::parse(&format!("https://{trimmed}"))?)
    }
}

#[derive(Debug, Deserialize)]
struct UpsertResponse {
    #[serde(rename = "upsertedCount", default)]
    upserted_count: usize,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedVector>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
struct ListedVector {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NamespaceStats {
    #[serde(rename = "vectorCount", default)]
    pub vector_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IndexStats {
    #[serde(default)]
    pub dimension: usize,
    #[serde(rename = "totalVectorCount", default)]
    pub total_vector_count: u64,
    #[serde(default)]
    pub namespaces: std::collections::BTreeMap<String, NamespaceStats>,
}

/// Data-plane client for a single serverless index.
pub struct PineconeStore {
    client: Client,
    host: Url,
    api_key: String,
    dimension: Option<usize>,
    batch_size: usize,
}

impl PineconeStore {
    pub fn new(host: &str, api_key: impl Into<String>) -> Result<Self, SearchError> {
        Ok(Self {
            client: Client::new(),
            host: normalize_host(host)?,
            api_key: api_key.into(),
            dimension: None,
            batch_size: DEFAULT_UPSERT_BATCH_SIZE,
        })
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn host(&self) -> &Url {
        &self.host
    }

    fn endpoint(&self, path: &str) -> Result<Url, SearchError> {
        Ok(self.host.join(path)?)
    }

    pub async fn describe_stats(&self) -> Result<IndexStats, SearchError> {
        let request = self
            .client
            .post(self.endpoint("/describe_index_stats")?)
            .json(&json!({}));
        let response = authorized(request, &self.api_key).send().await?;
        let response = ensure_success(BACKEND, response).await?;
        Ok(response.json().await?)
    }

    fn check_dimensions(&self, records: &[VectorRecord]) -> Result<(), SearchError> {
        check_dimensions(self.dimension, records)
    }
}

fn check_dimensions(expected: Option<usize>, records: &[VectorRecord]) -> Result<(), SearchError> {
    for record in records {
        if record.values.is_empty() {
            return Err(SearchError::Request(format!(
                "vector {} has no values",
                record.id
            )));
        }
        if let Some(dimension) = expected {
            if record.values.len() != dimension {
                return Err(SearchError::Request(format!(
                    "vector {} has dimension {} but the index expects {}",
                    record.id,
                    record.values.len(),
                    dimension
                )));
            }
        }
    }
    Ok(())
}

fn upsert_body(namespace: &str, records: &[VectorRecord]) -> serde_json::Value {
    json!({
        "vectors": records,
        "namespace": namespace,
    })
}

fn query_body(namespace: &str, vector: &[f32], top_k: usize) -> serde_json::Value {
    json!({
        "vector": vector,
        "topK": top_k,
        "includeValues": false,
        "includeMetadata": true,
        "namespace": namespace,
    })
}

#[async_trait]
impl VectorIndex for PineconeStore {
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<usize, SearchError> {
        self.check_dimensions(records)?;

        let mut upserted = 0;
        for batch in records.chunks(self.batch_size) {
            let request = self
                .client
                .post(self.endpoint("/vectors/upsert")?)
                .json(&upsert_body(namespace, batch));
            let response = authorized(request, &self.api_key).send().await?;
            let response = ensure_success(BACKEND, response).await?;
            let parsed: UpsertResponse = response.json().await?;

            tracing::debug!(
                namespace,
                batch_len = batch.len(),
                upserted = parsed.upserted_count,
                "pinecone upsert batch"
            );
            upserted += parsed.upserted_count;
        }

        Ok(upserted)
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, SearchError> {
        if vector.is_empty() {
            return Err(SearchError::Request("query vector is empty".to_string()));
        }
        if let Some(dimension) = self.dimension {
            if vector.len() != dimension {
                return Err(SearchError::Request(format!(
                    "query vector dim {} is not {}",
                    vector.len(),
                    dimension
                )));
            }
        }

        let request = self
            .client
            .post(self.endpoint("/query")?)
            .json(&query_body(namespace, vector, top_k));
        let response = authorized(request, &self.api_key).send().await?;
        let response = ensure_success(BACKEND, response).await?;
        let parsed: QueryResponse = response.json().await?;
        Ok(parsed.matches)
    }

    async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, SearchError> {
        let mut ids = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut url = self.endpoint("/vectors/list")?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs.append_pair("namespace", namespace);
                if let Some(next) = &token {
                    pairs.append_pair("paginationToken", next);
                }
            }

            let response = authorized(self.client.get(url), &self.api_key).send().await?;
            let response = ensure_success(BACKEND, response).await?;
            let page: ListResponse = response.json().await?;

            ids.extend(page.vectors.into_iter().map(|vector| vector.id));
            token = page
                .pagination
                .and_then(|pagination| pagination.next)
                .filter(|next| !next.is_empty());

            if token.is_none() {
                break;
            }
        }

        Ok(ids)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IndexDescription {
    pub name: String,
    #[serde(default)]
    pub dimension: usize,
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub host: String,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

#[derive(Debug, Clone)]
pub struct ServerlessSpec {
    pub cloud: String,
    pub region: String,
}

impl Default for ServerlessSpec {
    fn default() -> Self {
        Self {
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
        }
    }
}

/// Account-level API used to look up and create indexes.
pub struct PineconeControlPlane {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl PineconeControlPlane {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, SearchError> {
        Ok(Self {
            client: Client::new(),
            base_url: normalize_host(base_url)?,
            api_key: api_key.into(),
        })
    }

    pub async fn list_indexes(&self) -> Result<Vec<IndexDescription>, SearchError> {
        let request = self.client.get(self.base_url.join("/indexes")?);
        let response = authorized(request, &self.api_key).send().await?;
        let response = ensure_success(BACKEND, response).await?;
        let parsed: IndexList = response.json().await?;
        Ok(parsed.indexes)
    }

    /// `None` when the index does not exist.
    pub async fn describe_index(&self, name: &str) -> Result<Option<IndexDescription>, SearchError> {
        let request = self
            .client
            .get(self.base_url.join(&format!("/indexes/{name}"))?);
        let response = authorized(request, &self.api_key).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = ensure_success(BACKEND, response).await?;
        Ok(Some(response.json().await?))
    }

    pub async fn create_serverless_index(
        &self,
        name: &str,
        dimension: usize,
        metric: &str,
        spec: &ServerlessSpec,
    ) -> Result<IndexDescription, SearchError> {
        if dimension == 0 {
            return Err(SearchError::Request(
                "index dimension must be positive".to_string(),
            ));
        }

        let request = self.client.post(self.base_url.join("/indexes")?).json(&json!({
            "name": name,
            "dimension": dimension,
            "metric": metric,
            "spec": {
                "serverless": {
                    "cloud": spec.cloud,
                    "region": spec.region,
                }
            }
        }));
        let response = authorized(request, &self.api_key).send().await?;
        let response = ensure_success(BACKEND, response).await?;
        Ok(response.json().await?)
    }

    /// Resolves an index by name into a ready data-plane store.
    pub async fn open_index(&self, name: &str) -> Result<PineconeStore, SearchError> {
        let Some(description) = self.describe_index(name).await? else {
            let available = self
                .list_indexes()
                .await?
                .into_iter()
                .map(|index| index.name)
                .collect::<Vec<_>>();
            return Err(SearchError::NotReady(format!(
                "index '{name}' does not exist; available indexes: [{}]",
                available.join(", ")
            )));
        };

        if description.host.is_empty() {
            return Err(SearchError::NotReady(format!(
                "index '{name}' has no host yet"
            )));
        }

        let store = PineconeStore::new(&description.host, self.api_key.clone())?;
        Ok(if description.dimension > 0 {
            store.with_dimension(description.dimension)
        } else {
            store
        })
    }
}
