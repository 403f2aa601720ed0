use crate::embeddings::Embedder;
use crate::llm::ChatMessage;
use crate::{QueryMatch, SearchError, VectorRecord};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait VectorIndex {
    /// Writes `records` into `namespace`, returning how many the index accepted.
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<usize, SearchError>;

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, SearchError>;

    async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, SearchError>;
}

#[async_trait]
pub trait ChatModel {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, SearchError>;
}

#[async_trait]
impl<T> VectorIndex for Arc<T>
where
    T: VectorIndex + Send + Sync + ?Sized,
{
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<usize, SearchError> {
        (**self).upsert(namespace, records).await
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, SearchError> {
        (**self).query(namespace, vector, top_k).await
    }

    async fn list_ids(&self, namespace: &str) -> Result<Vec<String>, SearchError> {
        (**self).list_ids(namespace).await
    }
}

#[async_trait]
impl<T> ChatModel for Arc<T>
where
    T: ChatModel + Send + Sync + ?Sized,
{
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, SearchError> {
        (**self).complete(messages).await
    }
}

#[async_trait]
impl<T> Embedder for Arc<T>
where
    T: Embedder + Send + Sync + ?Sized,
{
    fn model(&self) -> &str {
        (**self).model()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        (**self).embed(text).await
    }
}
