use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunking::ChunkingConfig;

pub const DEFAULT_NAMESPACE: &str = "ns1";
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.25;

const UNKNOWN_FILE: &str = "Unknown File";
const NO_TEXT: &str = "No text available.";

/// One fixed-size slice of a document's text. `chunk_id` counts from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub filename: String,
    pub chunk_id: u32,
    pub text: String,
}

impl DocumentChunk {
    pub fn vector_id(&self) -> String {
        vector_id(&self.filename, self.chunk_id)
    }
}

pub fn vector_id(filename: &str, chunk_id: u32) -> String {
    format!("{filename}_chunk_{chunk_id}")
}

/// Inverse of [`vector_id`]; ids that do not end in `_chunk_<n>` yield `None`.
pub fn filename_from_vector_id(id: &str) -> Option<&str> {
    let (filename, number) = id.rsplit_once("_chunk_")?;
    if filename.is_empty() || number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(filename)
}

/// Metadata stored next to every vector. The key set is fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default = "unknown_file")]
    pub filename: String,
    #[serde(default, deserialize_with = "lenient_chunk_id")]
    pub chunk_id: u32,
    #[serde(default = "no_text")]
    pub text: String,
}

fn unknown_file() -> String {
    UNKNOWN_FILE.to_string()
}

fn no_text() -> String {
    NO_TEXT.to_string()
}

// Index metadata hands numbers back as floats, so `3` may arrive as `3.0`.
fn lenient_chunk_id<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let number = value
        .as_u64()
        .or_else(|| value.as_f64().filter(|n| *n >= 0.0).map(|n| n as u64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .unwrap_or(0);
    Ok(u32::try_from(number).unwrap_or(u32::MAX))
}

impl Default for ChunkMetadata {
    fn default() -> Self {
        Self {
            filename: unknown_file(),
            chunk_id: 0,
            text: no_text(),
        }
    }
}

impl From<&DocumentChunk> for ChunkMetadata {
    fn from(chunk: &DocumentChunk) -> Self {
        Self {
            filename: chunk.filename.clone(),
            chunk_id: chunk.chunk_id,
            text: chunk.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl VectorRecord {
    pub fn from_chunk(chunk: &DocumentChunk, values: Vec<f32>) -> Self {
        Self {
            id: chunk.vector_id(),
            values,
            metadata: ChunkMetadata::from(chunk),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

impl QueryMatch {
    pub fn similarity_percent(&self) -> f64 {
        self.score * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalOptions {
    pub top_k: usize,
    /// Matches scoring below this are not offered to the answer model.
    pub min_similarity: f64,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub filename: String,
    pub chunk_id: u32,
    pub similarity_percent: f64,
}

impl From<&QueryMatch> for Citation {
    fn from(value: &QueryMatch) -> Self {
        Self {
            filename: value.metadata.filename.clone(),
            chunk_id: value.metadata.chunk_id,
            similarity_percent: value.similarity_percent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOutcome {
    pub question: String,
    pub answer: String,
    /// False when no excerpt survived filtering and the model answered unaided.
    pub grounded: bool,
    pub citations: Vec<Citation>,
    pub matches: Vec<QueryMatch>,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunking: ChunkingConfig,
    pub namespace: String,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub filename: String,
    pub checksum: String,
    pub chunk_count: usize,
    pub embedded_count: usize,
    pub upserted_count: usize,
    pub ingested_at: DateTime<Utc>,
}
