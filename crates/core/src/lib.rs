pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod stores;
pub mod traits;

pub use chunking::{build_document_chunks, split_words, ChunkingConfig, DEFAULT_CHUNK_WORDS};
pub use embeddings::{Embedder, OpenAiEmbedder, DEFAULT_EMBEDDING_MODEL, DEFAULT_OPENAI_BASE_URL};
pub use error::{IngestError, SearchError};
pub use extractor::{
    extract_document_text, extract_page_texts, LopdfExtractor, PageText, PdfExtractor,
};
pub use ingest::{
    discover_pdf_files, is_pdf_name, sanitize_filename, IngestionPipeline, IngestionReport,
    SkippedPdf,
};
pub use llm::{ChatMessage, OpenAiChat, DEFAULT_CHAT_MODEL};
pub use models::{
    filename_from_vector_id, vector_id, AnswerOutcome, ChunkMetadata, Citation, DocumentChunk,
    FileReport, IngestionOptions, QueryMatch, RetrievalOptions, VectorRecord, DEFAULT_MIN_SIMILARITY,
    DEFAULT_NAMESPACE, DEFAULT_TOP_K,
};
pub use orchestrator::{distinct_filenames, general_answer, RagCoordinator};
pub use stores::{
    IndexDescription, IndexStats, PineconeControlPlane, PineconeStore, ServerlessSpec,
    DEFAULT_CONTROL_PLANE_URL, DEFAULT_INDEX_NAME, DEFAULT_METRIC,
};
pub use traits::{ChatModel, VectorIndex};
