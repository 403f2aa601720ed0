pub mod pinecone;

pub use pinecone::{
    IndexDescription, IndexStats, PineconeControlPlane, PineconeStore, ServerlessSpec,
    DEFAULT_CONTROL_PLANE_URL, DEFAULT_INDEX_NAME, DEFAULT_METRIC,
};
