mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_rag_core::{
    general_answer, ChunkingConfig, IngestionOptions, IngestionPipeline, OpenAiChat,
    OpenAiEmbedder, PineconeControlPlane, PineconeStore, RagCoordinator, RetrievalOptions,
    ServerlessSpec,
    DEFAULT_CHAT_MODEL, DEFAULT_CONTROL_PLANE_URL, DEFAULT_EMBEDDING_MODEL, DEFAULT_INDEX_NAME,
    DEFAULT_METRIC, DEFAULT_NAMESPACE, DEFAULT_OPENAI_BASE_URL,
};
use server::{AppState, SharedChat, SharedEmbedder, SharedIndex};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version, about = "Index PDFs into Pinecone and ask questions over them")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: String,

    /// Embedding model
    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    openai_model: String,

    /// Chat model used for relevance checks and answers
    #[arg(long, env = "OPENAI_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    openai_chat_model: String,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    openai_base_url: String,

    /// Completion token limit for chat calls
    #[arg(long, env = "OPENAI_MAX_TOKENS", default_value = "500")]
    max_tokens: u32,

    /// Sampling temperature for chat calls
    #[arg(long, env = "OPENAI_TEMPERATURE", default_value = "0.3")]
    temperature: f32,

    /// Pinecone API key
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pinecone_api_key: String,

    /// Pinecone index name
    #[arg(long, env = "PINECONE_INDEX", default_value = DEFAULT_INDEX_NAME)]
    pinecone_index: String,

    /// Index host; skips the lookup by name when set
    #[arg(long, env = "PINECONE_INDEX_HOST")]
    pinecone_index_host: Option<String>,

    /// Pinecone control plane URL
    #[arg(long, env = "PINECONE_CONTROL_PLANE_URL", default_value = DEFAULT_CONTROL_PLANE_URL)]
    pinecone_control_plane_url: String,

    /// Namespace that holds the vectors
    #[arg(long, env = "PINECONE_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Words per chunk
    #[arg(long, env = "CHUNK_WORDS", default_value = "500")]
    chunk_words: usize,

    /// Vectors per upsert request
    #[arg(long, default_value = "100")]
    upsert_batch_size: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Create the serverless index unless it already exists.
    SetupIndex {
        /// Vector dimension; must match the embedding model.
        #[arg(long, default_value = "1536")]
        dimension: usize,
        #[arg(long, default_value = DEFAULT_METRIC)]
        metric: String,
        #[arg(long, default_value = "aws")]
        cloud: String,
        #[arg(long, default_value = "us-east-1")]
        region: String,
    },
    /// Extract, chunk, embed and upsert PDFs.
    Ingest {
        /// Folder whose PDFs are ingested when no --file is given.
        #[arg(long, env = "PDF_DIRECTORY", default_value = "uploads")]
        folder: PathBuf,
        /// Individual PDF files to ingest.
        #[arg(long = "file")]
        files: Vec<PathBuf>,
    },
    /// Retrieve the closest chunks, optionally with a generated answer.
    Query {
        #[arg(long)]
        question: String,
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Ask the chat model for a cited answer.
        #[arg(long, default_value_t = false)]
        answer: bool,
        /// Matches below this similarity are not used for the answer.
        #[arg(long, default_value = "0.25")]
        min_similarity: f64,
    },
    /// List the distinct filenames stored in the namespace.
    ListFiles,
    /// Show vector counts per namespace.
    Stats,
    /// Ask the chat model directly, without document context.
    Chat {
        #[arg(long)]
        message: String,
    },
    /// Serve the upload and query HTTP API.
    Serve {
        #[arg(long, default_value = "127.0.0.1:5000")]
        bind: String,
        #[arg(long, env = "PDF_DIRECTORY", default_value = "uploads")]
        upload_dir: PathBuf,
        #[arg(long, default_value = "5")]
        top_k: usize,
        #[arg(long, default_value = "0.25")]
        min_similarity: f64,
    },
}

impl Cli {
    fn embedder(&self) -> OpenAiEmbedder {
        OpenAiEmbedder::new(self.openai_api_key.clone())
            .with_model(&self.openai_model)
            .with_base_url(&self.openai_base_url)
    }

    fn chat(&self) -> OpenAiChat {
        OpenAiChat::new(self.openai_api_key.clone())
            .with_model(&self.openai_chat_model)
            .with_base_url(&self.openai_base_url)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
    }

    fn control_plane(&self) -> anyhow::Result<PineconeControlPlane> {
        Ok(PineconeControlPlane::new(
            &self.pinecone_control_plane_url,
            self.pinecone_api_key.clone(),
        )?)
    }

    async fn store(&self) -> anyhow::Result<PineconeStore> {
        let store = match &self.pinecone_index_host {
            Some(host) => PineconeStore::new(host, self.pinecone_api_key.clone())?,
            None => self
                .control_plane()?
                .open_index(&self.pinecone_index)
                .await
                .with_context(|| format!("failed to access index '{}'", self.pinecone_index))?,
        };
        info!(index = %self.pinecone_index, host = %store.host(), "index accessed");
        Ok(store.with_batch_size(self.upsert_batch_size))
    }

    fn ingestion_options(&self) -> IngestionOptions {
        IngestionOptions {
            chunking: ChunkingConfig {
                max_words: self.chunk_words,
            },
            namespace: self.namespace.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    match &cli.command {
        Command::SetupIndex {
            dimension,
            metric,
            cloud,
            region,
        } => {
            let control = cli.control_plane()?;
            match control.describe_index(&cli.pinecone_index).await? {
                Some(existing) => {
                    println!(
                        "index '{}' already exists (dimension={} metric={} host={})",
                        existing.name, existing.dimension, existing.metric, existing.host
                    );
                }
                None => {
                    let spec = ServerlessSpec {
                        cloud: cloud.clone(),
                        region: region.clone(),
                    };
                    let created = control
                        .create_serverless_index(&cli.pinecone_index, *dimension, metric, &spec)
                        .await?;
                    println!(
                        "created index '{}' (dimension={} metric={})",
                        created.name, created.dimension, created.metric
                    );
                }
            }
        }
        Command::Ingest { folder, files } => {
            let pipeline =
                IngestionPipeline::new(cli.embedder(), cli.store().await?, cli.ingestion_options());

            let report = if files.is_empty() {
                pipeline.ingest_folder(folder).await?
            } else {
                pipeline.ingest_files(files).await
            };

            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }
            for file in &report.files {
                println!(
                    "{}: {} chunks, {} embedded, {} upserted into namespace '{}'",
                    file.filename,
                    file.chunk_count,
                    file.embedded_count,
                    file.upserted_count,
                    cli.namespace
                );
            }
            println!(
                "{} vectors upserted from {} file(s), {} skipped, at {}",
                report.upserted_vectors(),
                report.files.len(),
                report.skipped_files.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Query {
            question,
            top_k,
            answer,
            min_similarity,
        } => {
            let coordinator =
                RagCoordinator::new(cli.embedder(), cli.store().await?, cli.chat(), &cli.namespace);

            if *answer {
                let outcome = coordinator
                    .answer(
                        question,
                        RetrievalOptions {
                            top_k: *top_k,
                            min_similarity: *min_similarity,
                        },
                    )
                    .await?;

                print_matches(&outcome.matches);
                println!("\n=== AI Generated Answer ===\n");
                println!("{}", outcome.answer);
                if outcome.grounded {
                    for citation in &outcome.citations {
                        println!(
                            "source: {} chunk {} ({:.2}%)",
                            citation.filename, citation.chunk_id, citation.similarity_percent
                        );
                    }
                } else {
                    println!("(no relevant excerpts found; answered without document context)");
                }
            } else {
                let matches = coordinator.retrieve(question, *top_k).await?;
                print_matches(&matches);
            }
        }
        Command::ListFiles => {
            let coordinator =
                RagCoordinator::new(cli.embedder(), cli.store().await?, cli.chat(), &cli.namespace);
            let filenames = coordinator.list_filenames().await?;
            if filenames.is_empty() {
                println!("no files in namespace '{}'", cli.namespace);
            }
            for filename in filenames {
                println!("{filename}");
            }
        }
        Command::Stats => {
            let stats = cli.store().await?.describe_stats().await?;
            println!(
                "dimension={} total_vectors={}",
                stats.dimension, stats.total_vector_count
            );
            for (namespace, namespace_stats) in stats.namespaces {
                println!("namespace={namespace} vectors={}", namespace_stats.vector_count);
            }
        }
        Command::Chat { message } => {
            println!("AI: {}", general_answer(&cli.chat(), message).await?);
        }
        Command::Serve {
            bind,
            upload_dir,
            top_k,
            min_similarity,
        } => {
            let embedder: SharedEmbedder = Arc::new(cli.embedder());
            let index: SharedIndex = Arc::new(cli.store().await?);
            let chat: SharedChat = Arc::new(cli.chat());

            let state = AppState {
                pipeline: IngestionPipeline::new(
                    Arc::clone(&embedder),
                    Arc::clone(&index),
                    cli.ingestion_options(),
                ),
                coordinator: RagCoordinator::new(embedder, index, chat, &cli.namespace),
                upload_dir: upload_dir.clone(),
                retrieval: RetrievalOptions {
                    top_k: *top_k,
                    min_similarity: *min_similarity,
                },
            };

            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            info!(address = %listener.local_addr()?, upload_dir = %upload_dir.display(), "listening");
            axum::serve(listener, server::router(Arc::new(state))).await?;
        }
    }

    Ok(())
}

fn print_matches(matches: &[pdf_rag_core::QueryMatch]) {
    if matches.is_empty() {
        println!("No matches found.");
        return;
    }

    println!("Top {} results:", matches.len());
    for found in matches {
        println!(
            "Filename: {}, Chunk ID: {}, Similarity: {:.2}%",
            found.metadata.filename,
            found.metadata.chunk_id,
            found.similarity_percent()
        );
        println!("Text: {}\n{}", found.metadata.text, "-".repeat(80));
    }
}
