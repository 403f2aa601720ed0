use crate::chunking::build_document_chunks;
use crate::embeddings::Embedder;
use crate::extractor::{extract_document_text_with, LopdfExtractor, PdfExtractor};
use crate::traits::VectorIndex;
use crate::{FileReport, IngestError, IngestionOptions, VectorRecord};
use chrono::Utc;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// PDFs directly inside `folder`, sorted by path.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if is_pdf_name(&entry.path().to_string_lossy()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn is_pdf_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Reduces an uploaded name to a safe base name: directory parts are dropped
/// and anything outside `[A-Za-z0-9._-]` becomes `_`.
pub fn sanitize_filename(name: &str) -> Result<String, IngestError> {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let unsafe_chars = Regex::new(r"[^A-Za-z0-9._-]")?;
    let cleaned = unsafe_chars.replace_all(base, "_");

    // Leading dots come off the stem only, so the extension survives.
    let (stem, extension) = match cleaned.rsplit_once('.') {
        Some((stem, extension)) => (stem, Some(extension)),
        None => (cleaned.as_ref(), None),
    };
    let stem = stem.trim_start_matches('.');

    if stem.is_empty() || stem.chars().all(|c| c == '_') {
        return Err(IngestError::MissingFileName(name.to_string()));
    }
    Ok(match extension {
        Some(extension) => format!("{stem}.{extension}"),
        None => stem.to_string(),
    })
}

fn file_name(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })
}

#[derive(Debug)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub files: Vec<FileReport>,
    pub skipped_files: Vec<SkippedPdf>,
}

impl IngestionReport {
    pub fn upserted_vectors(&self) -> usize {
        self.files.iter().map(|file| file.upserted_count).sum()
    }
}

/// Extract, chunk, embed and upsert PDFs one file at a time.
pub struct IngestionPipeline<E, I> {
    embedder: E,
    index: I,
    extractor: Arc<dyn PdfExtractor + Send + Sync>,
    options: IngestionOptions,
}

impl<E, I> IngestionPipeline<E, I>
where
    E: Embedder + Send + Sync,
    I: VectorIndex + Send + Sync,
{
    pub fn new(embedder: E, index: I, options: IngestionOptions) -> Self {
        Self {
            embedder,
            index,
            extractor: Arc::new(LopdfExtractor),
            options,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PdfExtractor + Send + Sync>) -> Self {
        self.extractor = extractor;
        self
    }

    pub async fn ingest_file(&self, path: &Path) -> Result<FileReport, IngestError> {
        self.options.chunking.validate()?;

        // Ids are built from the sanitized name so CLI and upload ingestion agree.
        let filename = sanitize_filename(&file_name(path)?)?;
        info!(filename = %filename, path = %path.display(), "processing file");

        let checksum = digest_file(path)?;
        let extractor = Arc::clone(&self.extractor);
        let owned_path = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || {
            extract_document_text_with(extractor.as_ref(), &owned_path)
        })
        .await??;

        if text.trim().is_empty() {
            return Err(IngestError::EmptyDocument(filename));
        }
        debug!(filename = %filename, chars = text.len(), "extracted text");

        let chunks = build_document_chunks(&filename, &text, self.options.chunking)?;
        info!(
            filename = %filename,
            chunk_count = chunks.len(),
            model = self.embedder.model(),
            "split document into chunks"
        );

        let mut records = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            match self.embedder.embed(&chunk.text).await {
                Ok(values) => records.push(VectorRecord::from_chunk(chunk, values)),
                Err(error) => warn!(
                    filename = %filename,
                    chunk_id = chunk.chunk_id,
                    error = %error,
                    "embedding failed, chunk skipped"
                ),
            }
        }

        if records.is_empty() {
            return Err(IngestError::NoEmbeddings(filename));
        }

        let upserted_count = self
            .index
            .upsert(&self.options.namespace, &records)
            .await?;
        info!(
            filename = %filename,
            namespace = %self.options.namespace,
            upserted = upserted_count,
            "upserted vectors"
        );

        Ok(FileReport {
            filename,
            checksum,
            chunk_count: chunks.len(),
            embedded_count: records.len(),
            upserted_count,
            ingested_at: Utc::now(),
        })
    }

    /// Ingests every path; a failing file is logged and reported, never fatal.
    pub async fn ingest_files(&self, paths: &[PathBuf]) -> IngestionReport {
        let mut report = IngestionReport::default();

        for path in paths {
            match self.ingest_file(path).await {
                Ok(file) => report.files.push(file),
                Err(error) => {
                    error!(path = %path.display(), error = %error, "failed to ingest file");
                    report.skipped_files.push(SkippedPdf {
                        path: path.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        report
    }

    pub async fn ingest_folder(&self, folder: &Path) -> Result<IngestionReport, IngestError> {
        let files = discover_pdf_files(folder);

        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }

        Ok(self.ingest_files(&files).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkingConfig;
    use crate::extractor::PageText;
    use crate::{QueryMatch, SearchError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct WordCountEmbedder {
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl Embedder for WordCountEmbedder {
        fn model(&self) -> &str {
            "word-count"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
            if self.fail_on.is_some_and(|marker| text.contains(marker)) {
                return Err(SearchError::Request("rate limited".to_string()));
            }
            Ok(vec![text.split_whitespace().count() as f32, 1.0])
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        writes: Mutex<Vec<(String, Vec<VectorRecord>)>>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn upsert(
            &self,
            namespace: &str,
            records: &[VectorRecord],
        ) -> Result<usize, SearchError> {
            self.writes
                .lock()
                .unwrap()
                .push((namespace.to_string(), records.to_vec()));
            Ok(records.len())
        }

        async fn query(
            &self,
            _namespace: &str,
            _vector: &[f32],
            _top_k: usize,
        ) -> Result<Vec<QueryMatch>, SearchError> {
            Ok(Vec::new())
        }

        async fn list_ids(&self, _namespace: &str) -> Result<Vec<String>, SearchError> {
            Ok(Vec::new())
        }
    }

    /// Serves text from the file itself so tests need no real PDF.
    struct PlainTextExtractor;

    impl PdfExtractor for PlainTextExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
            let text = fs::read_to_string(path)?;
            Ok(vec![PageText { number: 1, text }])
        }
    }

    fn pipeline(
        fail_on: Option<&'static str>,
        max_words: usize,
    ) -> IngestionPipeline<WordCountEmbedder, RecordingIndex> {
        let options = IngestionOptions {
            chunking: ChunkingConfig { max_words },
            namespace: "ns1".to_string(),
        };
        IngestionPipeline::new(WordCountEmbedder { fail_on }, RecordingIndex::default(), options)
            .with_extractor(Arc::new(PlainTextExtractor))
    }

    #[test]
    fn discover_pdf_files_stays_in_folder() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        fs::write(base.join("b.PDF"), b"%PDF-1.4\n%fake")?;
        fs::write(base.join("a.pdf"), b"%PDF-1.4\n%fake")?;
        fs::write(base.join("notes.txt"), b"text")?;
        fs::write(nested.join("c.pdf"), b"%PDF-1.4\n%fake")?;

        let files = discover_pdf_files(base);
        let names = files
            .iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.pdf", "b.PDF"]);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.pdf");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn uploaded_names_are_sanitized() {
        assert_eq!(sanitize_filename("../../etc/Trust Deed (1).pdf").unwrap(), "Trust_Deed__1_.pdf");
        assert_eq!(sanitize_filename("C:\\docs\\wills.pdf").unwrap(), "wills.pdf");
        assert_eq!(sanitize_filename(".hidden.pdf").unwrap(), "hidden.pdf");
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("../").is_err());
    }

    #[test]
    fn leading_dots_never_eat_the_extension() {
        assert!(sanitize_filename("..pdf").is_err());
        assert!(sanitize_filename(".pdf").is_err());
        assert_eq!(sanitize_filename("...notes.pdf").unwrap(), "notes.pdf");
        assert_eq!(sanitize_filename("report..pdf").unwrap(), "report..pdf");
    }

    #[tokio::test]
    async fn ingestion_fails_without_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = pipeline(None, 500).ingest_folder(dir.path()).await;
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
        Ok(())
    }

    #[tokio::test]
    async fn file_is_chunked_embedded_and_upserted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("trusts.pdf");
        fs::write(&path, "one two three four five six seven")?;

        let pipeline = pipeline(None, 3);
        let report = pipeline.ingest_file(&path).await?;

        assert_eq!(report.filename, "trusts.pdf");
        assert_eq!(report.chunk_count, 3);
        assert_eq!(report.upserted_count, 3);

        let writes = pipeline.index.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        let (namespace, records) = &writes[0];
        assert_eq!(namespace, "ns1");
        let ids = records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["trusts.pdf_chunk_1", "trusts.pdf_chunk_2", "trusts.pdf_chunk_3"]);
        assert_eq!(records[2].metadata.text, "seven");
        assert_eq!(records[2].values, vec![1.0, 1.0]);
        Ok(())
    }

    #[tokio::test]
    async fn on_disk_names_are_sanitized_into_vector_ids() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("Trust Deed é.pdf");
        fs::write(&path, "settlor trustee")?;

        let pipeline = pipeline(None, 500);
        let report = pipeline.ingest_file(&path).await?;

        assert_eq!(report.filename, "Trust_Deed__.pdf");
        let writes = pipeline.index.writes.lock().unwrap();
        let record = &writes[0].1[0];
        assert_eq!(record.id, "Trust_Deed__.pdf_chunk_1");
        assert!(record.id.is_ascii());
        assert_eq!(record.metadata.filename, "Trust_Deed__.pdf");
        Ok(())
    }

    #[tokio::test]
    async fn failed_embedding_does_not_shift_chunk_text() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("deed.pdf");
        fs::write(&path, "alpha beta BROKEN gamma delta epsilon")?;

        let pipeline = pipeline(Some("BROKEN"), 2);
        let report = pipeline.ingest_file(&path).await?;

        assert_eq!(report.chunk_count, 3);
        assert_eq!(report.embedded_count, 2);

        let writes = pipeline.index.writes.lock().unwrap();
        let records = &writes[0].1;
        assert_eq!(records[0].id, "deed.pdf_chunk_1");
        assert_eq!(records[0].metadata.text, "alpha beta");
        assert_eq!(records[1].id, "deed.pdf_chunk_3");
        assert_eq!(records[1].metadata.text, "delta epsilon");
        Ok(())
    }

    #[tokio::test]
    async fn bad_files_are_skipped_and_reported() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("blank.pdf"), "   \n ")?;
        fs::write(dir.path().join("good.pdf"), "settlor trustee beneficiary")?;

        let report = pipeline(None, 500).ingest_folder(dir.path()).await?;

        assert_eq!(report.files.len(), 1);
        assert_eq!(report.files[0].filename, "good.pdf");
        assert_eq!(report.upserted_vectors(), 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            report.skipped_files[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("blank.pdf")
        );
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_pdf_is_skipped_with_default_extractor() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;

        let pipeline = IngestionPipeline::new(
            WordCountEmbedder { fail_on: None },
            RecordingIndex::default(),
            IngestionOptions::default(),
        );
        let report = pipeline.ingest_folder(dir.path()).await?;

        assert!(report.files.is_empty());
        assert_eq!(report.skipped_files.len(), 1);
        assert!(report.skipped_files[0].reason.contains("pdf parse error"));
        Ok(())
    }

    #[tokio::test]
    async fn all_embeddings_failing_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("x.pdf");
        fs::write(&path, "BROKEN")?;

        let result = pipeline(Some("BROKEN"), 10).ingest_file(&path).await;
        assert!(matches!(result, Err(IngestError::NoEmbeddings(_))));
        Ok(())
    }
}
