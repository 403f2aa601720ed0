use crate::error::IngestError;
use crate::models::DocumentChunk;

pub const DEFAULT_CHUNK_WORDS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_words: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_CHUNK_WORDS,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_words == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_words must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Splits `text` into consecutive groups of at most `max_words` words.
///
/// Words are whatever `split_whitespace` yields; groups never overlap and the
/// last one may be shorter.
pub fn split_words(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;

    let words = text.split_whitespace().collect::<Vec<_>>();
    Ok(words
        .chunks(config.max_words)
        .map(|group| group.join(" "))
        .collect())
}

pub fn build_document_chunks(
    filename: &str,
    text: &str,
    config: ChunkingConfig,
) -> Result<Vec<DocumentChunk>, IngestError> {
    let pieces = split_words(text, config)?;

    Ok(pieces
        .into_iter()
        .zip(1u32..)
        .map(|(text, chunk_id)| DocumentChunk {
            filename: filename.to_string(),
            chunk_id,
            text,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_whitespace_separates_words() {
        let chunks = split_words("A  \t  lot\nof\u{a0}spacing", ChunkingConfig { max_words: 10 })
            .unwrap();
        assert_eq!(chunks, vec!["A lot of spacing"]);
    }

    #[test]
    fn words_are_grouped_without_overlap() {
        let text = "one two three four five six seven";
        let chunks = split_words(text, ChunkingConfig { max_words: 3 }).unwrap();

        assert_eq!(
            chunks,
            vec!["one two three", "four five six", "seven"]
        );
    }

    #[test]
    fn exact_multiple_produces_no_trailing_chunk() {
        let text = "a b c d";
        let chunks = split_words(text, ChunkingConfig { max_words: 2 }).unwrap();
        assert_eq!(chunks, vec!["a b", "c d"]);
    }

    #[test]
    fn blank_text_has_no_chunks() {
        let chunks = split_words(" \n\t ", ChunkingConfig::default()).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn zero_word_chunks_are_rejected() {
        let result = split_words("text", ChunkingConfig { max_words: 0 });
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }

    #[test]
    fn default_chunk_holds_five_hundred_words() {
        let text = vec!["word"; 1_001].join(" ");
        let chunks = split_words(&text, ChunkingConfig::default()).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].split_whitespace().count(), 500);
        assert_eq!(chunks[1].split_whitespace().count(), 500);
        assert_eq!(chunks[2], "word");
    }

    #[test]
    fn document_chunks_are_numbered_from_one() {
        let chunks =
            build_document_chunks("deed.pdf", "a b c", ChunkingConfig { max_words: 2 }).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_id, 1);
        assert_eq!(chunks[0].text, "a b");
        assert_eq!(chunks[1].chunk_id, 2);
        assert_eq!(chunks[1].vector_id(), "deed.pdf_chunk_2");
    }
}
