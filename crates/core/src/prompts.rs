//! Prompt text for the relevance, extraction and answer calls.

use crate::models::QueryMatch;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub fn relevance_prompt(question: &str, excerpt: &str) -> String {
    format!(
        "Decide whether the excerpt below contains information that helps answer the question.\n\
         Reply with exactly one word: true or false.\n\n\
         Question: {question}\n\n\
         Excerpt:\n{excerpt}"
    )
}

/// Reads a `true`/`false` reply. Anything else is `None`.
pub fn parse_relevance_verdict(reply: &str) -> Option<bool> {
    let word = reply
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_ascii_lowercase();

    match word.as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

pub fn extraction_prompt(question: &str, excerpt: &str) -> String {
    format!(
        "Copy, word for word, only the sentences from the excerpt that help answer the question. \
         Do not add commentary.\n\n\
         Question: {question}\n\n\
         Excerpt:\n{excerpt}"
    )
}

/// A retrieved match paired with the text that goes into the answer prompt.
#[derive(Debug, Clone)]
pub struct Evidence<'a> {
    pub source: &'a QueryMatch,
    pub text: String,
}

pub fn answer_prompt(question: &str, evidence: &[Evidence<'_>]) -> String {
    let mut prompt = format!(
        "You are an AI assistant. Based on the following excerpts from various documents, \
         answer the question below as thoroughly as possible. If the provided data is insufficient, \
         state that there is insufficient relevant data.\n\n\
         Question: {question}\n\n\
         Excerpts:\n"
    );

    for item in evidence {
        prompt.push_str(&format!(
            "Filename: {}, Chunk ID: {}, Similarity: {:.2}%\n",
            item.source.metadata.filename,
            item.source.metadata.chunk_id,
            item.source.similarity_percent()
        ));
        prompt.push_str(&format!("Text: {}\n\n", item.text));
    }

    prompt.push_str(
        "Provide a comprehensive answer to the question based on the above excerpts. \
         Cite the sources by filename and chunk ID where applicable. \
         If the excerpts do not provide enough information to answer the question, \
         state that there is insufficient relevant data.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkMetadata;

    #[test]
    fn verdicts_tolerate_case_and_punctuation() {
        assert_eq!(parse_relevance_verdict("True"), Some(true));
        assert_eq!(parse_relevance_verdict(" false.\n"), Some(false));
        assert_eq!(parse_relevance_verdict("\"TRUE\" - it mentions trusts"), Some(true));
        assert_eq!(parse_relevance_verdict("maybe"), None);
        assert_eq!(parse_relevance_verdict(""), None);
    }

    #[test]
    fn answer_prompt_lists_citations() {
        let found = QueryMatch {
            id: "trusts.pdf_chunk_2".to_string(),
            score: 0.8123,
            metadata: ChunkMetadata {
                filename: "trusts.pdf".to_string(),
                chunk_id: 2,
                text: "full chunk".to_string(),
            },
        };
        let evidence = vec![Evidence {
            source: &found,
            text: "Express trusts and implied trusts.".to_string(),
        }];

        let prompt = answer_prompt("What are the two types of Trust?", &evidence);

        assert!(prompt.contains("Question: What are the two types of Trust?"));
        assert!(prompt.contains("Filename: trusts.pdf, Chunk ID: 2, Similarity: 81.23%"));
        assert!(prompt.contains("Text: Express trusts and implied trusts."));
        assert!(prompt.ends_with("state that there is insufficient relevant data."));
    }
}
