use crate::embeddings::Embedder;
use crate::llm::ChatMessage;
use crate::models::filename_from_vector_id;
use crate::prompts::{
    answer_prompt, extraction_prompt, parse_relevance_verdict, relevance_prompt, Evidence,
    SYSTEM_PROMPT,
};
use crate::traits::{ChatModel, VectorIndex};
use crate::{AnswerOutcome, Citation, QueryMatch, RetrievalOptions, SearchError};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Chat answer that needs no index, for the standalone chat path.
pub async fn general_answer<C>(chat: &C, message: &str) -> Result<String, SearchError>
where
    C: ChatModel + ?Sized,
{
    let message = message.trim();
    if message.is_empty() {
        return Err(SearchError::Request("message is empty".to_string()));
    }

    chat.complete(&[ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(message)])
        .await
}

/// Query side of the system: embed a question, fetch nearby chunks and,
/// when asked, turn them into a cited answer.
pub struct RagCoordinator<E, I, C> {
    embedder: E,
    index: I,
    chat: C,
    namespace: String,
}

impl<E, I, C> RagCoordinator<E, I, C>
where
    E: Embedder + Send + Sync,
    I: VectorIndex + Send + Sync,
    C: ChatModel + Send + Sync,
{
    pub fn new(embedder: E, index: I, chat: C, namespace: impl Into<String>) -> Self {
        Self {
            embedder,
            index,
            chat,
            namespace: namespace.into(),
        }
    }

    pub async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, SearchError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }
        if top_k == 0 {
            return Err(SearchError::Request("top_k must be at least 1".to_string()));
        }

        info!(question, "embedding the query");
        let vector = self.embedder.embed(question).await?;

        info!(namespace = %self.namespace, top_k, "querying index for similar vectors");
        let matches = self.index.query(&self.namespace, &vector, top_k).await?;
        debug!(matches = matches.len(), "retrieved matches");
        Ok(matches)
    }

    pub async fn answer(
        &self,
        question: &str,
        options: RetrievalOptions,
    ) -> Result<AnswerOutcome, SearchError> {
        let matches = self.retrieve(question, options.top_k).await?;
        let question = question.trim();

        let candidates = matches
            .iter()
            .filter(|found| found.score >= options.min_similarity)
            .collect::<Vec<_>>();
        debug!(
            kept = candidates.len(),
            dropped = matches.len() - candidates.len(),
            min_similarity = options.min_similarity,
            "similarity filter"
        );

        let mut evidence = Vec::new();
        for found in candidates {
            if !self.is_relevant(question, found).await {
                continue;
            }
            let text = self.extract_relevant(question, found).await;
            evidence.push(Evidence {
                source: found,
                text,
            });
        }

        if evidence.is_empty() {
            info!("no relevant excerpts, answering without document context");
            let answer = self.general_answer(question).await?;
            return Ok(AnswerOutcome {
                question: question.to_string(),
                answer,
                grounded: false,
                citations: Vec::new(),
                matches,
            });
        }

        let citations = evidence
            .iter()
            .map(|item| Citation::from(item.source))
            .collect::<Vec<_>>();
        let prompt = answer_prompt(question, &evidence);

        info!(excerpts = evidence.len(), "generating answer");
        let answer = self
            .chat
            .complete(&[ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)])
            .await?;

        Ok(AnswerOutcome {
            question: question.to_string(),
            answer,
            grounded: true,
            citations,
            matches,
        })
    }

    /// Unconditioned chat answer with no retrieved context.
    pub async fn general_answer(&self, message: &str) -> Result<String, SearchError> {
        general_answer(&self.chat, message).await
    }

    /// Distinct filenames that have at least one vector in the namespace.
    pub async fn list_filenames(&self) -> Result<Vec<String>, SearchError> {
        let ids = self.index.list_ids(&self.namespace).await?;
        Ok(distinct_filenames(&ids))
    }

    async fn is_relevant(&self, question: &str, found: &QueryMatch) -> bool {
        let prompt = relevance_prompt(question, &found.metadata.text);
        match self.chat.complete(&[ChatMessage::user(prompt)]).await {
            Ok(reply) => {
                let verdict = parse_relevance_verdict(&reply);
                debug!(id = %found.id, reply = %reply, ?verdict, "relevance verdict");
                verdict.unwrap_or(false)
            }
            Err(error) => {
                warn!(id = %found.id, error = %error, "relevance check failed, excerpt dropped");
                false
            }
        }
    }

    async fn extract_relevant(&self, question: &str, found: &QueryMatch) -> String {
        let prompt = extraction_prompt(question, &found.metadata.text);
        match self.chat.complete(&[ChatMessage::user(prompt)]).await {
            Ok(extracted) if !extracted.trim().is_empty() => extracted,
            Ok(_) => found.metadata.text.clone(),
            Err(error) => {
                warn!(id = %found.id, error = %error, "extraction failed, using full chunk");
                found.metadata.text.clone()
            }
        }
    }
}

pub fn distinct_filenames(ids: &[String]) -> Vec<String> {
    ids.iter()
        .filter_map(|id| filename_from_vector_id(id))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
