use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::domain::{
    ports::{EmbeddingService, VectorStore},
    AgentName, DomainError, Message, SearchResult,
};

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub context_preamble: String,
    pub context_separator: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            context_preamble: "The following document chunks are relevant:".to_string(),
            context_separator: "\n\n".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub agent_name: AgentName,
    pub prompt: String,
    pub results: Vec<String>,
}

/// Query-time half of the pipeline: top-k retrieval from an agent's
/// collection and assembly of the message sequence sent for generation.
pub struct RagService {
    embedding: Arc<dyn EmbeddingService>,
    vector_store: Arc<dyn VectorStore>,
    collection_prefix: String,
    default_top_k: usize,
    template: PromptTemplate,
    embed_timeout: Duration,
}

impl RagService {
    pub fn new(
        embedding: Arc<dyn EmbeddingService>,
        vector_store: Arc<dyn VectorStore>,
        default_top_k: usize,
    ) -> Self {
        Self {
            embedding,
            vector_store,
            collection_prefix: "agent_".to_string(),
            default_top_k,
            template: PromptTemplate::default(),
            embed_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_collection_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.collection_prefix = prefix.into();
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    #[instrument(skip_all, fields(agent = %agent, top_k))]
    pub async fn retrieve_top_k(
        &self,
        agent: &AgentName,
        prompt: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let embedding = tokio::time::timeout(self.embed_timeout, self.embedding.embed(prompt))
            .await
            .map_err(|_| DomainError::timeout("query embedding"))??;

        let results = self
            .vector_store
            .query(&agent.collection(&self.collection_prefix), &embedding, top_k)
            .await?;

        tracing::debug!(hits = results.len(), "retrieved");
        Ok(results)
    }

    pub async fn query(
        &self,
        agent: &AgentName,
        prompt: &str,
        top_k: Option<usize>,
    ) -> Result<QueryResult, DomainError> {
        let top_k = top_k.unwrap_or(self.default_top_k);
        let results = self.retrieve_top_k(agent, prompt, top_k).await?;

        Ok(QueryResult {
            agent_name: agent.clone(),
            prompt: prompt.to_string(),
            results: results.into_iter().map(|r| r.content).collect(),
        })
    }

    /// `[system: instruction] + [system: context]? + history + [user: prompt]`.
    pub async fn compose(
        &self,
        instruction: &str,
        agent: &AgentName,
        history: &[Message],
        user_prompt: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<Message>, DomainError> {
        let top_k = top_k.unwrap_or(self.default_top_k);
        let chunks: Vec<String> = self
            .retrieve_top_k(agent, user_prompt, top_k)
            .await?
            .into_iter()
            .map(|r| r.content)
            .collect();

        Ok(self.compose_messages(instruction, &chunks, history, user_prompt))
    }

    pub fn compose_messages(
        &self,
        instruction: &str,
        chunks: &[String],
        history: &[Message],
        user_prompt: &str,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(Message::system(instruction));

        if !chunks.is_empty() {
            messages.push(Message::system(format!(
                "{}\n{}",
                self.template.context_preamble,
                chunks.join(&self.template.context_separator)
            )));
        }

        messages.extend(history.iter().cloned());
        messages.push(Message::user(user_prompt));
        messages
    }
}
