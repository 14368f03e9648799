use async_trait::async_trait;
use rig::client::{EmbeddingsClient, ProviderClient};
use rig::embeddings::EmbeddingsBuilder;
use rig::providers::openai;

use crate::domain::{ports::EmbeddingService, DomainError, Embedding};
use crate::infrastructure::config::EmbeddingConfig;

/// Remote embedder backed by the OpenAI embeddings API.
pub struct TextEmbedding {
    model: String,
    dimension: usize,
}

impl TextEmbedding {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            model: config.model.clone(),
            dimension: config.dimension,
        }
    }

    fn to_embedding(&self, vec: Vec<f64>) -> Result<Embedding, DomainError> {
        if vec.len() != self.dimension {
            return Err(DomainError::dimension_mismatch(self.dimension, vec.len()));
        }
        Ok(Embedding::new(vec.into_iter().map(|x| x as f32).collect()))
    }
}

#[async_trait]
impl EmbeddingService for TextEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::internal("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if std::env::var_os("OPENAI_API_KEY").is_none() {
            return Err(DomainError::configuration(
                "OPENAI_API_KEY must be set for the openai embedding provider",
            ));
        }
        let client = openai::Client::from_env();
        let model = client.embedding_model(&self.model);

        let mut builder = EmbeddingsBuilder::new(model);
        for text in texts {
            builder = builder
                .document(*text)
                .map_err(|e| DomainError::external(e.to_string()))?;
        }

        let embeddings = builder
            .build()
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(DomainError::external(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        embeddings
            .into_iter()
            .map(|(_doc, emb)| self.to_embedding(emb.first().vec))
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
