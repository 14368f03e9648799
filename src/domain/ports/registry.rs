use crate::domain::{errors::DomainError, AgentName, EmbeddingsStatus};
use async_trait::async_trait;

/// Pushes `embeddings_status` changes to the service that owns agent records.
#[async_trait]
pub trait RegistryNotifier: Send + Sync {
    async fn notify(&self, agent: &AgentName, status: EmbeddingsStatus)
        -> Result<(), DomainError>;
}
