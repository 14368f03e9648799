use crate::domain::{errors::DomainError, AgentName, Document};
use async_trait::async_trait;

/// Read access to the files uploaded for an agent.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fails with `NotFound` when the agent has no document area at all.
    async fn list(&self, agent: &AgentName) -> Result<Vec<String>, DomainError>;
    async fn read(&self, agent: &AgentName, name: &str) -> Result<Document, DomainError>;
}
