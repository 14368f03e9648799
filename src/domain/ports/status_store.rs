use crate::domain::{errors::DomainError, AgentName, IngestionStatus};
use async_trait::async_trait;

#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn get(&self, agent: &AgentName) -> Result<Option<IngestionStatus>, DomainError>;
    async fn set(&self, status: &IngestionStatus) -> Result<(), DomainError>;
}
