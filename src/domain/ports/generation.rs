use crate::domain::{errors::DomainError, Message};
use async_trait::async_trait;

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<Message, DomainError>;
}
