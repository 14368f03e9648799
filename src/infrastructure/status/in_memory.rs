use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::{ports::StatusStore, AgentName, DomainError, IngestionStatus};

#[derive(Default)]
pub struct InMemoryStatusStore {
    statuses: RwLock<HashMap<AgentName, IngestionStatus>>,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for InMemoryStatusStore {
    async fn get(&self, agent: &AgentName) -> Result<Option<IngestionStatus>, DomainError> {
        let statuses = self
            .statuses
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        Ok(statuses.get(agent).cloned())
    }

    async fn set(&self, status: &IngestionStatus) -> Result<(), DomainError> {
        let mut statuses = self
            .statuses
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;
        statuses.insert(status.agent_name.clone(), status.clone());
        Ok(())
    }
}
