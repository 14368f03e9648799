use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::DomainError;

/// Sanitised agent identifier: lowercase ASCII letters, digits and hyphens.
///
/// This is the key the registry and the vector index agree on, so every
/// name entering the service goes through [`AgentName::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentName(String);

impl AgentName {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let name: String = raw
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
            .collect();

        if name.is_empty() {
            return Err(DomainError::validation(format!(
                "agent name '{raw}' has no valid characters"
            )));
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn collection(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.0)
    }
}

impl fmt::Display for AgentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AgentName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AgentName> for String {
    fn from(name: AgentName) -> Self {
        name.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmbeddingsStatus {
    Idle,
    InProgress,
    Failed,
}

impl EmbeddingsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::InProgress => "IN_PROGRESS",
            Self::Failed => "FAILED",
        }
    }
}

/// Ingestion state for one agent, as last written by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionStatus {
    pub agent_name: AgentName,
    pub status: EmbeddingsStatus,
    pub generation: u64,
    pub chunks: Option<usize>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl IngestionStatus {
    pub fn in_progress(agent_name: AgentName, generation: u64) -> Self {
        Self {
            agent_name,
            status: EmbeddingsStatus::InProgress,
            generation,
            chunks: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn idle(agent_name: AgentName, generation: u64, chunks: usize) -> Self {
        Self {
            agent_name,
            status: EmbeddingsStatus::Idle,
            generation,
            chunks: Some(chunks),
            error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn failed(agent_name: AgentName, generation: u64, error: impl Into<String>) -> Self {
        Self {
            agent_name,
            status: EmbeddingsStatus::Failed,
            generation,
            chunks: None,
            error: Some(error.into()),
            updated_at: Utc::now(),
        }
    }
}
