use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::domain::{ports::DocumentSource, AgentName, Document, DomainError};

/// Agent documents stored as plain files under `<root>/<agent>/`.
pub struct FsDocumentSource {
    root: PathBuf,
}

impl FsDocumentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn agent_dir(&self, agent: &AgentName) -> PathBuf {
        self.root.join(agent.as_str())
    }

    fn file_path(&self, agent: &AgentName, name: &str) -> Result<PathBuf, DomainError> {
        let candidate = Path::new(name);
        let is_plain = candidate.components().count() == 1
            && candidate.file_name().is_some_and(|f| f == candidate.as_os_str());
        if !is_plain {
            return Err(DomainError::validation(format!(
                "invalid document name '{name}'"
            )));
        }
        Ok(self.agent_dir(agent).join(candidate))
    }
}

#[async_trait]
impl DocumentSource for FsDocumentSource {
    async fn list(&self, agent: &AgentName) -> Result<Vec<String>, DomainError> {
        let dir = self.agent_dir(agent);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DomainError::not_found(format!(
                    "document directory for agent {agent}"
                )));
            }
            Err(e) => return Err(DomainError::internal(e.to_string())),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DomainError::internal(e.to_string()))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| DomainError::internal(e.to_string()))?;
            if !file_type.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    async fn read(&self, agent: &AgentName, name: &str) -> Result<Document, DomainError> {
        let path = self.file_path(agent, name)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            DomainError::ingestion(format!("cannot read {}: {e}", path.display()))
        })?;

        Ok(Document::new(name, String::from_utf8_lossy(&bytes)))
    }
}
