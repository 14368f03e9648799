use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::domain::{ChunkingConfig, DomainError, TokenChunker};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub status_store: StatusStoreConfig,
    pub ingestion: IngestionConfig,
    pub registry: RegistryConfig,
    pub generation: GenerationConfig,
    pub rag: RagConfig,
    pub prompts: PromptsConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn agents_dir(&self) -> PathBuf {
        self.data_dir.join("agents")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    OpenAi,
    Hashing,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            model: "text-embedding-3-small".to_string(),
            dimension: 384,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreProvider {
    Qdrant,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub provider: VectorStoreProvider,
    pub url: String,
    pub collection_prefix: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: VectorStoreProvider::Memory,
            url: "http://localhost:6334".to_string(),
            collection_prefix: "agent_".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusStoreProvider {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusStoreConfig {
    pub provider: StatusStoreProvider,
    pub url: String,
    pub ttl_seconds: u64,
}

impl Default for StatusStoreConfig {
    fn default() -> Self {
        Self {
            provider: StatusStoreProvider::Memory,
            url: "redis://localhost:6379".to_string(),
            ttl_seconds: 7 * 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub replace_existing: bool,
    pub embed_timeout_seconds: u64,
    pub commit_timeout_seconds: u64,
    pub status_timeout_seconds: u64,
    /// How long shutdown waits for running ingestions to record their state.
    pub shutdown_grace_seconds: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            replace_existing: true,
            embed_timeout_seconds: 120,
            commit_timeout_seconds: 300,
            status_timeout_seconds: 10,
            shutdown_grace_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// `None` turns status notification off.
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
    pub max_attempts: u32,
    pub backoff_millis: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: Some("http://app-server:8080".to_string()),
            timeout_seconds: 5,
            max_attempts: 3,
            backoff_millis: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://llm-server:8001/v1".to_string(),
            model: "default".to_string(),
            api_key: None,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub context_preamble: String,
    pub context_separator: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            context_preamble: "The following document chunks are relevant:".to_string(),
            context_separator: "\n\n".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl AppConfig {
    /// Reads the YAML file at `APP_CONFIG` (or the default path), falling back
    /// to built-in defaults when no file exists, then applies environment
    /// overrides and validates the result.
    pub fn load() -> Result<Self, DomainError> {
        let path = std::env::var("APP_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let path = Path::new(&path);

        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, DomainError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DomainError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, DomainError> {
        serde_yaml::from_str(raw).map_err(|e| DomainError::configuration(e.to_string()))
    }

    fn apply_env(&mut self) -> Result<(), DomainError> {
        if let Ok(host) = std::env::var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SERVER_PORT") {
            self.server.port = parse_env("SERVER_PORT", &port)?;
        }
        if let Ok(dir) = std::env::var("DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("QDRANT_URL") {
            self.vector_store.provider = VectorStoreProvider::Qdrant;
            self.vector_store.url = url;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.status_store.provider = StatusStoreProvider::Redis;
            self.status_store.url = url;
        }
        if let Ok(url) = std::env::var("REGISTRY_URL") {
            self.registry.base_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            self.generation.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL_NAME") {
            self.generation.model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            self.generation.api_key = Some(key);
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL_NAME") {
            self.embedding.model = model;
        }
        if let Ok(workers) = std::env::var("WORKER_CONCURRENCY") {
            self.ingestion.workers = parse_env("WORKER_CONCURRENCY", &workers)?;
        }
        Ok(())
    }

    /// Fails fast on settings that would otherwise only surface mid-run.
    pub fn validate(&self) -> Result<(), DomainError> {
        TokenChunker::from_config(&self.chunking)?;

        if self.embedding.dimension == 0 {
            return Err(DomainError::configuration(
                "embedding.dimension must be positive",
            ));
        }
        if self.ingestion.workers == 0 {
            return Err(DomainError::configuration(
                "ingestion.workers must be positive",
            ));
        }
        if self.ingestion.queue_capacity == 0 {
            return Err(DomainError::configuration(
                "ingestion.queue_capacity must be positive",
            ));
        }
        if self.rag.top_k == 0 {
            return Err(DomainError::configuration("rag.top_k must be positive"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, DomainError> {
    value
        .parse()
        .map_err(|_| DomainError::configuration(format!("invalid value for {key}: '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.chunking.chunk_size, 512);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.vector_store.collection_prefix, "agent_");
        assert!(config.ingestion.replace_existing);
        assert_eq!(config.ingestion.commit_timeout_seconds, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml(
            r#"
server:
  port: 9100
embedding:
  provider: openai
  dimension: 1536
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.embedding.provider, EmbeddingProvider::OpenAi);
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.chunking.chunk_size, 512);
    }

    #[test]
    fn test_invalid_overlap_is_configuration_error() {
        let config = AppConfig::from_yaml(
            r#"
chunking:
  chunk_size: 100
  chunk_overlap: 100
"#,
        )
        .unwrap();

        assert!(matches!(
            config.validate(),
            Err(DomainError::Configuration(_))
        ));
    }

    #[test]
    fn test_malformed_yaml_is_configuration_error() {
        assert!(matches!(
            AppConfig::from_yaml("server: [unterminated"),
            Err(DomainError::Configuration(_))
        ));
    }

    #[test]
    fn test_registry_can_be_disabled() {
        let config = AppConfig::from_yaml("registry:\n  base_url: null\n").unwrap();
        assert!(config.registry.base_url.is_none());
    }
}
