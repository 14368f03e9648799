use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Config, Connection, Pool, Runtime};

use crate::domain::{ports::StatusStore, AgentName, DomainError, IngestionStatus};

pub type RedisPool = Pool;

pub mod keys {
    use crate::domain::AgentName;

    pub fn ingestion_status(agent: &AgentName) -> String {
        format!("ingestion:status:{}", agent)
    }
}

pub fn create_pool(redis_url: &str) -> Result<RedisPool, DomainError> {
    let cfg = Config::from_url(redis_url);
    cfg.create_pool(Some(Runtime::Tokio1))
        .map_err(|e| DomainError::configuration(format!("redis pool: {e}")))
}

/// Status records shared through Redis so other processes can read them.
#[derive(Clone)]
pub struct RedisStatusStore {
    pool: RedisPool,
    ttl_seconds: u64,
}

impl RedisStatusStore {
    pub fn new(pool: RedisPool, ttl_seconds: u64) -> Self {
        Self { pool, ttl_seconds }
    }

    async fn conn(&self) -> Result<Connection, DomainError> {
        self.pool
            .get()
            .await
            .map_err(|e| DomainError::external(format!("redis pool: {e}")))
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn get(&self, agent: &AgentName) -> Result<Option<IngestionStatus>, DomainError> {
        let mut conn = self.conn().await?;
        let result: Option<String> = conn
            .get(keys::ingestion_status(agent))
            .await
            .map_err(|e| DomainError::external(e.to_string()))?;

        result
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| DomainError::internal(e.to_string()))
            })
            .transpose()
    }

    async fn set(&self, status: &IngestionStatus) -> Result<(), DomainError> {
        let json =
            serde_json::to_string(status).map_err(|e| DomainError::internal(e.to_string()))?;
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(
            keys::ingestion_status(&status.agent_name),
            &json,
            self.ttl_seconds,
        )
        .await
        .map_err(|e| DomainError::external(e.to_string()))
    }
}
