use std::sync::Arc;

use crate::application::{ChatService, IngestionCoordinator, RagService};
use crate::domain::ports::VectorStore;
use crate::infrastructure::{AppConfig, RedisPool};

#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<IngestionCoordinator>,
    pub rag_service: Arc<RagService>,
    pub chat_service: Arc<ChatService>,
    pub vector_store: Arc<dyn VectorStore>,
    pub redis_pool: Option<RedisPool>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        ingestion: Arc<IngestionCoordinator>,
        rag_service: Arc<RagService>,
        chat_service: Arc<ChatService>,
        vector_store: Arc<dyn VectorStore>,
        config: AppConfig,
    ) -> Self {
        Self {
            ingestion,
            rag_service,
            chat_service,
            vector_store,
            redis_pool: None,
            config: Arc::new(config),
        }
    }

    pub fn with_redis_pool(mut self, pool: RedisPool) -> Self {
        self.redis_pool = Some(pool);
        self
    }
}
