use knowledge_server::api::{create_router, AppState};
use knowledge_server::application::{
    ChatService, IngestionCoordinator, IngestionDeps, IngestionSettings, PromptTemplate,
    RagService,
};
use knowledge_server::domain::ports::{
    EmbeddingService, GenerationClient, RegistryNotifier, StatusStore, VectorStore,
};
use knowledge_server::domain::TokenChunker;
use knowledge_server::infrastructure::config::{
    EmbeddingProvider, StatusStoreProvider, VectorStoreProvider,
};
use knowledge_server::infrastructure::{
    create_pool, AppConfig, FsDocumentSource, HashingEmbedding, HttpRegistryNotifier,
    InMemoryStatusStore, InMemoryVectorStore, OpenAiChatClient, QdrantVectorStore,
    RedisStatusStore, TextEmbedding,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::load()?;
    info!(
        embedding = ?config.embedding.provider,
        vector_store = ?config.vector_store.provider,
        status_store = ?config.status_store.provider,
        "configuration loaded"
    );

    let embedding: Arc<dyn EmbeddingService> = match config.embedding.provider {
        EmbeddingProvider::OpenAi => Arc::new(TextEmbedding::from_config(&config.embedding)),
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedding::new(config.embedding.dimension)?),
    };

    let vector_store: Arc<dyn VectorStore> = match config.vector_store.provider {
        VectorStoreProvider::Qdrant => Arc::new(QdrantVectorStore::new(
            &config.vector_store.url,
            config.embedding.dimension,
        )?),
        VectorStoreProvider::Memory => {
            Arc::new(InMemoryVectorStore::new(config.embedding.dimension))
        }
    };

    let redis_pool = match config.status_store.provider {
        StatusStoreProvider::Redis => Some(create_pool(&config.status_store.url)?),
        StatusStoreProvider::Memory => None,
    };
    let status_store: Arc<dyn StatusStore> = match &redis_pool {
        Some(pool) => Arc::new(RedisStatusStore::new(
            pool.clone(),
            config.status_store.ttl_seconds,
        )),
        None => Arc::new(InMemoryStatusStore::new()),
    };

    let notifier: Option<Arc<dyn RegistryNotifier>> = match &config.registry.base_url {
        Some(url) => Some(Arc::new(HttpRegistryNotifier::new(
            url.clone(),
            &config.registry,
        )?)),
        None => {
            info!("registry notification disabled");
            None
        }
    };

    let generation: Arc<dyn GenerationClient> =
        Arc::new(OpenAiChatClient::new(&config.generation)?);

    let embed_timeout = Duration::from_secs(config.ingestion.embed_timeout_seconds);
    let ingestion = Arc::new(IngestionCoordinator::start(
        IngestionDeps {
            documents: Arc::new(FsDocumentSource::new(config.storage.agents_dir())),
            embedding: embedding.clone(),
            vector_store: vector_store.clone(),
            status_store,
            notifier,
        },
        TokenChunker::from_config(&config.chunking)?,
        IngestionSettings {
            collection_prefix: config.vector_store.collection_prefix.clone(),
            workers: config.ingestion.workers,
            queue_capacity: config.ingestion.queue_capacity,
            replace_existing: config.ingestion.replace_existing,
            embed_timeout,
            commit_timeout: Duration::from_secs(config.ingestion.commit_timeout_seconds),
            status_timeout: Duration::from_secs(config.ingestion.status_timeout_seconds),
        },
    )?);

    let rag_service = Arc::new(
        RagService::new(embedding, vector_store.clone(), config.rag.top_k)
            .with_collection_prefix(config.vector_store.collection_prefix.clone())
            .with_template(PromptTemplate {
                context_preamble: config.prompts.context_preamble.clone(),
                context_separator: config.prompts.context_separator.clone(),
            })
            .with_embed_timeout(embed_timeout),
    );
    let chat_service = Arc::new(ChatService::new(rag_service.clone(), generation));

    let shutdown_grace = Duration::from_secs(config.ingestion.shutdown_grace_seconds);
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    let mut state = AppState::new(
        ingestion.clone(),
        rag_service,
        chat_service,
        vector_store,
        config,
    );
    if let Some(pool) = redis_pool {
        state = state.with_redis_pool(pool);
    }
    let app = create_router(state);

    info!("knowledge server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ingestion.shutdown(shutdown_grace).await;
    info!("server stopped");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "server=debug,knowledge_server=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
