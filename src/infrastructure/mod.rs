pub mod config;
pub mod documents;
pub mod embedding;
pub mod llm;
pub mod registry;
pub mod status;
pub mod vector_store;

pub use config::AppConfig;
pub use documents::FsDocumentSource;
pub use embedding::{HashingEmbedding, TextEmbedding};
pub use llm::OpenAiChatClient;
pub use registry::HttpRegistryNotifier;
pub use status::{create_pool, InMemoryStatusStore, RedisPool, RedisStatusStore};
pub use vector_store::{InMemoryVectorStore, QdrantVectorStore};
