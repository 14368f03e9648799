mod agent;
mod conversation;
mod document;
mod embedding;

pub use agent::{AgentName, EmbeddingsStatus, IngestionStatus};
pub use conversation::{Message, MessageRole};
pub use document::{ChunkMetadata, Document, DocumentChunk, SearchResult};
pub use embedding::Embedding;
