mod chat;
mod ingestion;
mod rag;

pub use chat::{ChatReply, ChatService};
pub use ingestion::{IngestionCoordinator, IngestionDeps, IngestionSettings};
pub use rag::{PromptTemplate, QueryResult, RagService};
