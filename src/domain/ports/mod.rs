mod document_source;
mod embedding;
mod generation;
mod registry;
mod status_store;
mod vector_store;

pub use document_source::DocumentSource;
pub use embedding::EmbeddingService;
pub use generation::GenerationClient;
pub use registry::RegistryNotifier;
pub use status_store::StatusStore;
pub use vector_store::VectorStore;
