//! Application layer - Use cases and orchestration.
//!
//! Services here depend on domain ports (traits) rather than concrete
//! adapters: ingestion runs in the background behind [`IngestionCoordinator`],
//! retrieval and prompt assembly live in [`RagService`], and [`ChatService`]
//! hands composed conversations to the generation backend.

pub mod services;

pub use services::{
    ChatReply, ChatService, IngestionCoordinator, IngestionDeps, IngestionSettings,
    PromptTemplate, QueryResult, RagService,
};
