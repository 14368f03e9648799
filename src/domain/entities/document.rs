use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::domain::AgentName;

/// A source document read from an agent's file set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    pub content: String,
}

impl Document {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// One indexed window of text. `chunk_index` doubles as the point id in the
/// agent's collection and is only stable within a single ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub agent_name: AgentName,
    pub chunk_index: u64,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl DocumentChunk {
    pub fn new(agent_name: AgentName, chunk_index: u64, content: impl Into<String>) -> Self {
        Self {
            agent_name,
            chunk_index,
            content: content.into(),
            metadata: ChunkMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: ChunkMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: Option<String>,
    pub generation: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_index: u64,
    pub content: String,
    pub distance: f32,
}

impl SearchResult {
    /// Closest first; equal distances fall back to document order.
    pub fn rank(results: &mut [SearchResult]) {
        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
    }
}
