use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::domain::{ports::VectorStore, DocumentChunk, DomainError, Embedding, SearchResult};

type Collection = BTreeMap<u64, (DocumentChunk, Embedding)>;

/// Brute-force cosine index keyed by collection name.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
    dimension: usize,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            dimension,
        }
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    fn check_dimension(&self, embedding: &Embedding) -> Result<(), DomainError> {
        if embedding.dimension() != self.dimension {
            return Err(DomainError::dimension_mismatch(
                self.dimension,
                embedding.dimension(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn get_or_create(&self, collection: &str) -> Result<(), DomainError> {
        let mut store = self
            .collections
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        store.entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn upsert_batch(
        &self,
        collection: &str,
        points: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError> {
        for (_, embedding) in points {
            self.check_dimension(embedding)?;
        }

        let mut store = self
            .collections
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        let entries = store.entry(collection.to_string()).or_default();
        for (chunk, embedding) in points {
            entries.insert(chunk.chunk_index, (chunk.clone(), embedding.clone()));
        }
        Ok(())
    }

    async fn replace(
        &self,
        collection: &str,
        points: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError> {
        for (_, embedding) in points {
            self.check_dimension(embedding)?;
        }

        let fresh: Collection = points
            .iter()
            .map(|(chunk, embedding)| (chunk.chunk_index, (chunk.clone(), embedding.clone())))
            .collect();

        let mut store = self
            .collections
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        store.insert(collection.to_string(), fresh);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        self.check_dimension(query)?;

        let store = self
            .collections
            .read()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        let Some(entries) = store.get(collection) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<SearchResult> = entries
            .values()
            .map(|(chunk, embedding)| SearchResult {
                chunk_index: chunk.chunk_index,
                content: chunk.content.clone(),
                distance: query.cosine_distance(embedding),
            })
            .collect();

        SearchResult::rank(&mut results);
        results.truncate(top_k);

        Ok(results)
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), DomainError> {
        let mut store = self
            .collections
            .write()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        store.remove(collection);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), DomainError> {
        Ok(())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
