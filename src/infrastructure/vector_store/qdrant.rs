use async_trait::async_trait;
use chrono::Utc;
use qdrant_client::qdrant::{
    CreateAliasBuilder, CreateCollectionBuilder, DeleteCollectionBuilder, Distance, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};

use crate::domain::{ports::VectorStore, DocumentChunk, DomainError, Embedding, SearchResult};

/// Upserts are sent in slices of this many points.
const UPSERT_BATCH: usize = 256;

/// What an agent's collection name currently points at.
///
/// Agent collections are aliases over generation-suffixed physical
/// collections, so a re-index can be built on the side and swapped in.
/// Plain collections under the agent name are still read and replaced.
#[derive(Debug)]
enum Target {
    Alias(String),
    Collection,
    Missing,
}

pub struct QdrantVectorStore {
    client: Qdrant,
    dimension: usize,
}

fn external(e: impl std::fmt::Display) -> DomainError {
    DomainError::external(e.to_string())
}

impl QdrantVectorStore {
    pub fn new(url: &str, dimension: usize) -> Result<Self, DomainError> {
        let client = Qdrant::from_url(url).build().map_err(external)?;

        Ok(Self { client, dimension })
    }

    async fn resolve(&self, name: &str) -> Result<Target, DomainError> {
        let aliases = self.client.list_aliases().await.map_err(external)?;
        if let Some(alias) = aliases.aliases.into_iter().find(|a| a.alias_name == name) {
            return Ok(Target::Alias(alias.collection_name));
        }

        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(external)?;
        Ok(if exists {
            Target::Collection
        } else {
            Target::Missing
        })
    }

    fn physical_name(collection: &str) -> String {
        format!("{collection}__g{}", Utc::now().timestamp_micros())
    }

    async fn create(&self, physical: &str) -> Result<(), DomainError> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(physical).vectors_config(VectorParamsBuilder::new(
                    self.dimension as u64,
                    Distance::Cosine,
                )),
            )
            .await
            .map_err(external)?;

        tracing::info!(collection = physical, dimension = self.dimension, "collection created");
        Ok(())
    }

    async fn drop_physical(&self, physical: &str) -> Result<(), DomainError> {
        self.client
            .delete_collection(DeleteCollectionBuilder::new(physical))
            .await
            .map_err(external)?;

        tracing::info!(collection = physical, "collection deleted");
        Ok(())
    }

    /// Points `alias` at `physical`. Qdrant may refuse to overwrite a live
    /// alias, in which case it is dropped and recreated.
    async fn point_alias(&self, alias: &str, physical: &str) -> Result<(), DomainError> {
        if let Err(e) = self
            .client
            .create_alias(CreateAliasBuilder::new(physical, alias))
            .await
        {
            tracing::debug!(alias, error = %e, "alias taken, re-pointing");
            self.client.delete_alias(alias).await.map_err(external)?;
            self.client
                .create_alias(CreateAliasBuilder::new(physical, alias))
                .await
                .map_err(external)?;
        }
        Ok(())
    }

    async fn write(
        &self,
        collection: &str,
        points: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError> {
        for slice in points.chunks(UPSERT_BATCH) {
            let batch = slice
                .iter()
                .map(|(chunk, embedding)| Self::to_point(chunk, embedding))
                .collect::<Result<Vec<_>, _>>()?;

            self.client
                .upsert_points(UpsertPointsBuilder::new(collection, batch).wait(true))
                .await
                .map_err(external)?;
        }
        Ok(())
    }

    async fn swap_in(
        &self,
        collection: &str,
        staging: &str,
        points: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError> {
        self.write(staging, points).await?;

        let previous = self.resolve(collection).await?;
        if matches!(previous, Target::Collection) {
            // a plain collection owns the name and blocks the alias
            self.drop_physical(collection).await?;
        }
        self.point_alias(collection, staging).await?;

        if let Target::Alias(old) = previous {
            if let Err(e) = self.drop_physical(&old).await {
                tracing::warn!(collection = %old, error = %e, "stale collection left behind");
            }
        }
        Ok(())
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

    fn to_point(chunk: &DocumentChunk, embedding: &Embedding) -> Result<PointStruct, DomainError> {
        let payload: Payload = serde_json::json!({
            "agent_name": chunk.agent_name.as_str(),
            "chunk_index": chunk.chunk_index,
            "content": chunk.content,
            "source": chunk.metadata.source,
            "generation": chunk.metadata.generation,
        })
        .try_into()
        .map_err(|_| DomainError::internal("Failed to create payload"))?;

        Ok(PointStruct::new(
            chunk.chunk_index,
            embedding.as_slice().to_vec(),
            payload,
        ))
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn get_or_create(&self, collection: &str) -> Result<(), DomainError> {
        if !matches!(self.resolve(collection).await?, Target::Missing) {
            return Ok(());
        }

        let physical = Self::physical_name(collection);
        self.create(&physical).await?;
        self.point_alias(collection, &physical).await
    }

    async fn upsert_batch(
        &self,
        collection: &str,
        points: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError> {
        for (_, embedding) in points {
            self.check_dimension(embedding)?;
        }

        self.get_or_create(collection).await?;
        self.write(collection, points).await
    }

    async fn replace(
        &self,
        collection: &str,
        points: &[(DocumentChunk, Embedding)],
    ) -> Result<(), DomainError> {
        for (_, embedding) in points {
            self.check_dimension(embedding)?;
        }

        let staging = Self::physical_name(collection);
        self.create(&staging).await?;

        if let Err(e) = self.swap_in(collection, &staging, points).await {
            if let Err(cleanup) = self.drop_physical(&staging).await {
                tracing::warn!(collection = %staging, error = %cleanup, "staging collection left behind");
            }
            return Err(e);
        }

        tracing::info!(collection, points = points.len(), "collection replaced");
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        query: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        self.check_dimension(query)?;

        if top_k == 0 || matches!(self.resolve(collection).await?, Target::Missing) {
            return Ok(Vec::new());
        }

        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, query.as_slice().to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(external)?;

        let mut search_results: Vec<SearchResult> = results
            .result
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload;

                let content = payload.get("content")?.as_str()?.to_string();
                let chunk_index = payload.get("chunk_index")?.as_integer()? as u64;

                Some(SearchResult {
                    chunk_index,
                    content,
                    distance: 1.0 - point.score,
                })
            })
            .collect();

        SearchResult::rank(&mut search_results);

        Ok(search_results)
    }

    async fn delete_collection(&self, collection: &str) -> Result<(), DomainError> {
        match self.resolve(collection).await? {
            Target::Alias(physical) => {
                self.client
                    .delete_alias(collection)
                    .await
                    .map_err(external)?;
                self.drop_physical(&physical).await
            }
            Target::Collection => self.drop_physical(collection).await,
            Target::Missing => Ok(()),
        }
    }

    async fn health_check(&self) -> Result<(), DomainError> {
        self.client
            .health_check()
            .await
            .map(|_| ())
            .map_err(external)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
