use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::{ports::EmbeddingService, DomainError, Embedding};

/// Local feature-hashing embedder.
///
/// Every lowercase alphanumeric word is hashed with SHA-256 into one of
/// `dimension` signed buckets and the result is L2-normalised. Texts sharing
/// vocabulary land close together under cosine distance, and the output
/// depends on nothing but the input text, so it needs no model download and
/// is stable across processes and platforms.
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Result<Self, DomainError> {
        if dimension == 0 {
            return Err(DomainError::configuration(
                "embedding dimension must be positive",
            ));
        }
        Ok(Self { dimension })
    }

    pub fn encode(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut head = [0u8; 8];
            head.copy_from_slice(&digest[..8]);
            let hash = u64::from_le_bytes(head);

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }

        Embedding::new(vector)
    }
}

#[async_trait]
impl EmbeddingService for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding, DomainError> {
        Ok(self.encode(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, DomainError> {
        Ok(texts.iter().map(|t| self.encode(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
