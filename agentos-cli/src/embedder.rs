//! Deterministic offline embedder. The CLI ships with no LLM credentials
//! configured by default, so `proposals commit` needs a concrete embedder
//! that works offline: this hashes the text and spreads the digest bytes
//! into a fixed-dimension float vector, dimension-stable and deterministic.

use async_trait::async_trait;

use agentos_core::collaborators::Embedder;
use agentos_core::error::StoreError;
use sha2::{Digest, Sha256};

const DIMENSION: usize = 32;

pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        Ok(digest.iter().take(DIMENSION).map(|b| (*b as f32 / 127.5) - 1.0).collect())
    }

    fn model_name(&self) -> &str {
        "hash-fallback-v1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_text_embeds_identically() {
        let embedder = HashEmbedder;
        let a = embedder.embed_text("hello world").await.unwrap();
        let b = embedder.embed_text("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DIMENSION);
    }

    #[tokio::test]
    async fn different_text_embeds_differently() {
        let embedder = HashEmbedder;
        let a = embedder.embed_text("hello").await.unwrap();
        let b = embedder.embed_text("goodbye").await.unwrap();
        assert_ne!(a, b);
    }
}
