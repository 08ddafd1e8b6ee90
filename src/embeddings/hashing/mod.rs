
use async_trait::async_trait;

use super::{Embedder, prepare_input};
use crate::{MemoryError, Result};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Offline bag-of-words embedder.
///
/// Every lowercased alphanumeric token is hashed with FNV-1a into one of
/// `dimension` buckets and the counts are L2-normalised, so texts sharing
/// vocabulary score a high cosine similarity. Stable across platforms and
/// releases, which keeps stores created with it reopenable.
///
/// Text without a single alphanumeric token has no embedding.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashingEmbedder {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("hashing:fnv1a-{}", dimension),
        }
    }

    /// Synchronous core, exposed for benches and tests
    #[inline]
    pub fn embed_normalized(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
        {
            let bucket = (fnv1a(&token.to_lowercase()) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    #[inline]
    fn model_id(&self) -> &str {
        &self.model_id
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn max_input_tokens(&self) -> usize {
        usize::MAX
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = prepare_input(text, self.max_input_tokens())?;
        let vector = self.embed_normalized(&input);
        // a zero vector scores 0.0 against everything and would defeat dedup
        if vector.iter().all(|x| *x == 0.0) {
            return Err(MemoryError::Embedding("input has no tokens".to_string()));
        }
        Ok(vector)
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}
