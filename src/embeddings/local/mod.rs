
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::Result;
use crate::embeddings::{EmbeddingModel, l2_normalize};

pub const DEFAULT_LOCAL_DIMENSION: usize = 256;

/// Embedding-space version. Bump whenever tokenization or hashing changes,
/// so stale persisted indexes are rejected instead of silently corrupting
/// nearest-neighbor distances.
const HASH_SPACE_VERSION: u32 = 1;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "my", "of", "on", "that", "the", "to", "was", "were", "will", "with",
];

/// Fully offline embedding backend: a signed feature-hashed bag of tokens
/// and token bigrams, L2-normalized. No model files, no network. Quality is
/// lexical rather than semantic, which is acceptable for a troubleshooting
/// corpus where queries share vocabulary with problem descriptions.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    #[inline]
    fn default() -> Self {
        Self {
            dimension: DEFAULT_LOCAL_DIMENSION,
        }
    }
}

impl HashEmbedder {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        debug!("Creating hash embedder with dimension {}", dimension);
        Self { dimension }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty() && !STOP_WORDS.contains(token))
            .map(ToString::to_string)
            .collect()
    }

    /// Stable 64-bit hash of a feature string. Uses SHA-256 rather than the
    /// std hasher because persisted indexes must survive toolchain upgrades.
    fn feature_hash(feature: &str) -> u64 {
        let digest = Sha256::digest(feature.as_bytes());
        u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ])
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = Self::feature_hash(feature);
        let bucket = usize::try_from(hash % self.dimension as u64).unwrap_or(0);
        // One hash bit decides the sign, which keeps colliding features from
        // always reinforcing each other.
        let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl EmbeddingModel for HashEmbedder {
    #[inline]
    fn model_id(&self) -> String {
        format!("local-hash-v{}-{}", HASH_SPACE_VERSION, self.dimension)
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = Self::tokenize(text);
        let mut vector = vec![0.0f32; self.dimension];

        for token in &tokens {
            self.accumulate(&mut vector, token, 1.0);
        }

        // Bigrams carry phrase information at half the weight of unigrams
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, &bigram, 0.5);
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }

    #[inline]
    fn is_ready(&self) -> bool {
        true
    }
}
