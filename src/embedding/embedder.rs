//! Embedder contract and the local hash-based embedder.

use async_trait::async_trait;
use ndarray::Array1;
use sha2::{Digest, Sha256};

use crate::error::EmbeddingError;

/// Dense vector representation of a piece of text.
pub type Embedding = Array1<f64>;

/// Default dimension for [`HashEmbedder`] vectors.
const DEFAULT_DIMENSION: usize = 256;

/// Output of one embedding call.
#[derive(Debug, Clone)]
pub struct Embedded {
    pub vector: Embedding,
    /// Monetary cost of producing this vector, 0 for local or cached vectors.
    pub cost: f64,
}

/// Turns text into a vector of fixed dimension.
///
/// Implementations must be deterministic for identical input.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimension of every vector this embedder returns.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Embedded, EmbeddingError>;
}

/// Prefixes prompt text with its classification tags before embedding.
///
/// Records with the same wording but different domains end up in
/// different neighbourhoods of the vector space.
pub fn contextualize(text: &str, domain: &str, task_type: Option<&str>) -> String {
    match task_type {
        Some(task) if !task.trim().is_empty() => {
            format!("[domain: {}] [task: {}] {}", domain, task.trim(), text)
        }
        _ => format!("[domain: {}] {}", domain, text),
    }
}

/// Deterministic embedder built from hashed text features.
///
/// Features are word buckets, character trigram buckets and a few length
/// statistics. The result is L2-normalised so cosine similarity reduces
/// to a dot product.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashEmbedder {
    /// Creates an embedder producing vectors of `dimension` entries.
    ///
    /// Dimensions below 16 are raised to 16 so every feature block has room.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(16),
        }
    }

    /// Embeds text synchronously. Empty text maps to the zero vector.
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut embedding = Array1::zeros(self.dimension);

        if text.trim().is_empty() {
            return embedding;
        }

        let lower = text.to_lowercase();

        // Word buckets
        let words: Vec<&str> = lower.split_whitespace().collect();
        let word_dim = self.dimension / 2;
        for word in &words {
            let pos = hash_to_index(word, word_dim);
            embedding[pos] += 1.0 / words.len() as f64;
        }

        // Character trigram buckets
        let offset = word_dim;
        let trigram_dim = self.dimension / 4;
        let chars: Vec<char> = lower.chars().collect();
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            embedding[offset + hash_to_index(&trigram, trigram_dim)] += 1.0;
        }

        // Text statistics
        let stats = offset + trigram_dim;
        embedding[stats] = (text.len() as f64 / 1000.0).min(1.0);
        embedding[stats + 1] = (words.len() as f64 / 200.0).min(1.0);
        embedding[stats + 2] = (text.lines().count() as f64 / 20.0).min(1.0);

        normalize(&mut embedding);
        embedding
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedded, EmbeddingError> {
        Ok(Embedded {
            vector: self.embed_text(text),
            cost: 0.0,
        })
    }
}

/// Hashes a string to an index in [0, max_index).
fn hash_to_index(input: &str, max_index: usize) -> usize {
    if max_index == 0 {
        return 0;
    }
    let digest = Sha256::digest(input.as_bytes());
    let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize;
    value % max_index
}

/// Scales a vector to unit L2 norm; near-zero vectors are left untouched.
fn normalize(v: &mut Embedding) {
    let norm = v.dot(&*v).sqrt();
    if norm > 1e-10 {
        v.mapv_inplace(|x| x / norm);
    }
}
