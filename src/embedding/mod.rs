//! Text embedding for prompt retrieval.
//!
//! Turns prompt text into fixed-dimension vectors so historical prompt
//! records can be ranked by similarity. The optimizer never cares whether
//! a vector came from a cache hit or a fresh call; only the reported cost
//! differs.
//!
//! # Components
//!
//! - [`Embedder`]: async `embed(text) -> (vector, cost)` contract.
//! - [`HashEmbedder`]: deterministic local embedder, zero cost.
//! - [`CachedEmbedder`]: wraps any embedder with a content-hash keyed cache.
//! - [`cosine_similarity`]: dimension-checked vector comparison.
//!
//! # Example
//!
//! ```ignore
//! use promptsmith::embedding::{CachedEmbedder, Embedder, HashEmbedder};
//!
//! let embedder = CachedEmbedder::new(HashEmbedder::default(), 1_000);
//! let first = embedder.embed("Summarise this article").await?;
//! let again = embedder.embed("Summarise this article").await?;
//! assert_eq!(again.cost, 0.0);
//! ```

pub mod cache;
pub mod embedder;
pub mod similarity;

pub use cache::{CacheConfig, CacheStats, CachedEmbedder, ContentHash, EmbeddingCache};
pub use embedder::{contextualize, Embedded, Embedder, Embedding, HashEmbedder};
pub use similarity::cosine_similarity;
