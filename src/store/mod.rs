//! Historical prompt records and similarity retrieval.
//!
//! The optimizer consumes this module, it does not own it: records are
//! created and updated from observed outcomes, searched to warm-start an
//! optimization run, and only ever deleted explicitly through a store.

pub mod history;
pub mod memory;
pub mod search;
pub mod sqlite;
pub mod types;

use async_trait::async_trait;

use crate::embedding::Embedding;
use crate::error::StoreError;

pub use history::{PromptHistory, RetrievalConfig};
pub use memory::MemoryStore;
pub use search::{SearchFilters, SearchHit, VectorSearch};
pub use sqlite::SqliteStore;
pub use types::{Outcome, PromptMetrics, PromptRecord};

/// Persistence for prompt records keyed by their opaque id.
#[async_trait]
pub trait RecordStore: VectorSearch {
    /// Inserts the record or replaces the stored copy with the same id.
    async fn upsert(&self, record: &PromptRecord, embedding: &Embedding) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<PromptRecord>, StoreError>;

    /// Exact-text lookup within a domain.
    async fn find_by_text(
        &self,
        text: &str,
        domain: &str,
    ) -> Result<Option<PromptRecord>, StoreError>;

    /// Removes a record. Returns whether anything was deleted.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}
