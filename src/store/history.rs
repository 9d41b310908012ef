//! Glue between the embedder and a record store.
//!
//! [`PromptHistory::retrieve`] is what warm-starts an optimization run;
//! [`PromptHistory::record`] feeds observed outcomes back in.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::embedding::{contextualize, Embedder};
use crate::error::StoreError;

use super::{Outcome, PromptRecord, RecordStore, SearchFilters};

/// Retrieval settings for warm starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Only records at or above this success rate are returned.
    pub min_performance: f64,
    /// Restrict results to the prompt's own domain.
    pub domain_filter: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_performance: 0.7,
            domain_filter: true,
        }
    }
}

/// Embeds prompts and reads/writes their records.
pub struct PromptHistory {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn RecordStore>,
    /// Weight of the newest observation in the metric EMA.
    ema_alpha: f64,
    /// Held across find, update and upsert so one text maps to one record.
    record_lock: Mutex<()>,
}

impl PromptHistory {
    pub const DEFAULT_EMA_ALPHA: f64 = 0.2;

    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            embedder,
            store,
            ema_alpha: Self::DEFAULT_EMA_ALPHA,
            record_lock: Mutex::new(()),
        }
    }

    pub fn with_ema_alpha(mut self, alpha: f64) -> Self {
        self.ema_alpha = alpha.clamp(0.0, 1.0);
        self
    }

    /// Finds historically strong prompts similar to `prompt`.
    ///
    /// Never fails: an embedding or search error is logged and produces an
    /// empty list, which makes the caller fall back to a cold start.
    pub async fn retrieve(
        &self,
        prompt: &str,
        domain: &str,
        task_type: Option<&str>,
        config: &RetrievalConfig,
    ) -> Vec<PromptRecord> {
        let query = contextualize(prompt, domain, task_type);
        let embedded = match self.embedder.embed(&query).await {
            Ok(embedded) => embedded,
            Err(e) => {
                tracing::warn!(error = %e, domain, "Embedding failed, optimizing without history");
                return Vec::new();
            }
        };

        let mut filters =
            SearchFilters::new(config.top_k).with_min_performance(config.min_performance);
        if config.domain_filter {
            filters = filters.with_domain(domain);
        }

        let hits = self.store.search(&embedded.vector, &filters).await;
        tracing::debug!(
            domain,
            hits = hits.len(),
            embed_cost = embedded.cost,
            "Retrieved similar prompts"
        );
        hits.into_iter().map(|hit| hit.record).collect()
    }

    /// Records an observed outcome for `text`.
    ///
    /// An existing record with the same text and domain has its metrics
    /// updated in place; otherwise a new record is created. Concurrent
    /// calls through one `PromptHistory` are applied one at a time.
    pub async fn record(
        &self,
        text: &str,
        domain: &str,
        task_type: Option<String>,
        outcome: &Outcome,
    ) -> Result<PromptRecord, StoreError> {
        let _guard = self.record_lock.lock().await;
        let record = match self.store.find_by_text(text, domain).await? {
            Some(mut existing) => {
                existing.metrics.observe(outcome, self.ema_alpha);
                existing
            }
            None => PromptRecord::new(text, domain, task_type, outcome),
        };

        let embedded = self.embedder.embed(&record.contextualized_text).await?;
        self.store.upsert(&record, &embedded.vector).await?;

        tracing::info!(
            record_id = %record.id,
            domain,
            success_rate = record.metrics.success_rate,
            observations = record.metrics.observation_count,
            "Recorded prompt outcome"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedded, HashEmbedder};
    use crate::error::EmbeddingError;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn dimension(&self) -> usize {
            4
        }

        async fn embed(&self, _text: &str) -> Result<Embedded, EmbeddingError> {
            Err(EmbeddingError::Transport("connection refused".to_string()))
        }
    }

    fn history(store: Arc<MemoryStore>) -> PromptHistory {
        PromptHistory::new(Arc::new(HashEmbedder::new(64)), store)
    }

    #[tokio::test]
    async fn test_record_creates_then_updates() {
        let store = Arc::new(MemoryStore::new());
        let history = history(store.clone()).with_ema_alpha(0.5);

        let first = history
            .record("Write unit tests", "code", None, &Outcome::new(1.0))
            .await
            .expect("record");
        let second = history
            .record("Write unit tests", "code", None, &Outcome::new(0.0))
            .await
            .expect("record");

        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
        assert_eq!(second.metrics.observation_count, 2);
        assert!((second.metrics.success_rate - 0.5).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_concurrent_records_share_one_entry() {
        let store = Arc::new(MemoryStore::new());
        let history = Arc::new(history(store.clone()));

        let a = {
            let history = history.clone();
            tokio::spawn(async move {
                history
                    .record("Write unit tests", "code", None, &Outcome::new(0.9))
                    .await
            })
        };
        let b = {
            let history = history.clone();
            tokio::spawn(async move {
                history
                    .record("Write unit tests", "code", None, &Outcome::new(0.5))
                    .await
            })
        };

        let a = a.await.expect("join").expect("record a");
        let b = b.await.expect("join").expect("record b");
        assert_eq!(a.id, b.id);
        assert_eq!(store.len(), 1);
        let stored = store
            .find_by_text("Write unit tests", "code")
            .await
            .expect("find")
            .expect("present");
        assert_eq!(stored.metrics.observation_count, 2);
    }

    #[tokio::test]
    async fn test_retrieve_finds_similar_high_performers() {
        let store = Arc::new(MemoryStore::new());
        let history = history(store.clone());

        history
            .record(
                "Write a Rust function that parses CSV rows",
                "code",
                None,
                &Outcome::new(0.95),
            )
            .await
            .expect("record");
        history
            .record("Write a Rust function that sorts", "code", None, &Outcome::new(0.2))
            .await
            .expect("record");
        history
            .record("Write a poem", "writing", None, &Outcome::new(0.99))
            .await
            .expect("record");

        let records = history
            .retrieve(
                "Write a Rust function that parses CSV",
                "code",
                None,
                &RetrievalConfig::default(),
            )
            .await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "Write a Rust function that parses CSV rows");
    }

    #[tokio::test]
    async fn test_retrieve_degrades_to_cold_start() {
        let history = PromptHistory::new(Arc::new(BrokenEmbedder), Arc::new(MemoryStore::new()));
        let records = history
            .retrieve("anything", "general", None, &RetrievalConfig::default())
            .await;
        assert!(records.is_empty());
    }
}
