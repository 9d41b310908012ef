//! Similarity search contract and the brute-force ranking shared by stores.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::{cosine_similarity, Embedding};

use super::PromptRecord;

/// Constraints applied to a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Maximum number of hits returned.
    pub top_k: usize,
    /// Minimum `success_rate` a record needs to be returned.
    pub min_performance: f64,
    /// Restrict hits to this domain when set.
    pub domain: Option<String>,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_performance: 0.0,
            domain: None,
        }
    }
}

impl SearchFilters {
    pub fn new(top_k: usize) -> Self {
        Self {
            top_k,
            ..Default::default()
        }
    }

    pub fn with_min_performance(mut self, min_performance: f64) -> Self {
        self.min_performance = min_performance;
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    fn admits(&self, record: &PromptRecord) -> bool {
        record.metrics.success_rate >= self.min_performance
            && self
                .domain
                .as_deref()
                .map_or(true, |domain| record.domain == domain)
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    /// Cosine similarity to the query, in (0, 1].
    pub similarity: f64,
    pub record: PromptRecord,
}

/// Ranks stored records by vector similarity.
///
/// Retrieval must never stop an optimization run: implementations log
/// their failures and return an empty list instead of an error.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(&self, vector: &Embedding, filters: &SearchFilters) -> Vec<SearchHit>;
}

/// Scores every candidate against `query`, applies `filters` and returns the
/// best `top_k` hits, most similar first.
///
/// Candidates whose vector has the wrong dimension, or whose similarity is
/// not positive, are skipped.
pub(crate) fn rank<'a, I>(query: &Embedding, candidates: I, filters: &SearchFilters) -> Vec<SearchHit>
where
    I: IntoIterator<Item = (&'a PromptRecord, &'a Embedding)>,
{
    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .filter(|(record, _)| filters.admits(record))
        .filter_map(|(record, vector)| match cosine_similarity(query, vector) {
            Ok(similarity) if similarity > 0.0 => Some(SearchHit {
                id: record.id.clone(),
                similarity,
                record: record.clone(),
            }),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(record_id = %record.id, error = %e, "Skipping record with incompatible embedding");
                None
            }
        })
        .collect();

    hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    hits.truncate(filters.top_k);
    hits
}
