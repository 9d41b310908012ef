//! In-process record store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::embedding::Embedding;
use crate::error::StoreError;

use super::search::rank;
use super::{PromptRecord, RecordStore, SearchFilters, SearchHit, VectorSearch};

/// Record store backed by a `HashMap`, searched by brute force.
///
/// Suitable for tests and short-lived processes; nothing is persisted.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, (PromptRecord, Embedding)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorSearch for MemoryStore {
    async fn search(&self, vector: &Embedding, filters: &SearchFilters) -> Vec<SearchHit> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        rank(
            vector,
            entries.values().map(|(record, embedding)| (record, embedding)),
            filters,
        )
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert(&self, record: &PromptRecord, embedding: &Embedding) -> Result<(), StoreError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), (record.clone(), embedding.clone()));
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<PromptRecord>, StoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|(record, _)| record.clone()))
    }

    async fn find_by_text(
        &self,
        text: &str,
        domain: &str,
    ) -> Result<Option<PromptRecord>, StoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|(record, _)| record.text == text && record.domain == domain)
            .map(|(record, _)| record.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some())
    }
}
