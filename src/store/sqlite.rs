//! SQLite-backed record store.
//!
//! Records and their embeddings live in a single table. Search loads the
//! candidate rows admitted by the SQL-side filters and ranks them in
//! process, which is fine for the few thousand prompts a team accumulates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::embedding::Embedding;
use crate::error::StoreError;

use super::search::rank;
use super::{PromptMetrics, PromptRecord, RecordStore, SearchFilters, SearchHit, VectorSearch};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS prompt_records (
    id                  TEXT PRIMARY KEY,
    text                TEXT NOT NULL,
    contextualized_text TEXT NOT NULL,
    domain              TEXT NOT NULL,
    task_type           TEXT,
    tags                TEXT NOT NULL DEFAULT '[]',

    -- EMA metrics
    success_rate        REAL NOT NULL,
    avg_latency_ms      REAL NOT NULL,
    token_efficiency    REAL NOT NULL,
    observation_count   INTEGER NOT NULL,
    last_updated        TEXT NOT NULL,

    -- JSON array of f64
    embedding           TEXT NOT NULL,

    created_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_prompt_records_domain ON prompt_records(domain);
CREATE INDEX IF NOT EXISTS idx_prompt_records_success ON prompt_records(success_rate);
CREATE UNIQUE INDEX IF NOT EXISTS idx_prompt_records_text ON prompt_records(domain, text);
"#;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and applies the schema.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        tracing::info!(path = path, "Prompt record store opened");
        Ok(Self { pool })
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM prompt_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    async fn candidates(
        &self,
        filters: &SearchFilters,
    ) -> Result<Vec<(PromptRecord, Embedding)>, StoreError> {
        let rows = match filters.domain {
            Some(ref domain) => {
                sqlx::query(
                    "SELECT * FROM prompt_records WHERE success_rate >= ?1 AND domain = ?2",
                )
                .bind(filters.min_performance)
                .bind(domain)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM prompt_records WHERE success_rate >= ?1")
                    .bind(filters.min_performance)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(decode_row).collect()
    }
}

fn decode_row(row: &SqliteRow) -> Result<(PromptRecord, Embedding), StoreError> {
    let tags: Vec<String> = serde_json::from_str(&row.get::<String, _>("tags"))?;
    let embedding: Vec<f64> = serde_json::from_str(&row.get::<String, _>("embedding"))?;

    let record = PromptRecord {
        id: row.get("id"),
        text: row.get("text"),
        contextualized_text: row.get("contextualized_text"),
        domain: row.get("domain"),
        task_type: row.get("task_type"),
        metrics: PromptMetrics {
            success_rate: row.get("success_rate"),
            avg_latency_ms: row.get("avg_latency_ms"),
            token_efficiency: row.get("token_efficiency"),
            observation_count: row.get::<i64, _>("observation_count").max(0) as u64,
            last_updated: row.get::<DateTime<Utc>, _>("last_updated"),
        },
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        tags,
    };

    Ok((record, Embedding::from_vec(embedding)))
}

#[async_trait]
impl VectorSearch for SqliteStore {
    async fn search(&self, vector: &Embedding, filters: &SearchFilters) -> Vec<SearchHit> {
        match self.candidates(filters).await {
            Ok(candidates) => rank(
                vector,
                candidates.iter().map(|(record, embedding)| (record, embedding)),
                filters,
            ),
            Err(e) => {
                tracing::warn!(error = %e, "Prompt search failed, continuing without history");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn upsert(&self, record: &PromptRecord, embedding: &Embedding) -> Result<(), StoreError> {
        let tags = serde_json::to_string(&record.tags)?;
        let vector = serde_json::to_string(&embedding.to_vec())?;

        sqlx::query(
            "INSERT INTO prompt_records (
                id, text, contextualized_text, domain, task_type, tags,
                success_rate, avg_latency_ms, token_efficiency, observation_count,
                last_updated, embedding, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                contextualized_text = excluded.contextualized_text,
                domain = excluded.domain,
                task_type = excluded.task_type,
                tags = excluded.tags,
                success_rate = excluded.success_rate,
                avg_latency_ms = excluded.avg_latency_ms,
                token_efficiency = excluded.token_efficiency,
                observation_count = MAX(excluded.observation_count, prompt_records.observation_count),
                last_updated = excluded.last_updated,
                embedding = excluded.embedding",
        )
        .bind(&record.id)
        .bind(&record.text)
        .bind(&record.contextualized_text)
        .bind(&record.domain)
        .bind(&record.task_type)
        .bind(tags)
        .bind(record.metrics.success_rate)
        .bind(record.metrics.avg_latency_ms)
        .bind(record.metrics.token_efficiency)
        .bind(record.metrics.observation_count as i64)
        .bind(record.metrics.last_updated)
        .bind(vector)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<PromptRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM prompt_records WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref()
            .map(|r| decode_row(r).map(|(record, _)| record))
            .transpose()
    }

    async fn find_by_text(
        &self,
        text: &str,
        domain: &str,
    ) -> Result<Option<PromptRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM prompt_records WHERE domain = ?1 AND text = ?2 LIMIT 1")
            .bind(domain)
            .bind(text)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref()
            .map(|r| decode_row(r).map(|(record, _)| record))
            .transpose()
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM prompt_records WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
