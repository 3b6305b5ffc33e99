use super::json_document::JsonDocument;
use crate::error::AppResult;
use crate::infrastructure::db::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Metadata of one successfully narrated item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub title: String,
    pub processed_date: DateTime<Utc>,
    pub audio_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub artifact_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedItem {
    pub key: String,
    #[serde(flatten)]
    pub entry: IndexEntry,
}

/// Processed-items index. Entries are written only after the artifact exists.
#[async_trait]
pub trait IndexRepository: Send + Sync {
    async fn find(&self, key: &str) -> AppResult<Option<IndexEntry>>;

    async fn mark_processed(&self, key: &str, entry: IndexEntry) -> AppResult<()>;

    async fn remove(&self, key: &str) -> AppResult<bool>;

    /// All entries, most recently processed first
    async fn list(&self) -> AppResult<Vec<IndexedItem>>;

    async fn ping(&self) -> AppResult<()>;
}

/// Index stored as one JSON document keyed by item key
pub struct JsonIndexRepository {
    document: JsonDocument<BTreeMap<String, IndexEntry>>,
}

impl JsonIndexRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            document: JsonDocument::new(path),
        }
    }
}

#[async_trait]
impl IndexRepository for JsonIndexRepository {
    async fn find(&self, key: &str) -> AppResult<Option<IndexEntry>> {
        Ok(self.document.load().await?.remove(key))
    }

    async fn mark_processed(&self, key: &str, entry: IndexEntry) -> AppResult<()> {
        let key = key.to_string();
        self.document
            .update(move |index| {
                index.insert(key, entry);
            })
            .await
    }

    async fn remove(&self, key: &str) -> AppResult<bool> {
        self.document
            .update(|index| index.remove(key).is_some())
            .await
    }

    async fn list(&self) -> AppResult<Vec<IndexedItem>> {
        let index = self.document.load().await?;
        let mut items: Vec<IndexedItem> = index
            .into_iter()
            .map(|(key, entry)| IndexedItem { key, entry })
            .collect();
        items.sort_by(|a, b| b.entry.processed_date.cmp(&a.entry.processed_date));
        Ok(items)
    }

    async fn ping(&self) -> AppResult<()> {
        self.document.load().await.map(|_| ())
    }
}

#[derive(Debug, FromRow)]
struct IndexRow {
    item_key: String,
    title: String,
    processed_date: DateTime<Utc>,
    audio_ref: String,
    description: Option<String>,
    artifact_key: String,
}

impl From<IndexRow> for IndexedItem {
    fn from(row: IndexRow) -> Self {
        IndexedItem {
            key: row.item_key,
            entry: IndexEntry {
                title: row.title,
                processed_date: row.processed_date,
                audio_ref: row.audio_ref,
                description: row.description,
                artifact_key: row.artifact_key,
            },
        }
    }
}

pub struct PgIndexRepository {
    pool: Arc<DbPool>,
}

impl PgIndexRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IndexRepository for PgIndexRepository {
    async fn find(&self, key: &str) -> AppResult<Option<IndexEntry>> {
        let pool = self.pool.as_ref();
        let row = sqlx::query_as::<_, IndexRow>(
            r#"
            SELECT item_key, title, processed_date, audio_ref, description, artifact_key
            FROM processed_items
            WHERE item_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|row| IndexedItem::from(row).entry))
    }

    async fn mark_processed(&self, key: &str, entry: IndexEntry) -> AppResult<()> {
        let pool = self.pool.as_ref();
        sqlx::query(
            r#"
            INSERT INTO processed_items (item_key, title, processed_date, audio_ref, description, artifact_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (item_key)
            DO UPDATE SET
                title = EXCLUDED.title,
                processed_date = EXCLUDED.processed_date,
                audio_ref = EXCLUDED.audio_ref,
                description = EXCLUDED.description,
                artifact_key = EXCLUDED.artifact_key
            "#,
        )
        .bind(key)
        .bind(&entry.title)
        .bind(entry.processed_date)
        .bind(&entry.audio_ref)
        .bind(&entry.description)
        .bind(&entry.artifact_key)
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<bool> {
        let pool = self.pool.as_ref();
        let result = sqlx::query("DELETE FROM processed_items WHERE item_key = $1")
            .bind(key)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> AppResult<Vec<IndexedItem>> {
        let pool = self.pool.as_ref();
        let rows = sqlx::query_as::<_, IndexRow>(
            r#"
            SELECT item_key, title, processed_date, audio_ref, description, artifact_key
            FROM processed_items
            ORDER BY processed_date DESC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(IndexedItem::from).collect())
    }

    async fn ping(&self) -> AppResult<()> {
        crate::infrastructure::db::check_connection(&self.pool).await?;
        Ok(())
    }
}
