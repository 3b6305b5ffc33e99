use super::json_document::JsonDocument;
use crate::domain::usage::{MonthKey, Pricing, UsageRecord};
use crate::error::{AppError, AppResult};
use crate::infrastructure::db::DbPool;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Monthly usage ledger. `add_usage` must be an atomic read-modify-write.
#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Add one item's characters to a month and return the updated bucket
    async fn add_usage(
        &self,
        month: &MonthKey,
        characters: i64,
        pricing: &Pricing,
    ) -> AppResult<UsageRecord>;

    async fn find_month(&self, month: &MonthKey) -> AppResult<Option<UsageRecord>>;

    /// Every month bucket, oldest first
    async fn all_months(&self) -> AppResult<Vec<UsageRecord>>;

    async fn ping(&self) -> AppResult<()>;
}

/// Ledger document entry, keyed by `YYYY-MM`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerEntry {
    chars_used: i64,
    article_count: i64,
    cost_estimate: Decimal,
}

type LedgerDocument = BTreeMap<String, LedgerEntry>;

fn to_record(month: &str, entry: &LedgerEntry) -> AppResult<UsageRecord> {
    Ok(UsageRecord {
        month: MonthKey::parse(month).map_err(AppError::Internal)?,
        chars_used: entry.chars_used,
        article_count: entry.article_count,
        cost_estimate: entry.cost_estimate,
    })
}

/// Usage ledger stored as a single JSON document
pub struct JsonUsageRepository {
    document: JsonDocument<LedgerDocument>,
}

impl JsonUsageRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            document: JsonDocument::new(path),
        }
    }
}

#[async_trait]
impl UsageRepository for JsonUsageRepository {
    async fn add_usage(
        &self,
        month: &MonthKey,
        characters: i64,
        pricing: &Pricing,
    ) -> AppResult<UsageRecord> {
        let key = month.to_string();
        let entry = self
            .document
            .update(|ledger| {
                let mut record = ledger
                    .get(&key)
                    .map(|entry| UsageRecord {
                        month: month.clone(),
                        chars_used: entry.chars_used,
                        article_count: entry.article_count,
                        cost_estimate: entry.cost_estimate,
                    })
                    .unwrap_or_else(|| UsageRecord::empty(month.clone()));
                record.apply(characters, pricing);

                let entry = LedgerEntry {
                    chars_used: record.chars_used,
                    article_count: record.article_count,
                    cost_estimate: record.cost_estimate,
                };
                ledger.insert(key.clone(), entry.clone());
                entry
            })
            .await?;

        to_record(month.as_str(), &entry)
    }

    async fn find_month(&self, month: &MonthKey) -> AppResult<Option<UsageRecord>> {
        let ledger = self.document.load().await?;
        ledger
            .get(month.as_str())
            .map(|entry| to_record(month.as_str(), entry))
            .transpose()
    }

    async fn all_months(&self) -> AppResult<Vec<UsageRecord>> {
        let ledger = self.document.load().await?;
        ledger
            .iter()
            .map(|(month, entry)| to_record(month, entry))
            .collect()
    }

    async fn ping(&self) -> AppResult<()> {
        self.document.load().await.map(|_| ())
    }
}

#[derive(Debug, FromRow)]
struct UsageRow {
    month: String,
    chars_used: i64,
    article_count: i64,
    cost_estimate: Decimal,
}

impl TryFrom<UsageRow> for UsageRecord {
    type Error = AppError;

    fn try_from(row: UsageRow) -> Result<Self, Self::Error> {
        Ok(UsageRecord {
            month: MonthKey::parse(&row.month).map_err(AppError::Internal)?,
            chars_used: row.chars_used,
            article_count: row.article_count,
            cost_estimate: row.cost_estimate,
        })
    }
}

/// Usage ledger in PostgreSQL; the upsert makes concurrent writers safe
pub struct PgUsageRepository {
    pool: Arc<DbPool>,
}

impl PgUsageRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepository for PgUsageRepository {
    async fn add_usage(
        &self,
        month: &MonthKey,
        characters: i64,
        pricing: &Pricing,
    ) -> AppResult<UsageRecord> {
        let pool = self.pool.as_ref();
        let now = chrono::Utc::now();

        let row = sqlx::query_as::<_, UsageRow>(
            r#"
            INSERT INTO monthly_usage (month, chars_used, article_count, cost_estimate, updated_at)
            VALUES ($1, $2, 1, GREATEST($2 - $3, 0)::NUMERIC / 1000000 * $4, $5)
            ON CONFLICT (month)
            DO UPDATE SET
                chars_used = monthly_usage.chars_used + EXCLUDED.chars_used,
                article_count = monthly_usage.article_count + 1,
                cost_estimate =
                    GREATEST(monthly_usage.chars_used + EXCLUDED.chars_used - $3, 0)::NUMERIC / 1000000 * $4,
                updated_at = $5
            RETURNING month, chars_used, article_count, cost_estimate
            "#,
        )
        .bind(month.as_str())
        .bind(characters)
        .bind(pricing.free_characters)
        .bind(pricing.price_per_million)
        .bind(now)
        .fetch_one(pool)
        .await?;

        row.try_into()
    }

    async fn find_month(&self, month: &MonthKey) -> AppResult<Option<UsageRecord>> {
        let pool = self.pool.as_ref();
        let row = sqlx::query_as::<_, UsageRow>(
            r#"
            SELECT month, chars_used, article_count, cost_estimate
            FROM monthly_usage
            WHERE month = $1
            "#,
        )
        .bind(month.as_str())
        .fetch_optional(pool)
        .await?;

        row.map(UsageRecord::try_from).transpose()
    }

    async fn all_months(&self) -> AppResult<Vec<UsageRecord>> {
        let pool = self.pool.as_ref();
        let rows = sqlx::query_as::<_, UsageRow>(
            r#"
            SELECT month, chars_used, article_count, cost_estimate
            FROM monthly_usage
            ORDER BY month ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(UsageRecord::try_from).collect()
    }

    async fn ping(&self) -> AppResult<()> {
        crate::infrastructure::db::check_connection(&self.pool)
            .await
            .map(|_| ())
            .map_err(AppError::from)
    }
}
