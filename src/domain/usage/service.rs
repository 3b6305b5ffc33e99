use super::error::UsageServiceError;
use super::model::{LifetimeAggregate, MonthKey, Pricing, UsageRecord, UsageSnapshot};
use crate::infrastructure::repositories::UsageRepository;
use chrono::{DateTime, Utc};
use std::sync::Arc;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Monthly character ledger of the speech service
pub struct UsageTracker {
    usage_repo: Arc<dyn UsageRepository>,
    pricing: Pricing,
    clock: Clock,
}

impl UsageTracker {
    pub fn new(usage_repo: Arc<dyn UsageRepository>, pricing: Pricing) -> Self {
        Self {
            usage_repo,
            pricing,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn current_month(&self) -> MonthKey {
        MonthKey::from_datetime((self.clock)())
    }

    /// Adds one item's characters to `month`. Zero characters is a pure read.
    pub async fn record_usage(
        &self,
        month: &MonthKey,
        characters: u64,
    ) -> Result<UsageSnapshot, UsageServiceError> {
        if characters == 0 {
            return self.snapshot(month).await;
        }

        let characters = i64::try_from(characters).map_err(|_| {
            UsageServiceError::Invalid(format!("character count {} out of range", characters))
        })?;

        let record = self
            .usage_repo
            .add_usage(month, characters, &self.pricing)
            .await?;

        tracing::info!(
            month = %record.month,
            added_chars = characters,
            chars_used = record.chars_used,
            article_count = record.article_count,
            cost_estimate = %record.cost_estimate,
            "Usage recorded"
        );

        self.snapshot(month).await
    }

    /// Current month bucket plus lifetime totals; never mutates
    pub async fn current_month_stats(&self) -> Result<UsageSnapshot, UsageServiceError> {
        self.snapshot(&self.current_month()).await
    }

    /// Whether the free allowance of the current month is used up
    pub async fn quota_exhausted(&self) -> Result<bool, UsageServiceError> {
        let current = self
            .usage_repo
            .find_month(&self.current_month())
            .await?
            .map(|record| record.chars_used)
            .unwrap_or(0);
        Ok(current >= self.pricing.free_characters)
    }

    async fn snapshot(&self, month: &MonthKey) -> Result<UsageSnapshot, UsageServiceError> {
        let records = self.usage_repo.all_months().await?;
        let current = records
            .iter()
            .find(|record| &record.month == month)
            .cloned()
            .unwrap_or_else(|| UsageRecord::empty(month.clone()));

        Ok(UsageSnapshot {
            free_characters_remaining: (self.pricing.free_characters - current.chars_used).max(0),
            lifetime: LifetimeAggregate::from_records(&records),
            current,
        })
    }
}
