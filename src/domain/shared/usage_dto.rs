use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::usage::{Pricing, UsageSnapshot};

/// Response for GET /api/tts/usage
#[derive(Debug, Serialize, Deserialize)]
pub struct UsageResponse {
    pub period: String,
    pub usage: UsageStats,
    pub lifetime: LifetimeStats,
    pub limits: UsageLimits,
    pub resets_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsageStats {
    pub characters: i64,
    pub articles: i64,
    pub cost_estimate: Decimal,
    pub free_characters_remaining: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LifetimeStats {
    pub characters: i64,
    pub articles: i64,
    pub cost_estimate: Decimal,
    pub months: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsageLimits {
    pub free_characters: i64,
    pub price_per_million: Decimal,
}

impl UsageResponse {
    pub fn new(snapshot: UsageSnapshot, pricing: &Pricing, now: DateTime<Utc>) -> Self {
        Self {
            period: snapshot.current.month.to_string(),
            usage: UsageStats {
                characters: snapshot.current.chars_used,
                articles: snapshot.current.article_count,
                cost_estimate: to_cents(snapshot.current.cost_estimate),
                free_characters_remaining: snapshot.free_characters_remaining,
            },
            lifetime: LifetimeStats {
                characters: snapshot.lifetime.chars_used,
                articles: snapshot.lifetime.article_count,
                cost_estimate: to_cents(snapshot.lifetime.cost_estimate),
                months: snapshot.lifetime.months,
            },
            limits: UsageLimits {
                free_characters: pricing.free_characters,
                price_per_million: pricing.price_per_million,
            },
            resets_at: start_of_next_month(now),
        }
    }
}

fn to_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn start_of_next_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(now)
}
