use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FREE_CHARACTERS: i64 = 1_000_000;
pub const DEFAULT_PRICE_PER_MILLION: i64 = 30;

/// Calendar month bucket key, `YYYY-MM`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey(String);

impl MonthKey {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        MonthKey(format!("{:04}-{:02}", at.year(), at.month()))
    }

    pub fn current() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        NaiveDate::parse_from_str(&format!("{}-01", value), "%Y-%m-%d")
            .map(|date| MonthKey(format!("{:04}-{:02}", date.year(), date.month())))
            .map_err(|_| format!("invalid month key '{}', expected YYYY-MM", value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for MonthKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        MonthKey::parse(&value)
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.0
    }
}

/// Free allowance and overage price of the speech service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub free_characters: i64,
    pub price_per_million: Decimal,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            free_characters: DEFAULT_FREE_CHARACTERS,
            price_per_million: Decimal::from(DEFAULT_PRICE_PER_MILLION),
        }
    }
}

impl Pricing {
    /// `max(0, chars - free) / 1_000_000 × price` in dollars, unrounded.
    /// Sums stay exact; rounding to cents happens only for display.
    pub fn cost_estimate(&self, chars_used: i64) -> Decimal {
        let billable = (chars_used - self.free_characters).max(0);
        Decimal::from(billable) / Decimal::from(1_000_000) * self.price_per_million
    }
}

/// One month of the usage ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub month: MonthKey,
    pub chars_used: i64,
    pub article_count: i64,
    pub cost_estimate: Decimal,
}

impl UsageRecord {
    pub fn empty(month: MonthKey) -> Self {
        Self {
            month,
            chars_used: 0,
            article_count: 0,
            cost_estimate: Decimal::ZERO,
        }
    }

    /// Adds one item's characters and recomputes the cost
    pub fn apply(&mut self, chars: i64, pricing: &Pricing) {
        self.chars_used += chars;
        self.article_count += 1;
        self.cost_estimate = pricing.cost_estimate(self.chars_used);
    }
}

/// Sum over every month bucket; derived, never stored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifetimeAggregate {
    pub chars_used: i64,
    pub article_count: i64,
    pub cost_estimate: Decimal,
    pub months: usize,
}

impl LifetimeAggregate {
    pub fn from_records(records: &[UsageRecord]) -> Self {
        records.iter().fold(Self::default(), |mut acc, record| {
            acc.chars_used += record.chars_used;
            acc.article_count += record.article_count;
            acc.cost_estimate += record.cost_estimate;
            acc.months += 1;
            acc
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub current: UsageRecord,
    pub lifetime: LifetimeAggregate,
    pub free_characters_remaining: i64,
}
