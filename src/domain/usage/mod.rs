pub mod error;
pub mod model;
pub mod service;

pub use error::UsageServiceError;
pub use model::{
    LifetimeAggregate, MonthKey, Pricing, UsageRecord, UsageSnapshot, DEFAULT_FREE_CHARACTERS,
    DEFAULT_PRICE_PER_MILLION,
};
pub use service::UsageTracker;
