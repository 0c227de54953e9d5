//! Customer health engine.
//!
//! `classifier` holds the single transition function. `batch` and `realtime`
//! are its two call sites; both read thresholds through one shared
//! [`thresholds::ThresholdResolver`] and persist through
//! [`store::CustomerHealthStore`].

pub mod batch;
pub mod cadence;
pub mod classifier;
pub mod realtime;
pub mod revenue;
pub mod store;
pub mod summary;
#[cfg(test)]
mod testing;
pub mod thresholds;

use chrono::{DateTime, Utc};

pub use batch::{AssessmentSummary, BatchRunOptions, HealthAssessmentJob, StopSignal};
pub use classifier::{classify, classify_without_orders, Classification, ClassifyOptions};
pub use realtime::{OrderDeliveredEvent, RealTimeHealthUpdater, RealtimeOutcome, RevenueCalcPolicy};
pub use store::{CustomerHealthStore, HealthUpdate, SaveOutcome, SnapshotError};
pub use summary::HealthSummary;
pub use thresholds::{
    CacheInvalidation, InvalidationPublisher, ThresholdCacheBus, ThresholdResolver, ThresholdStore,
};

/// Maximum delivered orders loaded per customer.
pub const ORDER_HISTORY_LIMIT: usize = 10;

/// Whole days from `earlier` to `later`, floored.
pub fn days_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> i64 {
    (later - earlier).num_seconds().div_euclid(86_400)
}
