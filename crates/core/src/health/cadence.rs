//! Ordering pace and the cadence window derived from it.
//!
//! The pace is the raw mean gap between the most recent delivered orders. The
//! window bounds that pace into the baseline actually used for thresholding:
//! floored at the segment's `dormant_days`, hard-capped for infrequent buyers,
//! and with the dormancy threshold never exceeding an absolute cap.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::customer::DeliveredOrder;
use crate::domain::threshold::ThresholdConfig;
use crate::health::days_between;

/// Orders considered for the pace; older history no longer reflects behavior.
pub const PACE_WINDOW_ORDERS: usize = 5;
/// Raw cadence above this marks an infrequent orderer.
pub const INFREQUENT_CADENCE_DAYS: i64 = 90;
/// Baseline used for infrequent orderers in place of their raw pace.
pub const INFREQUENT_CADENCE_CAP_DAYS: i64 = 60;
/// No customer waits longer than this before becoming eligible for dormancy.
pub const ABSOLUTE_DORMANT_CAP_DAYS: i64 = 90;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingPace {
    pub average_interval_days: Option<i64>,
}

/// Mean gap in whole days between consecutive orders among the newest
/// [`PACE_WINDOW_ORDERS`]. `orders` must be newest first. Non-positive gaps are
/// discarded; fewer than two usable orders yields no pace.
pub fn compute_pace(orders: &[DeliveredOrder]) -> OrderingPace {
    let window = &orders[..orders.len().min(PACE_WINDOW_ORDERS)];
    let gaps: Vec<i64> = window
        .windows(2)
        .map(|pair| days_between(pair[0].delivered_at, pair[1].delivered_at))
        .filter(|gap| *gap > 0)
        .collect();

    if gaps.is_empty() {
        return OrderingPace::default();
    }

    let sum: i64 = gaps.iter().sum();
    let count = gaps.len() as i64;
    // Round half up on a positive mean.
    let average = (2 * sum + count) / (2 * count);
    OrderingPace { average_interval_days: Some(average) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CadenceWindow {
    pub raw_cadence_days: i64,
    pub is_infrequent: bool,
    pub cadence_baseline_days: i64,
    pub grace_period_days: i64,
    pub dormant_threshold_days: i64,
}

impl CadenceWindow {
    pub fn from_pace(pace: OrderingPace, thresholds: &ThresholdConfig) -> Self {
        let raw_cadence_days = pace.average_interval_days.unwrap_or(thresholds.dormant_days);
        let is_infrequent = raw_cadence_days > INFREQUENT_CADENCE_DAYS;
        let cadence_baseline_days = if is_infrequent {
            INFREQUENT_CADENCE_CAP_DAYS
        } else {
            raw_cadence_days.max(thresholds.dormant_days)
        };
        let grace_period_days = grace_days(cadence_baseline_days, thresholds);
        let dormant_threshold_days =
            (cadence_baseline_days + grace_period_days).min(ABSOLUTE_DORMANT_CAP_DAYS);

        Self {
            raw_cadence_days,
            is_infrequent,
            cadence_baseline_days,
            grace_period_days,
            dormant_threshold_days,
        }
    }

    pub fn next_expected_order_date(&self, last_order_date: DateTime<Utc>) -> DateTime<Utc> {
        last_order_date + Duration::days(self.cadence_baseline_days)
    }
}

fn grace_days(cadence_baseline_days: i64, thresholds: &ThresholdConfig) -> i64 {
    let scaled = (Decimal::from(cadence_baseline_days) * thresholds.grace_period_percent)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0);
    scaled.max(thresholds.min_grace_days)
}
