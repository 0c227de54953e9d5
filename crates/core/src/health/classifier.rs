//! Risk classification: one pure transition function shared by the batch sweep
//! and the delivery-event path.
//!
//! Customers with delivered orders are classified on cadence first and revenue
//! second; the first matching rule wins:
//!
//! 1. days since last order >= dormant threshold -> `DORMANT`
//! 2. days since last order >= cadence baseline -> `AT_RISK_CADENCE`
//! 3. recent revenue declined -> `AT_RISK_REVENUE`
//! 4. otherwise -> `HEALTHY`
//!
//! `dormancy_since` is stamped on entry to a dormancy run and survives until the
//! customer is HEALTHY again, at which point `reactivated_date` is stamped.
//! Customers without delivered orders go through the prospect branch instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::{
    CustomerHealthRecord, CustomerId, CustomerSnapshot, EngagementSignals, HealthState, RiskStatus,
};
use crate::domain::threshold::ThresholdConfig;
use crate::errors::DomainError;
use crate::health::cadence::{compute_pace, CadenceWindow};
use crate::health::days_between;
use crate::health::revenue::is_revenue_declined;

/// Trailing window in which logged activity counts as engagement.
pub const ENGAGEMENT_LOOKBACK_DAYS: i64 = 30;
/// Worked accounts younger than this stay warm prospects.
pub const PROSPECT_WARM_MAX_AGE_DAYS: i64 = 90;
/// Unworked accounts older than this are abandoned.
pub const UNQUALIFIED_AFTER_AGE_DAYS: i64 = 180;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyOptions {
    /// When false the revenue rule never fires. It can only turn a would-be
    /// AT_RISK_REVENUE into HEALTHY; the cadence rules are evaluated first.
    pub include_revenue_calc: bool,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self { include_revenue_calc: true }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub customer_id: CustomerId,
    pub previous: HealthState,
    pub next: HealthState,
    pub window: Option<CadenceWindow>,
    pub days_since_last_order: Option<i64>,
    pub revenue_declined: bool,
}

impl Classification {
    /// Whether any persisted field differs; unchanged results are not written.
    pub fn changed(&self) -> bool {
        self.previous != self.next
    }

    pub fn reactivated(&self) -> bool {
        self.previous.dormancy_since.is_some()
            && self.next.dormancy_since.is_none()
            && self.next.risk_status == RiskStatus::Healthy
    }

    pub fn entered_dormancy(&self) -> bool {
        self.next.risk_status == RiskStatus::Dormant
            && self.next.dormancy_since != self.previous.dormancy_since
    }
}

/// Computes the next health state for one customer snapshot.
pub fn classify(
    snapshot: &CustomerSnapshot,
    thresholds: &ThresholdConfig,
    options: ClassifyOptions,
    now: DateTime<Utc>,
) -> Result<Classification, DomainError> {
    let record = &snapshot.record;
    let previous = record.health.clone();

    let Some(latest) = snapshot.orders.first() else {
        let next = classify_without_orders(record, snapshot.engagement, now);
        return Ok(Classification {
            customer_id: record.id.clone(),
            previous,
            next,
            window: None,
            days_since_last_order: None,
            revenue_declined: false,
        });
    };

    let pace = compute_pace(&snapshot.orders);
    let window = CadenceWindow::from_pace(pace, thresholds);
    let last_order_date = latest.delivered_at;
    let days_since_last_order = days_between(now, last_order_date);

    let mut next = HealthState {
        risk_status: RiskStatus::Healthy,
        last_order_date: Some(last_order_date),
        next_expected_order_date: Some(window.next_expected_order_date(last_order_date)),
        average_order_interval_days: pace.average_interval_days,
        ordering_pace_days: Some(window.cadence_baseline_days),
        dormancy_since: previous.dormancy_since,
        reactivated_date: previous.reactivated_date,
    };
    let mut revenue_declined = false;

    if days_since_last_order >= window.dormant_threshold_days {
        next.risk_status = RiskStatus::Dormant;
        if previous.dormancy_since.is_none() {
            next.dormancy_since = Some(now);
            next.reactivated_date = None;
        }
    } else if days_since_last_order >= window.cadence_baseline_days {
        next.risk_status = RiskStatus::AtRiskCadence;
    } else {
        revenue_declined = options.include_revenue_calc
            && is_revenue_declined(
                &record.id,
                &snapshot.orders,
                record.established_revenue,
                thresholds.revenue_decline_percent,
            )?;

        if revenue_declined {
            next.risk_status = RiskStatus::AtRiskRevenue;
        } else if previous.dormancy_since.is_some() {
            next.reactivated_date = Some(now);
            next.dormancy_since = None;
        }
    }

    Ok(Classification {
        customer_id: record.id.clone(),
        previous,
        next,
        window: Some(window),
        days_since_last_order: Some(days_since_last_order),
        revenue_declined,
    })
}

/// Prospect branch for customers with no delivered orders: account age and
/// engagement decide, and dormancy does not apply.
pub fn classify_without_orders(
    record: &CustomerHealthRecord,
    engagement: EngagementSignals,
    now: DateTime<Utc>,
) -> HealthState {
    let age_days = days_between(now, record.created_at);

    let risk_status = if engagement.is_actively_worked() {
        if age_days < PROSPECT_WARM_MAX_AGE_DAYS {
            RiskStatus::Prospect
        } else {
            RiskStatus::ProspectCold
        }
    } else if age_days > UNQUALIFIED_AFTER_AGE_DAYS {
        RiskStatus::Unqualified
    } else {
        RiskStatus::ProspectCold
    };

    HealthState {
        risk_status,
        last_order_date: None,
        next_expected_order_date: None,
        average_order_interval_days: None,
        ordering_pace_days: None,
        dormancy_since: None,
        reactivated_date: record.health.reactivated_date,
    }
}
