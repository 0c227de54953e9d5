//! Read side: a customer's persisted health explained.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::{CustomerHealthRecord, CustomerId, RiskStatus};
use crate::domain::threshold::ThresholdConfig;
use crate::health::cadence::{CadenceWindow, OrderingPace};
use crate::health::days_between;

/// Read-only view of a customer's persisted health, with the cadence window
/// recomputed from the stored pace so the numbers match what the classifier
/// used.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub customer_id: CustomerId,
    pub risk_status: RiskStatus,
    pub cadence_baseline_days: Option<i64>,
    pub grace_period_days: Option<i64>,
    pub dormant_threshold_days: Option<i64>,
    pub days_since_last_order: Option<i64>,
    pub last_order_date: Option<DateTime<Utc>>,
    pub next_expected_order_date: Option<DateTime<Utc>>,
    pub dormancy_since: Option<DateTime<Utc>>,
    pub reactivated_date: Option<DateTime<Utc>>,
    pub explanation: String,
}

impl HealthSummary {
    pub fn from_record(
        record: &CustomerHealthRecord,
        thresholds: &ThresholdConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let health = &record.health;
        let window = health.last_order_date.map(|_| {
            CadenceWindow::from_pace(
                OrderingPace { average_interval_days: health.average_order_interval_days },
                thresholds,
            )
        });
        let days_since_last_order = health.last_order_date.map(|last| days_between(now, last));

        Self {
            customer_id: record.id.clone(),
            risk_status: health.risk_status,
            cadence_baseline_days: window.map(|window| window.cadence_baseline_days),
            grace_period_days: window.map(|window| window.grace_period_days),
            dormant_threshold_days: window.map(|window| window.dormant_threshold_days),
            days_since_last_order,
            last_order_date: health.last_order_date,
            next_expected_order_date: health.next_expected_order_date,
            dormancy_since: health.dormancy_since,
            reactivated_date: health.reactivated_date,
            explanation: explain(health.risk_status, window.as_ref(), days_since_last_order),
        }
    }
}

fn explain(status: RiskStatus, window: Option<&CadenceWindow>, days_since: Option<i64>) -> String {
    let (Some(window), Some(days_since)) = (window, days_since) else {
        return match status {
            RiskStatus::Unqualified => {
                "No delivered orders and no recent prospecting; the account looks abandoned."
                    .to_string()
            }
            RiskStatus::Prospect => {
                "No delivered orders yet; the account is being actively worked.".to_string()
            }
            _ => "No delivered orders yet. Cadence tracking starts with the first delivery."
                .to_string(),
        };
    };

    let cadence = window.cadence_baseline_days;
    let grace = window.grace_period_days;
    match status {
        RiskStatus::Dormant => format!(
            "Dormant: expected every {cadence} days with {grace} days of grace, \
             but the last delivery was {days_since} days ago."
        ),
        RiskStatus::AtRiskCadence => format!(
            "At risk: {days_since} days since the last delivery against a {cadence}-day cadence. \
             Dormant after {} days.",
            window.dormant_threshold_days
        ),
        RiskStatus::AtRiskRevenue => format!(
            "At risk: ordering on time ({days_since} of {cadence} days) but recent order value \
             is below the established revenue."
        ),
        _ => format!(
            "Healthy: last delivery {days_since} days ago, within the {cadence}-day cadence \
             (grace {grace} days)."
        ),
    }
}
