//! Single-customer reclassification triggered by an order delivery.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::domain::customer::{AccountPriority, CustomerId, RiskStatus, TenantId};
use crate::errors::ApplicationError;
use crate::health::classifier::{classify, ClassifyOptions};
use crate::health::store::{CustomerHealthStore, HealthUpdate, SaveOutcome};
use crate::health::thresholds::{ThresholdResolver, ThresholdStore};

/// First attempt plus one retry from a fresh read.
const MAX_ATTEMPTS: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDeliveredEvent {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub order_id: String,
    #[serde(default)]
    pub account_priority: Option<AccountPriority>,
}

/// Which account priorities skip the revenue rule on the event path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueCalcPolicy {
    pub skip_for_priorities: Vec<AccountPriority>,
}

impl RevenueCalcPolicy {
    pub fn new(skip_for_priorities: Vec<AccountPriority>) -> Self {
        Self { skip_for_priorities }
    }

    /// An unknown priority keeps the revenue rule on.
    pub fn include_revenue_calc(&self, priority: Option<AccountPriority>) -> bool {
        priority.map_or(true, |priority| !self.skip_for_priorities.contains(&priority))
    }
}

impl Default for RevenueCalcPolicy {
    fn default() -> Self {
        Self::new(vec![AccountPriority::Low])
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RealtimeOutcome {
    Updated { previous: RiskStatus, risk_status: RiskStatus, reactivated: bool },
    Unchanged { risk_status: RiskStatus },
    /// Unknown to the tenant, or permanently closed.
    NotFound,
    /// State left as it was until the next successful pass.
    ClassificationFailed { reason: String },
    /// Lost the write race on every attempt.
    Conflict,
}

pub struct RealTimeHealthUpdater<S, T> {
    store: S,
    resolver: Arc<ThresholdResolver<T>>,
    policy: RevenueCalcPolicy,
}

impl<S, T> RealTimeHealthUpdater<S, T>
where
    S: CustomerHealthStore,
    T: ThresholdStore,
{
    pub fn new(store: S, resolver: Arc<ThresholdResolver<T>>, policy: RevenueCalcPolicy) -> Self {
        Self { store, resolver, policy }
    }

    pub fn policy(&self) -> &RevenueCalcPolicy {
        &self.policy
    }

    pub async fn handle_order_delivered(
        &self,
        event: &OrderDeliveredEvent,
        now: DateTime<Utc>,
    ) -> Result<RealtimeOutcome, ApplicationError> {
        let include_revenue_calc = self.policy.include_revenue_calc(event.account_priority);
        debug!(
            event_name = "health.realtime.received",
            tenant_id = %event.tenant_id,
            customer_id = %event.customer_id,
            order_id = %event.order_id,
            include_revenue_calc,
            "order delivered"
        );
        self.update_customer(&event.tenant_id, &event.customer_id, include_revenue_calc, now).await
    }

    /// Reclassifies one customer from a fresh read.
    ///
    /// Classification failures come back as
    /// [`RealtimeOutcome::ClassificationFailed`]; only store and threshold
    /// failures are errors.
    pub async fn update_customer(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
        include_revenue_calc: bool,
        now: DateTime<Utc>,
    ) -> Result<RealtimeOutcome, ApplicationError> {
        let options = ClassifyOptions { include_revenue_calc };

        for attempt in 1..=MAX_ATTEMPTS {
            let snapshot = match self.store.load_snapshot(tenant_id, customer_id, now).await? {
                Some(Ok(snapshot)) => snapshot,
                Some(Err(failure)) => {
                    error!(
                        event_name = "health.realtime.classification_failed",
                        tenant_id = %tenant_id,
                        customer_id = %customer_id,
                        error = %failure.reason,
                        "customer snapshot could not be decoded, state left as is"
                    );
                    return Ok(RealtimeOutcome::ClassificationFailed { reason: failure.reason });
                }
                None => return Ok(RealtimeOutcome::NotFound),
            };
            let thresholds = self.resolver.resolve(tenant_id, &snapshot.record.segment).await?;

            let classification = match classify(&snapshot, &thresholds, options, now) {
                Ok(classification) => classification,
                Err(failure) => {
                    error!(
                        event_name = "health.realtime.classification_failed",
                        tenant_id = %tenant_id,
                        customer_id = %customer_id,
                        error = %failure,
                        "real-time classification failed, state left as is"
                    );
                    return Ok(RealtimeOutcome::ClassificationFailed { reason: failure.to_string() });
                }
            };

            if !classification.changed() {
                debug!(
                    event_name = "health.realtime.unchanged",
                    tenant_id = %tenant_id,
                    customer_id = %customer_id,
                    risk_status = classification.next.risk_status.as_str(),
                    "customer health unchanged"
                );
                return Ok(RealtimeOutcome::Unchanged { risk_status: classification.next.risk_status });
            }

            let reactivated = classification.reactivated();
            let previous = classification.previous.risk_status;
            let risk_status = classification.next.risk_status;
            let update = HealthUpdate {
                tenant_id: tenant_id.clone(),
                customer_id: customer_id.clone(),
                expected_revision: snapshot.record.revision,
                state: classification.next,
            };

            let outcomes = self.store.save_health(std::slice::from_ref(&update), now).await?;
            if outcomes.first() == Some(&SaveOutcome::Saved) {
                info!(
                    event_name = "health.realtime.updated",
                    tenant_id = %tenant_id,
                    customer_id = %customer_id,
                    previous = previous.as_str(),
                    risk_status = risk_status.as_str(),
                    reactivated,
                    "customer health updated"
                );
                return Ok(RealtimeOutcome::Updated { previous, risk_status, reactivated });
            }

            warn!(
                event_name = "health.realtime.conflict",
                tenant_id = %tenant_id,
                customer_id = %customer_id,
                attempt,
                "customer changed concurrently"
            );
        }

        Ok(RealtimeOutcome::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use rust_decimal::Decimal;

    use super::{OrderDeliveredEvent, RealTimeHealthUpdater, RealtimeOutcome, RevenueCalcPolicy};
    use crate::domain::customer::{
        AccountPriority, CustomerId, HealthState, RiskStatus, TenantId, TenantSelector,
    };
    use crate::errors::ApplicationError;
    use crate::health::batch::{BatchRunOptions, HealthAssessmentJob, StopSignal};
    use crate::health::testing::{fixed_now, FakeHealthStore, FakeThresholdStore};
    use crate::health::thresholds::ThresholdResolver;

    type Updater = RealTimeHealthUpdater<Arc<FakeHealthStore>, FakeThresholdStore>;

    fn updater(store: Arc<FakeHealthStore>) -> Updater {
        RealTimeHealthUpdater::new(
            store,
            Arc::new(ThresholdResolver::new(FakeThresholdStore::default())),
            RevenueCalcPolicy::default(),
        )
    }

    fn event(customer: &str, priority: Option<AccountPriority>) -> OrderDeliveredEvent {
        OrderDeliveredEvent {
            tenant_id: TenantId("t1".to_string()),
            customer_id: CustomerId(customer.to_string()),
            order_id: "ord-new".to_string(),
            account_priority: priority,
        }
    }

    fn revenue_decliner(store: &FakeHealthStore, id: &str) {
        store.add_customer(id, 400, &[5, 35, 65]);
        store.edit(id, |snapshot| {
            snapshot.record.established_revenue = Some(Decimal::from(1_000));
            snapshot.record.health =
                HealthState { risk_status: RiskStatus::Healthy, ..HealthState::new_prospect() };
        });
    }

    #[test]
    fn policy_skips_listed_priorities_only() {
        let policy = RevenueCalcPolicy::default();
        assert!(!policy.include_revenue_calc(Some(AccountPriority::Low)));
        assert!(policy.include_revenue_calc(Some(AccountPriority::High)));
        assert!(policy.include_revenue_calc(None));
    }

    #[tokio::test]
    async fn delivery_reactivates_a_dormant_customer() {
        let store = Arc::new(FakeHealthStore::with_tenant("t1", "acme"));
        store.add_customer("c1", 400, &[0, 95, 135]);
        store.edit("c1", |snapshot| {
            snapshot.record.health = HealthState {
                risk_status: RiskStatus::Dormant,
                dormancy_since: Some(fixed_now() - Duration::days(40)),
                ..HealthState::new_prospect()
            };
        });

        let outcome = updater(store.clone())
            .handle_order_delivered(&event("c1", Some(AccountPriority::High)), fixed_now())
            .await
            .expect("update succeeds");

        assert_eq!(
            outcome,
            RealtimeOutcome::Updated {
                previous: RiskStatus::Dormant,
                risk_status: RiskStatus::Healthy,
                reactivated: true
            }
        );
        let health = store.health_of("c1").expect("customer exists");
        assert_eq!(health.reactivated_date, Some(fixed_now()));
        assert_eq!(health.dormancy_since, None);
    }

    #[tokio::test]
    async fn low_priority_event_skips_revenue_rule() {
        let store = Arc::new(FakeHealthStore::with_tenant("t1", "acme"));
        revenue_decliner(&store, "c1");
        revenue_decliner(&store, "c2");
        let updater = updater(store.clone());

        let low = updater
            .handle_order_delivered(&event("c1", Some(AccountPriority::Low)), fixed_now())
            .await
            .expect("update succeeds");
        let high = updater
            .handle_order_delivered(&event("c2", Some(AccountPriority::High)), fixed_now())
            .await
            .expect("update succeeds");

        assert!(matches!(low, RealtimeOutcome::Updated { risk_status: RiskStatus::Healthy, .. }));
        assert!(matches!(
            high,
            RealtimeOutcome::Updated { risk_status: RiskStatus::AtRiskRevenue, .. }
        ));
    }

    #[tokio::test]
    async fn conflict_is_retried_once_from_a_fresh_read() {
        let store = Arc::new(FakeHealthStore::with_tenant("t1", "acme"));
        store.add_customer("c1", 400, &[70, 110]);
        store.bump_revision_on_next_save(&CustomerId("c1".to_string()));

        let outcome = updater(store.clone())
            .update_customer(&TenantId("t1".to_string()), &CustomerId("c1".to_string()), true, fixed_now())
            .await
            .expect("update succeeds");

        assert!(matches!(outcome, RealtimeOutcome::Updated { risk_status: RiskStatus::Dormant, .. }));
        assert_eq!(store.saves(), 2);
    }

    #[tokio::test]
    async fn classification_failure_does_not_surface_as_error() {
        let store = Arc::new(FakeHealthStore::with_tenant("t1", "acme"));
        store.add_customer("c1", 400, &[5, 35]);
        store.set_negative_total("c1");

        let outcome = updater(store.clone())
            .handle_order_delivered(&event("c1", None), fixed_now())
            .await
            .expect("never an error");

        assert!(matches!(outcome, RealtimeOutcome::ClassificationFailed { .. }));
        assert_eq!(store.saves(), 0);
    }

    #[tokio::test]
    async fn unknown_or_closed_customer_is_not_found() {
        let store = Arc::new(FakeHealthStore::with_tenant("t1", "acme"));
        store.add_customer("closed", 400, &[5]);
        store.edit("closed", |snapshot| snapshot.record.is_permanently_closed = true);
        let updater = updater(store);

        for customer in ["ghost", "closed"] {
            let outcome = updater
                .handle_order_delivered(&event(customer, None), fixed_now())
                .await
                .expect("lookup succeeds");
            assert_eq!(outcome, RealtimeOutcome::NotFound);
        }
    }

    #[tokio::test]
    async fn undecodable_snapshot_is_a_classification_failure() {
        let store = Arc::new(FakeHealthStore::with_tenant("t1", "acme"));
        store.add_broken("c1");

        let outcome = updater(store.clone())
            .handle_order_delivered(&event("c1", None), fixed_now())
            .await
            .expect("decode failures are not errors");

        assert_eq!(
            outcome,
            RealtimeOutcome::ClassificationFailed { reason: "unparsable order total".to_string() }
        );
        assert_eq!(store.saves(), 0);
    }

    #[tokio::test]
    async fn threshold_store_failure_propagates() {
        let store = Arc::new(FakeHealthStore::with_tenant("t1", "acme"));
        store.add_customer("c1", 400, &[5, 35]);
        let updater = RealTimeHealthUpdater::new(
            store,
            Arc::new(ThresholdResolver::new(FakeThresholdStore::failing())),
            RevenueCalcPolicy::default(),
        );

        let error = updater
            .handle_order_delivered(&event("c1", None), fixed_now())
            .await
            .expect_err("store failure is fatal");
        assert!(matches!(error, ApplicationError::Persistence(_)));
    }

    #[tokio::test]
    async fn batch_and_event_paths_agree_on_identical_histories() {
        let histories: [&[i64]; 6] = [
            &[70, 110, 150, 190, 230],
            &[5, 35, 65],
            &[50, 90],
            &[1, 400, 800],
            &[85, 170],
            &[],
        ];
        let batch_store = Arc::new(FakeHealthStore::with_tenant("t1", "acme"));
        let event_store = Arc::new(FakeHealthStore::with_tenant("t1", "acme"));
        for (index, history) in histories.iter().enumerate() {
            let id = format!("c{index}");
            for store in [&batch_store, &event_store] {
                store.add_customer(&id, 120, history);
                store.edit(&id, |snapshot| {
                    snapshot.record.established_revenue = Some(Decimal::from(1_000));
                    snapshot.record.health = HealthState {
                        risk_status: RiskStatus::Dormant,
                        dormancy_since: Some(fixed_now() - Duration::days(10)),
                        ..HealthState::new_prospect()
                    };
                });
            }
        }

        HealthAssessmentJob::new(
            batch_store.clone(),
            Arc::new(ThresholdResolver::new(FakeThresholdStore::default())),
        )
        .run(
            &BatchRunOptions::new(TenantSelector::Slug("acme".to_string())),
            fixed_now(),
            &StopSignal::new(),
        )
        .await
        .expect("batch succeeds");

        let updater = updater(event_store.clone());
        for index in 0..histories.len() {
            let id = format!("c{index}");
            updater
                .handle_order_delivered(&event(&id, Some(AccountPriority::High)), fixed_now())
                .await
                .expect("event succeeds");
            assert_eq!(batch_store.health_of(&id), event_store.health_of(&id), "customer {id}");
        }
    }
}
