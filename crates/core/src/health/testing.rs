//! Store doubles shared by the engine's unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::domain::customer::{
    CustomerHealthRecord, CustomerId, CustomerSnapshot, DeliveredOrder, EngagementSignals,
    HealthState, Segment, Tenant, TenantId, TenantSelector,
};
use crate::domain::threshold::ThresholdRule;
use crate::errors::ApplicationError;
use crate::health::store::{CustomerHealthStore, HealthUpdate, SaveOutcome, SnapshotError};
use crate::health::thresholds::ThresholdStore;

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 1, 6, 0, 0).single().expect("valid date")
}

#[derive(Default)]
struct State {
    customers: BTreeMap<CustomerId, CustomerSnapshot>,
    broken: HashSet<CustomerId>,
    conflict_once: HashSet<CustomerId>,
    saves: usize,
}

pub struct FakeHealthStore {
    tenant: Tenant,
    state: Mutex<State>,
}

impl FakeHealthStore {
    pub fn with_tenant(id: &str, slug: &str) -> Self {
        Self {
            tenant: Tenant { id: TenantId(id.to_string()), slug: slug.to_string(), name: None },
            state: Mutex::new(State::default()),
        }
    }

    pub fn add_customer(&self, id: &str, created_days_ago: i64, order_days_ago: &[i64]) {
        let now = fixed_now();
        let record = CustomerHealthRecord {
            id: CustomerId(id.to_string()),
            tenant_id: self.tenant.id.clone(),
            name: format!("Customer {id}"),
            segment: Segment::default(),
            established_revenue: None,
            is_permanently_closed: false,
            created_at: now - Duration::days(created_days_ago),
            updated_at: now - Duration::days(created_days_ago),
            revision: 0,
            health: HealthState::new_prospect(),
        };
        let orders = order_days_ago
            .iter()
            .enumerate()
            .map(|(index, days)| DeliveredOrder {
                id: format!("{id}-ord-{index}"),
                delivered_at: now - Duration::days(*days),
                total: Some(Decimal::from(500)),
            })
            .collect();
        self.lock().customers.insert(
            record.id.clone(),
            CustomerSnapshot { record, orders, engagement: EngagementSignals::default() },
        );
    }

    pub fn edit(&self, id: &str, apply: impl FnOnce(&mut CustomerSnapshot)) {
        if let Some(snapshot) = self.lock().customers.get_mut(&CustomerId(id.to_string())) {
            apply(snapshot);
        }
    }

    pub fn set_negative_total(&self, id: &str) {
        self.edit(id, |snapshot| {
            if let Some(order) = snapshot.orders.last_mut() {
                order.total = Some(Decimal::from(-40));
            }
        });
    }

    pub fn add_broken(&self, id: &str) {
        self.add_customer(id, 10, &[]);
        self.lock().broken.insert(CustomerId(id.to_string()));
    }

    pub fn bump_revision_on_next_save(&self, id: &CustomerId) {
        self.lock().conflict_once.insert(id.clone());
    }

    pub fn health_of(&self, id: &str) -> Option<HealthState> {
        self.lock().customers.get(&CustomerId(id.to_string())).map(|s| s.record.health.clone())
    }

    pub fn saves(&self) -> usize {
        self.lock().saves
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake store lock")
    }
}

#[async_trait]
impl CustomerHealthStore for FakeHealthStore {
    async fn find_tenant(&self, selector: &TenantSelector) -> Result<Option<Tenant>, ApplicationError> {
        let found = match selector {
            TenantSelector::Id(id) => &self.tenant.id == id,
            TenantSelector::Slug(slug) => &self.tenant.slug == slug,
        };
        Ok(found.then(|| self.tenant.clone()))
    }

    async fn load_snapshots(
        &self,
        tenant_id: &TenantId,
        after: Option<&CustomerId>,
        limit: usize,
        _now: DateTime<Utc>,
    ) -> Result<Vec<Result<CustomerSnapshot, SnapshotError>>, ApplicationError> {
        let state = self.lock();
        Ok(state
            .customers
            .values()
            .filter(|snapshot| &snapshot.record.tenant_id == tenant_id)
            .filter(|snapshot| !snapshot.record.is_permanently_closed)
            .filter(|snapshot| after.map_or(true, |after| &snapshot.record.id > after))
            .take(limit)
            .map(|snapshot| {
                if state.broken.contains(&snapshot.record.id) {
                    Err(SnapshotError {
                        customer_id: snapshot.record.id.clone(),
                        reason: "unparsable order total".to_string(),
                    })
                } else {
                    Ok(snapshot.clone())
                }
            })
            .collect())
    }

    async fn load_snapshot(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
        _now: DateTime<Utc>,
    ) -> Result<Option<Result<CustomerSnapshot, SnapshotError>>, ApplicationError> {
        let state = self.lock();
        Ok(state
            .customers
            .get(customer_id)
            .filter(|snapshot| &snapshot.record.tenant_id == tenant_id)
            .filter(|snapshot| !snapshot.record.is_permanently_closed)
            .map(|snapshot| {
                if state.broken.contains(customer_id) {
                    Err(SnapshotError {
                        customer_id: customer_id.clone(),
                        reason: "unparsable order total".to_string(),
                    })
                } else {
                    Ok(snapshot.clone())
                }
            }))
    }

    async fn save_health(
        &self,
        updates: &[HealthUpdate],
        now: DateTime<Utc>,
    ) -> Result<Vec<SaveOutcome>, ApplicationError> {
        let mut state = self.lock();
        state.saves += 1;
        let mut outcomes = Vec::with_capacity(updates.len());
        for update in updates {
            if state.conflict_once.remove(&update.customer_id) {
                if let Some(snapshot) = state.customers.get_mut(&update.customer_id) {
                    snapshot.record.revision += 1;
                }
            }
            let Some(snapshot) = state.customers.get_mut(&update.customer_id) else {
                outcomes.push(SaveOutcome::Conflict);
                continue;
            };
            if snapshot.record.revision != update.expected_revision {
                outcomes.push(SaveOutcome::Conflict);
                continue;
            }
            snapshot.record.health = update.state.clone();
            snapshot.record.revision += 1;
            snapshot.record.updated_at = now;
            outcomes.push(SaveOutcome::Saved);
        }
        Ok(outcomes)
    }
}

#[derive(Default)]
pub struct FakeThresholdStore {
    rules: Vec<ThresholdRule>,
    fail: bool,
}

impl FakeThresholdStore {
    pub fn with_rules(rules: Vec<ThresholdRule>) -> Self {
        Self { rules, fail: false }
    }

    pub fn failing() -> Self {
        Self { rules: Vec::new(), fail: true }
    }
}

#[async_trait]
impl ThresholdStore for FakeThresholdStore {
    async fn rules_for_segment(
        &self,
        tenant_id: &TenantId,
        _segment: &Segment,
    ) -> Result<Vec<ThresholdRule>, ApplicationError> {
        if self.fail {
            return Err(ApplicationError::Persistence("threshold query failed".to_string()));
        }
        Ok(self.rules.iter().filter(|rule| &rule.tenant_id == tenant_id).cloned().collect())
    }
}
