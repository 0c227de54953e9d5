//! Persistence seam for customer snapshots and assessed health.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::{
    CustomerId, CustomerSnapshot, HealthState, Tenant, TenantId, TenantSelector,
};
use crate::errors::ApplicationError;

/// A customer row that could not be turned into a snapshot. Reported per
/// customer so one bad row does not sink its chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotError {
    pub customer_id: CustomerId,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthUpdate {
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    /// Revision the classification was computed from.
    pub expected_revision: i64,
    pub state: HealthState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved,
    /// Another writer committed since the snapshot was read.
    Conflict,
}

#[async_trait]
pub trait CustomerHealthStore: Send + Sync {
    async fn find_tenant(&self, selector: &TenantSelector) -> Result<Option<Tenant>, ApplicationError>;

    /// One page of non-closed customers ordered by id, strictly after `after`.
    async fn load_snapshots(
        &self,
        tenant_id: &TenantId,
        after: Option<&CustomerId>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Result<CustomerSnapshot, SnapshotError>>, ApplicationError>;

    /// `None` when the customer does not exist in the tenant or is closed.
    /// A row that cannot be decoded comes back as the inner `Err`, the same
    /// way `load_snapshots` reports it.
    async fn load_snapshot(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Option<Result<CustomerSnapshot, SnapshotError>>, ApplicationError>;

    /// Applies all updates in one transaction. Outcomes are positional.
    async fn save_health(
        &self,
        updates: &[HealthUpdate],
        now: DateTime<Utc>,
    ) -> Result<Vec<SaveOutcome>, ApplicationError>;
}

#[async_trait]
impl<T> CustomerHealthStore for Arc<T>
where
    T: CustomerHealthStore + ?Sized,
{
    async fn find_tenant(&self, selector: &TenantSelector) -> Result<Option<Tenant>, ApplicationError> {
        (**self).find_tenant(selector).await
    }

    async fn load_snapshots(
        &self,
        tenant_id: &TenantId,
        after: Option<&CustomerId>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Result<CustomerSnapshot, SnapshotError>>, ApplicationError> {
        (**self).load_snapshots(tenant_id, after, limit, now).await
    }

    async fn load_snapshot(
        &self,
        tenant_id: &TenantId,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Option<Result<CustomerSnapshot, SnapshotError>>, ApplicationError> {
        (**self).load_snapshot(tenant_id, customer_id, now).await
    }

    async fn save_health(
        &self,
        updates: &[HealthUpdate],
        now: DateTime<Utc>,
    ) -> Result<Vec<SaveOutcome>, ApplicationError> {
        (**self).save_health(updates, now).await
    }
}
