//! Scheduled per-tenant assessment sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::domain::customer::{CustomerId, RiskStatus, TenantId, TenantSelector};
use crate::errors::ApplicationError;
use crate::health::classifier::{classify, ClassifyOptions};
use crate::health::store::{CustomerHealthStore, HealthUpdate, SaveOutcome};
use crate::health::thresholds::{ThresholdResolver, ThresholdStore};

pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Cooperative stop flag checked between chunks.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRunOptions {
    pub tenant: TenantSelector,
    pub chunk_size: usize,
}

impl BatchRunOptions {
    pub fn new(tenant: TenantSelector) -> Self {
        Self { tenant, chunk_size: DEFAULT_CHUNK_SIZE }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub healthy: usize,
    pub at_risk_cadence: usize,
    pub at_risk_revenue: usize,
    pub dormant: usize,
    pub prospect: usize,
    pub prospect_cold: usize,
    pub unqualified: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: RiskStatus) {
        let slot = match status {
            RiskStatus::Healthy => &mut self.healthy,
            RiskStatus::AtRiskCadence => &mut self.at_risk_cadence,
            RiskStatus::AtRiskRevenue => &mut self.at_risk_revenue,
            RiskStatus::Dormant => &mut self.dormant,
            RiskStatus::Prospect => &mut self.prospect,
            RiskStatus::ProspectCold => &mut self.prospect_cold,
            RiskStatus::Unqualified => &mut self.unqualified,
        };
        *slot += 1;
    }

    pub fn get(&self, status: RiskStatus) -> usize {
        match status {
            RiskStatus::Healthy => self.healthy,
            RiskStatus::AtRiskCadence => self.at_risk_cadence,
            RiskStatus::AtRiskRevenue => self.at_risk_revenue,
            RiskStatus::Dormant => self.dormant,
            RiskStatus::Prospect => self.prospect,
            RiskStatus::ProspectCold => self.prospect_cold,
            RiskStatus::Unqualified => self.unqualified,
        }
    }

    pub fn total(&self) -> usize {
        RiskStatus::ALL.into_iter().map(|status| self.get(status)).sum()
    }
}

/// Reporting counters for one run. Not used for any decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentSummary {
    pub tenant_id: TenantId,
    pub tenant_slug: String,
    pub analyzed: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub conflicts: usize,
    pub reactivated: usize,
    pub newly_dormant: usize,
    pub by_status: StatusCounts,
    pub chunks: usize,
    pub interrupted: bool,
    pub duration_ms: u64,
}

impl AssessmentSummary {
    fn new(tenant_id: TenantId, tenant_slug: String) -> Self {
        Self {
            tenant_id,
            tenant_slug,
            analyzed: 0,
            updated: 0,
            unchanged: 0,
            failed: 0,
            conflicts: 0,
            reactivated: 0,
            newly_dormant: 0,
            by_status: StatusCounts::default(),
            chunks: 0,
            interrupted: false,
            duration_ms: 0,
        }
    }
}

pub struct HealthAssessmentJob<S, T> {
    store: S,
    resolver: Arc<ThresholdResolver<T>>,
}

impl<S, T> HealthAssessmentJob<S, T>
where
    S: CustomerHealthStore,
    T: ThresholdStore,
{
    pub fn new(store: S, resolver: Arc<ThresholdResolver<T>>) -> Self {
        Self { store, resolver }
    }

    /// Classifies every non-closed customer of the selected tenant.
    ///
    /// Returns `Ok(None)` when the tenant cannot be found. Per-customer
    /// failures are counted and skipped; store and threshold failures end the
    /// run. Chunks already written stay written.
    pub async fn run(
        &self,
        options: &BatchRunOptions,
        now: DateTime<Utc>,
        stop: &StopSignal,
    ) -> Result<Option<AssessmentSummary>, ApplicationError> {
        let started = Instant::now();
        let chunk_size = options.chunk_size.max(1);

        let Some(tenant) = self.store.find_tenant(&options.tenant).await? else {
            warn!(
                event_name = "health.assessment.tenant_missing",
                selector = %options.tenant,
                "tenant not found, skipping health assessment"
            );
            return Ok(None);
        };

        info!(
            event_name = "health.assessment.start",
            tenant_id = %tenant.id,
            tenant = tenant.display_name(),
            chunk_size,
            "starting customer health assessment"
        );

        let mut summary = AssessmentSummary::new(tenant.id.clone(), tenant.slug.clone());
        let mut cursor: Option<CustomerId> = None;

        loop {
            if stop.is_stopped() {
                summary.interrupted = true;
                warn!(
                    event_name = "health.assessment.interrupted",
                    tenant_id = %tenant.id,
                    chunks = summary.chunks,
                    analyzed = summary.analyzed,
                    "health assessment stopped between chunks"
                );
                break;
            }

            let page =
                self.store.load_snapshots(&tenant.id, cursor.as_ref(), chunk_size, now).await?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();

            let mut updates = Vec::new();
            // (reactivated, entered dormancy) per update; only counted once persisted.
            let mut transitions = Vec::new();
            for item in page {
                let snapshot = match item {
                    Ok(snapshot) => snapshot,
                    Err(failure) => {
                        summary.failed += 1;
                        error!(
                            event_name = "health.assessment.customer_failed",
                            tenant_id = %tenant.id,
                            customer_id = %failure.customer_id,
                            reason = %failure.reason,
                            "customer snapshot could not be loaded"
                        );
                        cursor = Some(failure.customer_id);
                        continue;
                    }
                };
                cursor = Some(snapshot.record.id.clone());

                let thresholds = self.resolver.resolve(&tenant.id, &snapshot.record.segment).await?;
                let classification =
                    match classify(&snapshot, &thresholds, ClassifyOptions::default(), now) {
                        Ok(classification) => classification,
                        Err(failure) => {
                            summary.failed += 1;
                            error!(
                                event_name = "health.assessment.customer_failed",
                                tenant_id = %tenant.id,
                                customer_id = %snapshot.record.id,
                                error = %failure,
                                "customer classification failed"
                            );
                            continue;
                        }
                    };

                summary.analyzed += 1;
                summary.by_status.record(classification.next.risk_status);

                if classification.changed() {
                    transitions.push((classification.reactivated(), classification.entered_dormancy()));
                    updates.push(HealthUpdate {
                        tenant_id: tenant.id.clone(),
                        customer_id: classification.customer_id,
                        expected_revision: snapshot.record.revision,
                        state: classification.next,
                    });
                } else {
                    summary.unchanged += 1;
                }
            }

            if !updates.is_empty() {
                let outcomes = self.store.save_health(&updates, now).await?;
                for ((update, outcome), (reactivated, entered_dormancy)) in
                    updates.iter().zip(outcomes).zip(transitions)
                {
                    match outcome {
                        SaveOutcome::Saved => {
                            summary.updated += 1;
                            summary.reactivated += usize::from(reactivated);
                            summary.newly_dormant += usize::from(entered_dormancy);
                        }
                        SaveOutcome::Conflict => {
                            summary.conflicts += 1;
                            warn!(
                                event_name = "health.assessment.conflict",
                                tenant_id = %tenant.id,
                                customer_id = %update.customer_id,
                                "customer changed while being assessed, left for the next run"
                            );
                        }
                    }
                }
            }

            summary.chunks += 1;
            debug!(
                event_name = "health.assessment.chunk_persisted",
                tenant_id = %tenant.id,
                chunk = summary.chunks,
                customers = page_len,
                writes = updates.len(),
                "assessment chunk persisted"
            );

            if page_len < chunk_size {
                break;
            }
        }

        summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let counts = summary.by_status;
        info!(
            event_name = "health.assessment.complete",
            tenant_id = %tenant.id,
            analyzed = summary.analyzed,
            updated = summary.updated,
            unchanged = summary.unchanged,
            healthy = counts.healthy,
            at_risk_cadence = counts.at_risk_cadence,
            at_risk_revenue = counts.at_risk_revenue,
            dormant = counts.dormant,
            prospect = counts.prospect,
            prospect_cold = counts.prospect_cold,
            unqualified = counts.unqualified,
            reactivated = summary.reactivated,
            failed = summary.failed,
            conflicts = summary.conflicts,
            interrupted = summary.interrupted,
            duration_ms = summary.duration_ms,
            "customer health assessment complete"
        );

        Ok(Some(summary))
    }
}
