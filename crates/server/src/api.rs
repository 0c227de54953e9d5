//! HTTP surface of the health engine.
//!
//! - `POST   /events/order-delivered`                              run the real-time updater
//! - `GET    /tenants/{tenant_id}/customers/{customer_id}/health`  persisted state explained
//! - `GET    /admin/tenants/{tenant_id}/thresholds`                configured rows
//! - `PUT    /admin/tenants/{tenant_id}/thresholds`                insert or replace a row
//! - `PUT    /admin/tenants/{tenant_id}/thresholds/{rule_id}`      write a row by id (409 when owned elsewhere)
//! - `DELETE /admin/tenants/{tenant_id}/thresholds/{rule_id}`      remove a row
//! - `POST   /admin/thresholds/cache/invalidate`                   drop cached resolutions
//!
//! Every threshold write publishes an invalidation on the process bus, so the
//! shared resolver never serves a row that was just replaced.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use cadence_core::domain::customer::{
    AccountPriority, AccountType, CustomerId, TenantId, TenantSelector,
};
use cadence_core::domain::threshold::{ThresholdConfig, ThresholdRule, ThresholdRuleId};
use cadence_core::errors::{ApplicationError, InterfaceError};
use cadence_core::health::{
    CacheInvalidation, CustomerHealthStore, HealthSummary, InvalidationPublisher,
    OrderDeliveredEvent, RealTimeHealthUpdater, RealtimeOutcome, ThresholdCacheBus,
    ThresholdResolver,
};
use cadence_db::{
    RepositoryError, SqlCustomerHealthRepository, SqlThresholdRepository, ThresholdRuleRepository,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub type SqlHealthUpdater = RealTimeHealthUpdater<SqlCustomerHealthRepository, SqlThresholdRepository>;

#[derive(Clone)]
pub struct ApiState {
    pub customers: SqlCustomerHealthRepository,
    pub thresholds: SqlThresholdRepository,
    pub resolver: Arc<ThresholdResolver<SqlThresholdRepository>>,
    pub updater: Arc<SqlHealthUpdater>,
    pub bus: ThresholdCacheBus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

type Failure = (StatusCode, Json<ApiError>);

#[derive(Debug, Serialize)]
pub struct OrderDeliveredResponse {
    pub correlation_id: String,
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    #[serde(flatten)]
    pub outcome: RealtimeOutcome,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdRuleRequest {
    /// Generated when absent. Ignored when a row already exists for the
    /// segment; that row keeps its id.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub account_type: Option<AccountType>,
    #[serde(default)]
    pub account_priority: Option<AccountPriority>,
    pub config: ThresholdConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub invalidated: CacheInvalidation,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/events/order-delivered", post(order_delivered))
        .route("/tenants/{tenant_id}/customers/{customer_id}/health", get(customer_health))
        .route("/admin/tenants/{tenant_id}/thresholds", get(list_thresholds).put(upsert_threshold))
        .route(
            "/admin/tenants/{tenant_id}/thresholds/{rule_id}",
            put(upsert_threshold_by_id).delete(delete_threshold),
        )
        .route("/admin/thresholds/cache/invalidate", post(invalidate_cache))
        .with_state(state)
}

pub async fn order_delivered(
    State(state): State<ApiState>,
    Json(event): Json<OrderDeliveredEvent>,
) -> Result<Json<OrderDeliveredResponse>, Failure> {
    let correlation_id = format!("order-{}", event.order_id);
    let outcome = state
        .updater
        .handle_order_delivered(&event, Utc::now())
        .await
        .map_err(|error| application_failure(error, &correlation_id))?;

    Ok(Json(OrderDeliveredResponse {
        correlation_id,
        tenant_id: event.tenant_id,
        customer_id: event.customer_id,
        outcome,
    }))
}

pub async fn customer_health(
    State(state): State<ApiState>,
    Path((tenant_id, customer_id)): Path<(String, String)>,
) -> Result<Json<HealthSummary>, Failure> {
    let correlation_id = format!("health-{tenant_id}-{customer_id}");
    let tenant_id = TenantId(tenant_id);
    let customer_id = CustomerId(customer_id);

    let record = state
        .customers
        .find_record(&tenant_id, &customer_id)
        .await
        .map_err(|error| application_failure(error.into(), &correlation_id))?
        .ok_or_else(|| {
            not_found(format!("customer `{customer_id}` not found in tenant `{tenant_id}`"), &correlation_id)
        })?;

    let thresholds = state
        .resolver
        .resolve(&tenant_id, &record.segment)
        .await
        .map_err(|error| application_failure(error, &correlation_id))?;

    Ok(Json(HealthSummary::from_record(&record, &thresholds, Utc::now())))
}

pub async fn list_thresholds(
    State(state): State<ApiState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<Vec<ThresholdRule>>, Failure> {
    let correlation_id = format!("thresholds-{tenant_id}");
    let tenant_id = require_tenant(&state, tenant_id, &correlation_id).await?;

    let rules = state
        .thresholds
        .list_rules(&tenant_id)
        .await
        .map_err(|error| application_failure(error.into(), &correlation_id))?;
    Ok(Json(rules))
}

pub async fn upsert_threshold(
    State(state): State<ApiState>,
    Path(tenant_id): Path<String>,
    Json(request): Json<ThresholdRuleRequest>,
) -> Result<Json<ThresholdRule>, Failure> {
    store_threshold(state, tenant_id, request).await
}

/// `PUT` on a concrete row id; the path id wins over any id in the body.
pub async fn upsert_threshold_by_id(
    State(state): State<ApiState>,
    Path((tenant_id, rule_id)): Path<(String, String)>,
    Json(request): Json<ThresholdRuleRequest>,
) -> Result<Json<ThresholdRule>, Failure> {
    store_threshold(state, tenant_id, ThresholdRuleRequest { id: Some(rule_id), ..request }).await
}

pub async fn delete_threshold(
    State(state): State<ApiState>,
    Path((tenant_id, rule_id)): Path<(String, String)>,
) -> Result<StatusCode, Failure> {
    let correlation_id = format!("thresholds-{tenant_id}");
    let tenant_id = require_tenant(&state, tenant_id, &correlation_id).await?;

    let removed = state
        .thresholds
        .delete_rule(&tenant_id, &ThresholdRuleId(rule_id.clone()))
        .await
        .map_err(|error| application_failure(error.into(), &correlation_id))?;
    if !removed {
        return Err(not_found(format!("threshold `{rule_id}` not found"), &correlation_id));
    }

    state.bus.publish(CacheInvalidation::Tenant(tenant_id.clone()));
    info!(
        event_name = "server.thresholds.deleted",
        correlation_id = %correlation_id,
        tenant_id = %tenant_id,
        rule_id = %rule_id,
        "threshold row deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn invalidate_cache(
    State(state): State<ApiState>,
    Json(request): Json<InvalidateRequest>,
) -> Json<InvalidateResponse> {
    let invalidation = CacheInvalidation::for_tenant(request.tenant_id);
    state.bus.publish(invalidation.clone());
    info!(
        event_name = "server.thresholds.cache_invalidated",
        correlation_id = "admin",
        invalidation = ?invalidation,
        "threshold cache invalidation published"
    );
    Json(InvalidateResponse { invalidated: invalidation })
}

async fn store_threshold(
    state: ApiState,
    tenant_id: String,
    request: ThresholdRuleRequest,
) -> Result<Json<ThresholdRule>, Failure> {
    let correlation_id = format!("thresholds-{tenant_id}");
    let tenant_id = require_tenant(&state, tenant_id, &correlation_id).await?;

    request
        .config
        .validate()
        .map_err(|error| application_failure(error.into(), &correlation_id))?;

    let rule = ThresholdRule {
        id: ThresholdRuleId(request.id.unwrap_or_else(|| format!("thr-{}", Uuid::new_v4()))),
        tenant_id: tenant_id.clone(),
        account_type: request.account_type,
        account_priority: request.account_priority,
        config: request.config,
        updated_at: Utc::now(),
    };
    let stored = state.thresholds.upsert_rule(rule).await.map_err(|error| match error {
        RepositoryError::Conflict(detail) => conflict(detail, &correlation_id),
        other => application_failure(other.into(), &correlation_id),
    })?;

    state.bus.publish(CacheInvalidation::Tenant(tenant_id.clone()));
    info!(
        event_name = "server.thresholds.upserted",
        correlation_id = %correlation_id,
        tenant_id = %tenant_id,
        rule_id = %stored.id.0,
        "threshold row stored"
    );
    Ok(Json(stored))
}

async fn require_tenant(
    state: &ApiState,
    tenant_id: String,
    correlation_id: &str,
) -> Result<TenantId, Failure> {
    let tenant_id = TenantId(tenant_id);
    match state.customers.find_tenant(&TenantSelector::Id(tenant_id.clone())).await {
        Ok(Some(tenant)) => Ok(tenant.id),
        Ok(None) => Err(not_found(format!("tenant `{tenant_id}` not found"), correlation_id)),
        Err(error) => Err(application_failure(error, correlation_id)),
    }
}

fn application_failure(error: ApplicationError, correlation_id: &str) -> Failure {
    let interface = error.into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "server.request.failed",
        correlation_id = %interface.correlation_id(),
        status = status.as_u16(),
        error = %interface,
        "request failed"
    );
    (
        status,
        Json(ApiError {
            error: interface.user_message().to_string(),
            detail: interface.to_string(),
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

fn conflict(detail: String, correlation_id: &str) -> Failure {
    warn!(
        event_name = "server.thresholds.conflict",
        correlation_id = %correlation_id,
        detail = %detail,
        "threshold write rejected"
    );
    (
        StatusCode::CONFLICT,
        Json(ApiError {
            error: "The request conflicts with an existing resource.".to_string(),
            detail,
            correlation_id: correlation_id.to_string(),
        }),
    )
}

fn not_found(detail: String, correlation_id: &str) -> Failure {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError {
            error: "The requested resource does not exist.".to_string(),
            detail,
            correlation_id: correlation_id.to_string(),
        }),
    )
}
