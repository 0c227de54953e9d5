use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use cadence_core::domain::customer::TenantId;
use cadence_core::domain::threshold::{ThresholdRule, ThresholdRuleId};
use cadence_core::errors::{ApplicationError, DomainError};

pub mod customer_health;
pub mod threshold;

pub use customer_health::SqlCustomerHealthRepository;
pub use threshold::SqlThresholdRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    /// The write clashes with a row the caller does not own or cannot move.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict(detail) => {
                ApplicationError::Domain(DomainError::InvariantViolation(detail))
            }
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

/// Administration of configured threshold rows. Callers are responsible for
/// invalidating resolver caches after a successful write.
#[async_trait]
pub trait ThresholdRuleRepository: Send + Sync {
    async fn list_rules(&self, tenant_id: &TenantId) -> Result<Vec<ThresholdRule>, RepositoryError>;

    /// Inserts or replaces the row for the rule's (tenant, type, priority)
    /// key and returns the stored row. An existing row keeps its id, and a
    /// known id may move to an unconfigured segment. Ids owned by another
    /// tenant, or a move onto a configured segment, fail with `Conflict`.
    async fn upsert_rule(&self, rule: ThresholdRule) -> Result<ThresholdRule, RepositoryError>;

    /// Returns whether a row was removed.
    async fn delete_rule(
        &self,
        tenant_id: &TenantId,
        rule_id: &ThresholdRuleId,
    ) -> Result<bool, RepositoryError>;
}

pub fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| format!("{column}: invalid timestamp `{raw}`: {error}"))
}

pub(crate) fn decode_optional_timestamp(
    column: &str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, String> {
    raw.map(|raw| decode_timestamp(column, &raw)).transpose()
}

pub(crate) fn decode_decimal(column: &str, raw: &str) -> Result<Decimal, String> {
    raw.trim().parse::<Decimal>().map_err(|error| format!("{column}: invalid decimal `{raw}`: {error}"))
}
