use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use cadence_core::domain::customer::{AccountPriority, AccountType, Segment, TenantId};
use cadence_core::domain::threshold::{ThresholdConfig, ThresholdRule, ThresholdRuleId};
use cadence_core::errors::ApplicationError;
use cadence_core::health::thresholds::ThresholdStore;

use super::{decode_decimal, decode_timestamp, encode_timestamp, RepositoryError, ThresholdRuleRepository};
use crate::DbPool;

const RULE_COLUMNS: &str = "id, tenant_id, account_type, account_priority, dormant_days,
    grace_period_percent, min_grace_days, revenue_decline_percent, updated_at";

#[derive(Clone)]
pub struct SqlThresholdRepository {
    pool: DbPool,
}

impl SqlThresholdRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn matching_rules(
        &self,
        tenant_id: &TenantId,
        segment: &Segment,
    ) -> Result<Vec<ThresholdRule>, RepositoryError> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM health_threshold
             WHERE tenant_id = ?
               AND (account_type IS NULL OR account_type = ?)
               AND (account_priority IS NULL OR account_priority = ?)
             ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(&tenant_id.0)
            .bind(segment.account_type.map(|value| value.as_str()))
            .bind(segment.account_priority.map(|value| value.as_str()))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_rule).collect()
    }
}

#[async_trait]
impl ThresholdStore for SqlThresholdRepository {
    async fn rules_for_segment(
        &self,
        tenant_id: &TenantId,
        segment: &Segment,
    ) -> Result<Vec<ThresholdRule>, ApplicationError> {
        Ok(self.matching_rules(tenant_id, segment).await?)
    }
}

#[async_trait]
impl ThresholdRuleRepository for SqlThresholdRepository {
    async fn list_rules(&self, tenant_id: &TenantId) -> Result<Vec<ThresholdRule>, RepositoryError> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM health_threshold
             WHERE tenant_id = ?
             ORDER BY IFNULL(account_type, ''), IFNULL(account_priority, ''), id"
        );
        let rows = sqlx::query(&sql).bind(&tenant_id.0).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_rule).collect()
    }

    async fn upsert_rule(&self, rule: ThresholdRule) -> Result<ThresholdRule, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let account_type = rule.account_type.map(|value| value.as_str());
        let account_priority = rule.account_priority.map(|value| value.as_str());

        let owner: Option<String> =
            sqlx::query_scalar("SELECT tenant_id FROM health_threshold WHERE id = ?")
                .bind(&rule.id.0)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(owner) = owner.as_deref().filter(|owner| *owner != rule.tenant_id.0) {
            return Err(RepositoryError::Conflict(format!(
                "threshold `{}` belongs to tenant `{owner}`",
                rule.id.0
            )));
        }

        let segment_row: Option<String> = sqlx::query_scalar(
            "SELECT id FROM health_threshold
             WHERE tenant_id = ? AND account_type IS ? AND account_priority IS ?",
        )
        .bind(&rule.tenant_id.0)
        .bind(account_type)
        .bind(account_priority)
        .fetch_optional(&mut *tx)
        .await?;

        // A known id may move to a free segment; an unknown id adopts the
        // segment's existing row.
        let id = match (owner, segment_row) {
            (Some(_), Some(other)) if other != rule.id.0 => {
                return Err(RepositoryError::Conflict(format!(
                    "segment is already configured by threshold `{other}`"
                )));
            }
            (Some(_), _) | (None, None) => rule.id,
            (None, Some(existing)) => ThresholdRuleId(existing),
        };

        let result = sqlx::query(
            "INSERT INTO health_threshold
                (id, tenant_id, account_type, account_priority, dormant_days, grace_period_percent,
                 min_grace_days, revenue_decline_percent, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                account_type = excluded.account_type,
                account_priority = excluded.account_priority,
                dormant_days = excluded.dormant_days,
                grace_period_percent = excluded.grace_period_percent,
                min_grace_days = excluded.min_grace_days,
                revenue_decline_percent = excluded.revenue_decline_percent,
                updated_at = excluded.updated_at
             WHERE health_threshold.tenant_id = excluded.tenant_id",
        )
        .bind(&id.0)
        .bind(&rule.tenant_id.0)
        .bind(account_type)
        .bind(account_priority)
        .bind(rule.config.dormant_days)
        .bind(rule.config.grace_period_percent.to_string())
        .bind(rule.config.min_grace_days)
        .bind(rule.config.revenue_decline_percent.to_string())
        .bind(encode_timestamp(&rule.updated_at))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "threshold `{}` belongs to another tenant",
                id.0
            )));
        }

        tx.commit().await?;

        Ok(ThresholdRule { id, ..rule })
    }

    async fn delete_rule(
        &self,
        tenant_id: &TenantId,
        rule_id: &ThresholdRuleId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM health_threshold WHERE tenant_id = ? AND id = ?")
            .bind(&tenant_id.0)
            .bind(&rule_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_rule(row: &SqliteRow) -> Result<ThresholdRule, RepositoryError> {
    let decode = |e: sqlx::Error| RepositoryError::Decode(e.to_string());

    let id: String = row.try_get("id").map_err(decode)?;
    let tenant_id: String = row.try_get("tenant_id").map_err(decode)?;
    let account_type: Option<String> = row.try_get("account_type").map_err(decode)?;
    let account_priority: Option<String> = row.try_get("account_priority").map_err(decode)?;
    let dormant_days: i64 = row.try_get("dormant_days").map_err(decode)?;
    let grace_period_percent: String = row.try_get("grace_period_percent").map_err(decode)?;
    let min_grace_days: i64 = row.try_get("min_grace_days").map_err(decode)?;
    let revenue_decline_percent: String =
        row.try_get("revenue_decline_percent").map_err(decode)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode)?;

    let account_type = account_type
        .map(|raw| raw.parse::<AccountType>())
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let account_priority = account_priority
        .map(|raw| raw.parse::<AccountPriority>())
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ThresholdRule {
        id: ThresholdRuleId(id),
        tenant_id: TenantId(tenant_id),
        account_type,
        account_priority,
        config: ThresholdConfig {
            dormant_days,
            grace_period_percent: decode_decimal("grace_period_percent", &grace_period_percent)
                .map_err(RepositoryError::Decode)?,
            min_grace_days,
            revenue_decline_percent: decode_decimal(
                "revenue_decline_percent",
                &revenue_decline_percent,
            )
            .map_err(RepositoryError::Decode)?,
        },
        updated_at: decode_timestamp("updated_at", &updated_at).map_err(RepositoryError::Decode)?,
    })
}
